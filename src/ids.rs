//! Arena index types.
//!
//! The original database links leases, hosts, subnets, and pools with
//! reference-counted pointers and intrusive chain fields (`n_uid`, `n_hw`,
//! `n_ipaddr`, `next`). Per the "arenas + indices" design note, each entity
//! lives in a flat `Vec` owned by [`crate::Database`] and is referred to
//! everywhere else by one of these small `Copy` handles instead of a
//! pointer. Nothing is ever removed from these arenas: leases persist for
//! the life of the server and hosts are only ever logically deleted
//! (`HostFlags::DECL_DELETED`), so a plain growable index is sufficient —
//! there's no need for generational indices to guard against reuse.
use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(LeaseId);
arena_id!(HostId);
arena_id!(SubnetId);
arena_id!(SharedNetworkId);
arena_id!(PoolId);
arena_id!(ClassId);
