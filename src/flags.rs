//! Bit flags carried on leases, hosts, and classes.
//!
//! The original expresses these as raw `#define`d integer bits on a `u32`
//! flags field. `bitflags!` gives the same storage and bitwise-or/and
//! semantics with a typed API.
use bitflags::bitflags;

bitflags! {
    /// Lease flags (§3 Lease). `PERSISTENT` and `EPHEMERAL` are not
    /// individual bits but masks over the others, used by
    /// `supersede_lease`'s field-copy step (§4.5 step 4) to decide which
    /// flags survive a supersede and which are always taken fresh from the
    /// incoming sample.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LeaseFlags: u32 {
        /// lease is associated with a host's `fixed_addr`/reservation
        const RESERVED_LEASE    = 0b0000_0001;
        /// lease was declared statically and is not mutated by the state machine
        const STATIC_LEASE      = 0b0000_0010;
        /// lease has a pending failover update queued
        const ON_UPDATE_QUEUE   = 0b0000_0100;
        /// lease was granted over BOOTP (no explicit lease time)
        const BOOTP_LEASE       = 0b0000_1000;
        /// lease is mid dynamic-DNS transaction
        const DEFERRED          = 0b0001_0000;

        const PERSISTENT_FLAGS = Self::RESERVED_LEASE.bits() | Self::STATIC_LEASE.bits() | Self::BOOTP_LEASE.bits();
        const EPHEMERAL_FLAGS  = Self::ON_UPDATE_QUEUE.bits() | Self::DEFERRED.bits();
    }
}

bitflags! {
    /// Host flags (§3 Host).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostFlags: u32 {
        const DECL_DELETED = 0b0000_0001;
        const DECL_STATIC  = 0b0000_0010;
        const DECL_DYNAMIC = 0b0000_0100;
    }
}

bitflags! {
    /// Class flags (§4.8).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        const DECL_DELETED = 0b0000_0001;
        const DECL_DYNAMIC = 0b0000_0010;
    }
}
