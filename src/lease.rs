//! The `Lease` type (§3 Data Model, "Lease").
use std::net::IpAddr;

use crate::flags::LeaseFlags;
use crate::hooks::Hook;
use crate::ids::{ClassId, HostId, LeaseId, PoolId, SubnetId};
use crate::scope::Scope;
use crate::time::{Time, MIN_TIME};

/// A lease's binding state (§3, §4.5). Order matters for
/// [`crate::index::preferred`] — declaration order here is not
/// significant, preference is computed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    Free,
    Active,
    Expired,
    Released,
    Abandoned,
    Reset,
    Backup,
}

/// Hardware address: type byte plus the address bytes (§3). The single-byte
/// InfiniBand form is never indexed (§4.3 `find_lease_by_hw_addr`, §4.2
/// `find_hosts_by_haddr` implicitly — only leases document this, hosts
/// don't exclude it).
pub const HTYPE_INFINIBAND: u8 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HwAddr {
    pub htype: u8,
    pub addr: Vec<u8>,
}

impl HwAddr {
    pub fn new(htype: u8, addr: impl Into<Vec<u8>>) -> Self {
        Self {
            htype,
            addr: addr.into(),
        }
    }

    /// `true` for the single-byte InfiniBand form that is never indexed.
    pub fn is_infiniband(&self) -> bool {
        self.addr.len() == 1 && self.htype == HTYPE_INFINIBAND
    }

    /// the byte string used as a hash key: type byte prepended to the
    /// address bytes (§4.2 `find_hosts_by_haddr`: "the key is type ||
    /// bytes").
    pub fn hash_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.addr.len() + 1);
        key.push(self.htype);
        key.extend_from_slice(&self.addr);
        key
    }
}

/// A DDNS update in flight for this lease (§4.5 step 4, "any in-flight DDNS
/// control block"). The update engine itself is out of scope (§1); this is
/// just the opaque token the database carries on a lease's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdnsControlBlock {
    pub transaction_id: u32,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub(crate) id: LeaseId,
    pub ip_addr: IpAddr,

    pub starts: Time,
    pub ends: Time,
    pub cltt: Time,
    pub tstp: Time,
    pub tsfp: Time,
    pub atsfp: Time,
    pub sort_time: Time,

    pub uid: Option<Vec<u8>>,
    pub hardware_addr: Option<HwAddr>,

    pub binding_state: BindingState,
    pub next_binding_state: BindingState,
    pub rewind_binding_state: BindingState,

    pub flags: LeaseFlags,

    pub pool: Option<PoolId>,
    pub subnet: Option<SubnetId>,
    pub host: Option<HostId>,
    pub billing_class: Option<ClassId>,

    pub scope: Option<Scope>,
    pub agent_options: Option<Vec<u8>>,
    pub client_hostname: Option<String>,

    pub on_expiry: Option<Hook>,
    pub on_commit: Option<Hook>,
    pub on_release: Option<Hook>,

    pub ddns_cb: Option<DdnsControlBlock>,

    /// sibling within `lease_uid_hash`'s bucket chain for this lease's `uid`
    pub(crate) n_uid: Option<LeaseId>,
    /// sibling within `lease_hw_addr_hash`'s bucket chain for this lease's
    /// hardware address
    pub(crate) n_hw: Option<LeaseId>,
    /// link within the pool queue this lease currently occupies
    pub(crate) next: Option<LeaseId>,
}

impl Lease {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    /// a freshly allocated, unassigned lease for `new_address_range`
    /// (§4.3): `starts = ends = MIN_TIME`, all three binding states FREE.
    pub(crate) fn new_free(id: LeaseId, ip_addr: IpAddr, pool: PoolId, subnet: SubnetId) -> Self {
        Self {
            id,
            ip_addr,
            starts: MIN_TIME,
            ends: MIN_TIME,
            cltt: MIN_TIME,
            tstp: MIN_TIME,
            tsfp: MIN_TIME,
            atsfp: MIN_TIME,
            sort_time: MIN_TIME,
            uid: None,
            hardware_addr: None,
            binding_state: BindingState::Free,
            next_binding_state: BindingState::Free,
            rewind_binding_state: BindingState::Free,
            flags: LeaseFlags::empty(),
            pool: Some(pool),
            subnet: Some(subnet),
            host: None,
            billing_class: None,
            scope: None,
            agent_options: None,
            client_hostname: None,
            on_expiry: None,
            on_commit: None,
            on_release: None,
            ddns_cb: None,
            n_uid: None,
            n_hw: None,
            next: None,
        }
    }
}
