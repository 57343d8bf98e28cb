//! Subnets, shared networks, and pools (§3 Data Model, "Topology", "Pool").
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

use crate::failover::FailoverPeer;
use crate::ids::{PoolId, SharedNetworkId, SubnetId};
use crate::queue::{InsertMemo, Queue};
use crate::time::{Time, MIN_TIME};

#[derive(Debug, Clone)]
pub struct Subnet {
    pub(crate) id: SubnetId,
    pub net: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub shared_network: Option<SharedNetworkId>,
    pub(crate) next_sibling: Option<SubnetId>,
}

impl Subnet {
    pub fn id(&self) -> SubnetId {
        self.id
    }

    /// §4.2 `find_host_for_network`: "matched by `subnet_number(addr, mask)
    /// == net`"
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        subnet_number(addr, self.netmask) == self.net
    }
}

/// `mdb.c`'s `subnet_number(addr, mask)`: apply `mask` to `addr`.
pub fn subnet_number(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let a = u32::from(addr);
    let m = u32::from(mask);
    Ipv4Addr::from(a & m)
}

#[derive(Debug, Clone, Default)]
pub struct SharedNetwork {
    pub(crate) id: SharedNetworkId,
    pub name: Option<String>,
    pub interface: Option<String>,
    pub(crate) pools: Vec<PoolId>,
}

impl SharedNetwork {
    pub fn id(&self) -> SharedNetworkId {
        self.id
    }

    pub fn pools(&self) -> &[PoolId] {
        &self.pools
    }
}

/// An address range declared on a pool (§4.3 `new_address_range`). Not part
/// of the original's `struct pool` — it's the range argument
/// `new_address_range` is called with — but kept on the `Pool` here since
/// nothing else owns it once the range has been turned into leases.
#[derive(Debug, Clone)]
pub struct PoolRange {
    pub addrs: RangeInclusive<Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct Pool {
    pub(crate) id: PoolId,
    pub shared_network: Option<SharedNetworkId>,

    pub(crate) free: Queue,
    pub(crate) active: Queue,
    pub(crate) expired: Queue,
    pub(crate) abandoned: Queue,
    pub(crate) backup: Queue,
    pub(crate) reserved: Queue,

    pub(crate) insert_memo: InsertMemo,

    pub lease_count: usize,
    pub free_leases: usize,
    pub backup_leases: usize,

    pub next_event_time: Time,
    pub failover_peer: Option<FailoverPeer>,
}

impl Pool {
    pub(crate) fn new(id: PoolId) -> Self {
        Self {
            id,
            shared_network: None,
            free: Queue::default(),
            active: Queue::default(),
            expired: Queue::default(),
            abandoned: Queue::default(),
            backup: Queue::default(),
            reserved: Queue::default(),
            insert_memo: InsertMemo::default(),
            lease_count: 0,
            free_leases: 0,
            backup_leases: 0,
            next_event_time: MIN_TIME,
            failover_peer: None,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub(crate) fn queue(&self, kind: crate::queue::QueueKind) -> &Queue {
        use crate::queue::QueueKind::*;
        match kind {
            Free => &self.free,
            Active => &self.active,
            Expired => &self.expired,
            Abandoned => &self.abandoned,
            Backup => &self.backup,
            Reserved => &self.reserved,
        }
    }

    pub(crate) fn queue_mut(&mut self, kind: crate::queue::QueueKind) -> &mut Queue {
        use crate::queue::QueueKind::*;
        match kind {
            Free => &mut self.free,
            Active => &mut self.active,
            Expired => &mut self.expired,
            Abandoned => &mut self.abandoned,
            Backup => &mut self.backup,
            Reserved => &mut self.reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_number_masks_correctly() {
        let addr = Ipv4Addr::new(10, 0, 0, 37);
        let mask = Ipv4Addr::new(255, 255, 255, 0);
        assert_eq!(subnet_number(addr, mask), Ipv4Addr::new(10, 0, 0, 0));
    }
}
