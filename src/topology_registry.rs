//! Subnet/shared-network registration and lookup. Not named in the
//! distilled operation list but implied by every operation that takes a
//! `SubnetId`/`SharedNetworkId` as input — grounded on `mdb.c`'s
//! `enter_subnet`/`enter_shared_network`/`find_subnet`/`find_grouped_subnet`.
use std::net::Ipv4Addr;

use crate::db::Database;
use crate::ids::{PoolId, SharedNetworkId, SubnetId};
use crate::persistence::Journal;
use crate::topology::{Pool, SharedNetwork, Subnet};

impl<J: Journal> Database<J> {
    /// declare a pool, optionally attaching it to a shared network
    /// (`attach_pool_to_shared_network`). Pools carry no configuration of
    /// their own here (§1 "configuration-file parsing" is out of scope) —
    /// this just allocates the `PoolId` a caller needs before calling
    /// `new_address_range`.
    pub fn enter_pool(&mut self, shared_network: Option<SharedNetworkId>) -> PoolId {
        let id = PoolId(self.pools.len() as u32);
        self.pools.push(Pool::new(id));
        if let Some(share) = shared_network {
            self.attach_pool_to_shared_network(share, id);
        }
        id
    }

    /// declare a subnet, threading it onto its shared network's sibling
    /// chain (§3 "Topology"). `next_sibling` links every subnet sharing a
    /// `SharedNetworkId` into one singly linked list, newest first; the
    /// head is whichever subnet in that group nothing else points at yet.
    pub fn enter_subnet(
        &mut self,
        net: Ipv4Addr,
        netmask: Ipv4Addr,
        shared_network: Option<SharedNetworkId>,
    ) -> SubnetId {
        let id = SubnetId(self.subnets.len() as u32);
        let next_sibling = shared_network.and_then(|sn| self.shared_network_head(sn));
        self.subnets.push(Subnet {
            id,
            net,
            netmask,
            shared_network,
            next_sibling,
        });
        id
    }

    fn shared_network_head(&self, share: SharedNetworkId) -> Option<SubnetId> {
        let referenced: std::collections::HashSet<SubnetId> =
            self.subnets.iter().filter_map(|s| s.next_sibling).collect();
        self.subnets
            .iter()
            .rev()
            .find(|s| s.shared_network == Some(share) && !referenced.contains(&s.id))
            .map(|s| s.id)
    }

    pub fn enter_shared_network(&mut self, name: Option<String>, interface: Option<String>) -> SharedNetworkId {
        let id = SharedNetworkId(self.shared_networks.len() as u32);
        self.shared_networks.push(SharedNetwork {
            id,
            name,
            interface,
            pools: Vec::new(),
        });
        id
    }

    /// attach `pool` to `share`'s pool list and set the pool's back-link.
    pub fn attach_pool_to_shared_network(&mut self, share: SharedNetworkId, pool: PoolId) {
        self.shared_networks[share.index()].pools.push(pool);
        self.pool_mut(pool).shared_network = Some(share);
    }

    /// `find_subnet`: the most specific subnet containing `addr`, among
    /// all declared subnets (§4.2 `find_host_for_network` relies on the
    /// grouped variant; this is the ungrouped form used at configuration
    /// time). Ties (equal netmask) resolve to the first declared.
    pub fn find_subnet(&self, addr: Ipv4Addr) -> Option<SubnetId> {
        self.subnets
            .iter()
            .filter(|s| s.contains(addr))
            .max_by_key(|s| u32::from(s.netmask))
            .map(|s| s.id())
    }

    /// `find_grouped_subnet`: walk `share`'s sibling chain for the first
    /// subnet containing `addr` (§4.2).
    pub fn find_grouped_subnet(&self, share: SharedNetworkId, addr: Ipv4Addr) -> Option<SubnetId> {
        let mut cur = self.shared_network_head(share);
        while let Some(id) = cur {
            let subnet = self.subnet(id);
            if subnet.contains(addr) {
                return Some(id);
            }
            cur = subnet.next_sibling;
        }
        None
    }

    /// `subnet_inner_than`: `a` is enclosed by, and more specific than,
    /// `b` — `a`'s mask has at least as many bits as `b`'s and `a`'s
    /// network falls inside `b`.
    pub fn subnet_inner_than(&self, a: SubnetId, b: SubnetId) -> bool {
        let (sa, sb) = (self.subnet(a), self.subnet(b));
        if u32::from(sa.netmask) <= u32::from(sb.netmask) {
            return false;
        }
        crate::topology::subnet_number(sa.net, sb.netmask) == sb.net
    }
}
