//! Lease registration and lookup (§4.3).
use std::net::{IpAddr, Ipv4Addr};

use crate::db::Database;
use crate::ids::{LeaseId, PoolId, SubnetId};
use crate::lease::{HwAddr, Lease};
use crate::persistence::Journal;

impl<J: Journal> Database<J> {
    /// declare an address range on `pool`/`subnet`, allocating one FREE
    /// lease per address and indexing each by IP (§4.3). A pre-existing
    /// poolless entry (an orphan loaded from the journal before its range
    /// was declared) is adopted in place; an entry that already belongs to
    /// a pool is a duplicate declaration, logged and skipped — the range
    /// otherwise still declares (§7: "duplicate range declaration ...
    /// logged, not fatal").
    pub fn new_address_range(
        &mut self,
        low: Ipv4Addr,
        high: Ipv4Addr,
        subnet_id: SubnetId,
        pool_id: PoolId,
    ) -> Vec<LeaseId> {
        let subnet = self.subnet(subnet_id);
        assert!(subnet.contains(low), "new_address_range: {low} outside subnet {subnet_id}");
        assert!(subnet.contains(high), "new_address_range: {high} outside subnet {subnet_id}");

        let (low, high) = if u32::from(low) <= u32::from(high) {
            (low, high)
        } else {
            (high, low)
        };
        let num = u32::from(high)
            .checked_sub(u32::from(low))
            .and_then(|span| span.checked_add(1))
            .expect("new_address_range: range size overflow");

        let mut chain = Vec::with_capacity(num as usize);
        for n in 0..num {
            let addr = Ipv4Addr::from(u32::from(low) + n);
            let ip = IpAddr::from(addr);

            if let Some(&existing) = self.lease_ip_addr_hash.get(&ip) {
                if self.lease(existing).pool.is_some() {
                    tracing::warn!(%ip, "address declared in more than one pool");
                    continue;
                }
                self.lease_mut(existing).pool = Some(pool_id);
                self.lease_mut(existing).subnet = Some(subnet_id);
                self.enqueue_lease(pool_id, existing);
                self.pool_mut(pool_id).lease_count += 1;
                chain.push(existing);
                continue;
            }

            let id = LeaseId(self.leases.len() as u32);
            self.leases.push(Lease::new_free(id, ip, pool_id, subnet_id));
            self.lease_ip_addr_hash.insert(ip, id);
            self.enqueue_lease(pool_id, id);
            self.pool_mut(pool_id).lease_count += 1;
            chain.push(id);
        }
        chain
    }

    /// register a lease replayed from the journal (§4.3). If an IP entry
    /// already exists (declared via `new_address_range` first, or an
    /// earlier journal record for the same address), the incoming lease
    /// inherits its `pool`/`subnet` and evicts it. A lease with no subnet
    /// is dropped.
    pub fn enter_lease(&mut self, mut lease: Lease) -> Option<LeaseId> {
        if lease.subnet.is_none() {
            tracing::warn!(ip = %lease.ip_addr, "enter_lease: lease has no subnet, dropping");
            return None;
        }
        let ip = lease.ip_addr;
        if let Some(&old) = self.lease_ip_addr_hash.get(&ip) {
            lease.pool = self.lease(old).pool;
            lease.subnet = self.lease(old).subnet;
        }
        let id = LeaseId(self.leases.len() as u32);
        lease.id = id;
        self.leases.push(lease);
        self.lease_ip_addr_hash.insert(ip, id);
        Some(id)
    }

    /// direct `lease_ip_addr_hash` lookup (§4.3).
    pub fn find_lease_by_ip_addr(&self, ip: IpAddr) -> Option<LeaseId> {
        self.lease_ip_addr_hash.get(&ip).copied()
    }

    /// `lease_uid_hash` lookup; the hash entry is always the
    /// most-[`crate::index::preferred`] lease sharing `uid` (§4.3, §4.7).
    /// A zero-length key always misses.
    pub fn find_lease_by_uid(&self, uid: &[u8]) -> Option<LeaseId> {
        if uid.is_empty() {
            return None;
        }
        self.lease_uid_hash.get(uid).copied()
    }

    /// `lease_hw_addr_hash` lookup. The single-byte InfiniBand form is
    /// never indexed and always misses (§3, §4.3).
    pub fn find_lease_by_hw_addr(&self, hw: &HwAddr) -> Option<LeaseId> {
        if hw.is_infiniband() || hw.addr.is_empty() {
            return None;
        }
        self.lease_hw_addr_hash.get(&hw.hash_key()).copied()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::persistence::Journal;
    use crate::topology::{Pool, Subnet};
    use async_trait::async_trait;
    use std::net::Ipv4Addr;

    struct NoopJournal;

    #[derive(Debug, thiserror::Error)]
    #[error("noop journal error")]
    struct NoopError;

    #[async_trait]
    impl Journal for NoopJournal {
        type Error = NoopError;
        async fn write_host(&self, _host: &crate::host::Host) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_lease(&self, _lease: &Lease) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_named_billing_class(&self, _name: &str, _cp: Option<&[u8]>) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_group(&self, _name: &str, _group: &crate::scope::Scope) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn commit_leases(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn setup() -> (Database<NoopJournal>, SubnetId, PoolId) {
        let mut db = Database::new(NoopJournal);
        let subnet_id = SubnetId(db.subnets.len() as u32);
        db.subnets.push(Subnet {
            id: subnet_id,
            net: Ipv4Addr::new(10, 0, 0, 0),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            shared_network: None,
            next_sibling: None,
        });
        let pool_id = PoolId(db.pools.len() as u32);
        db.pools.push(Pool::new(pool_id));
        (db, subnet_id, pool_id)
    }

    #[test]
    fn s1_range_declaration_yields_three_sorted_free_leases() {
        let (mut db, subnet_id, pool_id) = setup();
        let chain = db.new_address_range(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
            subnet_id,
            pool_id,
        );
        assert_eq!(chain.len(), 3);
        assert_eq!(db.pool(pool_id).free_leases, 3);
        for id in &chain {
            assert_eq!(db.lease(*id).binding_state, crate::lease::BindingState::Free);
            assert_eq!(db.lease(*id).sort_time, crate::time::MIN_TIME);
        }
        let mut cur = db.pool(pool_id).queue(crate::queue::QueueKind::Free).head();
        let mut seen = Vec::new();
        while let Some(id) = cur {
            seen.push(db.lease(id).ip_addr);
            cur = db.lease(id).next;
        }
        assert_eq!(
            seen,
            vec![
                IpAddr::from(Ipv4Addr::new(10, 0, 0, 10)),
                IpAddr::from(Ipv4Addr::new(10, 0, 0, 11)),
                IpAddr::from(Ipv4Addr::new(10, 0, 0, 12)),
            ]
        );
    }

    #[test]
    fn find_lease_by_ip_addr_round_trips() {
        let (mut db, subnet_id, pool_id) = setup();
        let chain = db.new_address_range(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 10),
            subnet_id,
            pool_id,
        );
        let ip = IpAddr::from(Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(db.find_lease_by_ip_addr(ip), Some(chain[0]));
    }

    #[test]
    fn infiniband_hw_address_never_indexed() {
        let hw = HwAddr::new(crate::lease::HTYPE_INFINIBAND, vec![0u8]);
        let (db, _subnet_id, _pool_id) = setup();
        assert_eq!(db.find_lease_by_hw_addr(&hw), None);
    }
}
