//! The database handle (DESIGN NOTES, "Global singletons → an explicit
//! database handle"). Packages `subnets`, `shared_networks`,
//! `host_*_hash`, `lease_*_hash`, and `host_id_info` into one value
//! constructed by the caller and passed to every operation, replacing the
//! original's process-wide globals.
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::class::{Class, Collections};
use crate::failover::FailoverChannel;
use crate::flags::HostFlags;
use crate::host::{Host, HostIdRegistry};
use crate::ids::{ClassId, HostId, LeaseId, PoolId, SharedNetworkId, SubnetId};
use crate::lease::Lease;
use crate::persistence::{Ddns, Journal, Timer};
use crate::queue::{Queue, QueueKind};
use crate::topology::{Pool, SharedNetwork, Subnet};

/// Startup reconciliation phase (DESIGN NOTES, "Coroutine-like
/// scheduling"): replaces the original's module-level `server_starting`
/// bitmask (`SS_NOSYNC`, `SS_QFOLLOW`) with an explicit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// normal runtime operation: every commit syncs, queue insertion always
    /// restarts its scan from the head.
    Running,
    /// replaying the lease journal at startup (`expire_all_pools`, §4.6):
    /// `nosync` suppresses `commit_leases` calls, `qfollow` enables the
    /// queue insertion fast path (§4.4).
    Starting { nosync: bool, qfollow: bool },
}

impl Phase {
    pub fn nosync(&self) -> bool {
        matches!(self, Phase::Starting { nosync: true, .. })
    }

    pub fn qfollow(&self) -> bool {
        matches!(self, Phase::Starting { qfollow: true, .. })
    }
}

pub struct Database<J: Journal> {
    pub(crate) journal: J,
    pub(crate) timer: Option<Arc<dyn Timer>>,
    pub(crate) ddns: Option<Arc<dyn Ddns>>,
    pub(crate) failover: Option<Arc<dyn FailoverChannel>>,

    pub(crate) phase: Phase,

    pub(crate) leases: Vec<Lease>,
    pub(crate) hosts: Vec<Host>,
    pub(crate) subnets: Vec<Subnet>,
    pub(crate) shared_networks: Vec<SharedNetwork>,
    pub(crate) pools: Vec<Pool>,
    pub(crate) classes: Vec<Class>,
    pub(crate) collections: Collections,
    pub(crate) host_id_info: HostIdRegistry,

    pub(crate) lease_ip_addr_hash: HashMap<IpAddr, LeaseId>,
    pub(crate) lease_uid_hash: HashMap<Vec<u8>, LeaseId>,
    pub(crate) lease_hw_addr_hash: HashMap<Vec<u8>, LeaseId>,

    pub(crate) host_name_hash: HashMap<String, HostId>,
    pub(crate) host_uid_hash: HashMap<Vec<u8>, HostId>,
    pub(crate) host_hw_addr_hash: HashMap<Vec<u8>, HostId>,
}

impl<J: Journal> Database<J> {
    pub fn new(journal: J) -> Self {
        Self {
            journal,
            timer: None,
            ddns: None,
            failover: None,
            phase: Phase::Running,
            leases: Vec::new(),
            hosts: Vec::new(),
            subnets: Vec::new(),
            shared_networks: Vec::new(),
            pools: Vec::new(),
            classes: Vec::new(),
            collections: Collections::default(),
            host_id_info: HostIdRegistry::default(),
            lease_ip_addr_hash: HashMap::new(),
            lease_uid_hash: HashMap::new(),
            lease_hw_addr_hash: HashMap::new(),
            host_name_hash: HashMap::new(),
            host_uid_hash: HashMap::new(),
            host_hw_addr_hash: HashMap::new(),
        }
    }

    pub fn set_timer(&mut self, timer: Arc<dyn Timer>) {
        self.timer = Some(timer);
    }

    pub fn set_ddns(&mut self, ddns: Arc<dyn Ddns>) {
        self.ddns = Some(ddns);
    }

    pub fn set_failover(&mut self, failover: Arc<dyn FailoverChannel>) {
        self.failover = Some(failover);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    // --- arena accessors -------------------------------------------------

    pub fn lease(&self, id: LeaseId) -> &Lease {
        &self.leases[id.index()]
    }

    pub(crate) fn lease_mut(&mut self, id: LeaseId) -> &mut Lease {
        &mut self.leases[id.index()]
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.index()]
    }

    pub(crate) fn host_mut(&mut self, id: HostId) -> &mut Host {
        &mut self.hosts[id.index()]
    }

    pub fn pool(&self, id: PoolId) -> &Pool {
        &self.pools[id.index()]
    }

    pub(crate) fn pool_mut(&mut self, id: PoolId) -> &mut Pool {
        &mut self.pools[id.index()]
    }

    pub fn subnet(&self, id: SubnetId) -> &Subnet {
        &self.subnets[id.index()]
    }

    pub fn shared_network(&self, id: SharedNetworkId) -> &SharedNetwork {
        &self.shared_networks[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub fn leases_iter(&self) -> impl Iterator<Item = &Lease> {
        self.leases.iter()
    }

    pub fn hosts_iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn pools_iter(&self) -> impl Iterator<Item = &Pool> {
        self.pools.iter()
    }

    /// full-state dump for the persistence bridge's rewrite/compaction path
    /// (`mdb.c`'s `write_leases`/`write_leases4`): every lease, plus every
    /// host that is neither logically deleted nor statically declared
    /// (static hosts come from configuration, not the journal). Returns the
    /// count of records the journal accepted; a write failure on one record
    /// is logged and does not abort the rest of the dump — unlike the
    /// original, whose success counter is documented to increment on
    /// failure too, this one only counts actual successes.
    pub async fn snapshot(&self) -> usize {
        let mut written = 0usize;
        for lease in &self.leases {
            match self.journal.write_lease(lease).await {
                Ok(()) => written += 1,
                Err(err) => tracing::error!(ip = %lease.ip_addr, error = %err, "snapshot: failed to write lease"),
            }
        }
        for host in &self.hosts {
            if host.flags.contains(HostFlags::DECL_DELETED) || host.flags.contains(HostFlags::DECL_STATIC) {
                continue;
            }
            match self.journal.write_host(host).await {
                Ok(()) => written += 1,
                Err(err) => tracing::error!(name = %host.name, error = %err, "snapshot: failed to write host"),
            }
        }
        written
    }

    /// debug introspection grounded on `mdb.c`'s `dump_subnets`: renders
    /// pool queue occupancy for operator diagnostics.
    pub fn dump_subnets(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for pool in &self.pools {
            let _ = writeln!(
                out,
                "pool {}: free={} active={} expired={} abandoned={} backup={} reserved={} (free_leases={} backup_leases={})",
                pool.id(),
                count_queue(self, pool.queue(QueueKind::Free)),
                count_queue(self, pool.queue(QueueKind::Active)),
                count_queue(self, pool.queue(QueueKind::Expired)),
                count_queue(self, pool.queue(QueueKind::Abandoned)),
                count_queue(self, pool.queue(QueueKind::Backup)),
                count_queue(self, pool.queue(QueueKind::Reserved)),
                pool.free_leases,
                pool.backup_leases,
            );
        }
        out
    }
}

fn count_queue<J: Journal>(db: &Database<J>, queue: &Queue) -> usize {
    let mut n = 0;
    let mut cur = queue.head();
    while let Some(id) = cur {
        n += 1;
        cur = db.lease(id).next;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::scope::Scope;
    use crate::topology::Subnet;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJournal {
        leases_written: AtomicUsize,
        hosts_written: AtomicUsize,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counting journal error")]
    struct NoopError;

    #[async_trait]
    impl Journal for CountingJournal {
        type Error = NoopError;
        async fn write_host(&self, _host: &Host) -> Result<(), Self::Error> {
            self.hosts_written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn write_lease(&self, _lease: &Lease) -> Result<(), Self::Error> {
            self.leases_written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn write_named_billing_class(&self, _name: &str, _cp: Option<&[u8]>) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_group(&self, _name: &str, _group: &Scope) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn commit_leases(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn snapshot_skips_deleted_and_static_hosts() {
        let mut db = Database::new(CountingJournal::default());
        let subnet_id = SubnetId(0);
        db.subnets.push(Subnet {
            id: subnet_id,
            net: Ipv4Addr::new(10, 0, 0, 0),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            shared_network: None,
            next_sibling: None,
        });
        let pool_id = PoolId(0);
        db.pools.push(Pool::new(pool_id));
        db.new_address_range(Ipv4Addr::new(10, 0, 0, 10), Ipv4Addr::new(10, 0, 0, 10), subnet_id, pool_id);

        db.enter_host(Host::new(HostId(0), "dynamic-a"), true, false)
            .await
            .unwrap();
        let mut static_host = Host::new(HostId(0), "static-b");
        static_host.flags.insert(HostFlags::DECL_STATIC);
        db.enter_host(static_host, false, false).await.unwrap();
        let deleted = db
            .enter_host(Host::new(HostId(0), "dynamic-c"), true, false)
            .await
            .unwrap();
        db.delete_host(deleted, false).await.unwrap();

        let written = db.snapshot().await;
        assert_eq!(written, 2); // 1 lease + 1 live dynamic host
        assert_eq!(db.journal().leases_written.load(Ordering::SeqCst), 1);
        assert_eq!(db.journal().hosts_written.load(Ordering::SeqCst), 1);
    }
}
