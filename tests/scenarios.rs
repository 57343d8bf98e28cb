//! End-to-end scenario tests (S1-S6), exercising the public API the way a
//! caller driving the state machine from packet handling would.
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dhcp_db::{
    BindingState, Database, Host, HostIdOption, Journal, Lease, RelayPacket, Scope,
};

#[derive(Default)]
struct CountingJournal {
    leases_written: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
#[error("counting journal error")]
struct NoopError;

#[async_trait]
impl Journal for CountingJournal {
    type Error = NoopError;
    async fn write_host(&self, _host: &Host) -> Result<(), Self::Error> {
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

fn range_addr(n: u8) -> IpAddr {
    IpAddr::from(Ipv4Addr::new(10, 0, 0, n))
}

#[tokio::test]
async fn s1_range_declaration() {
    let mut db = Database::new(CountingJournal::default());
    let subnet = db.enter_subnet(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 0), None);
    let pool = db.enter_pool(None);
    let chain = db.new_address_range(
        Ipv4Addr::new(10, 0, 0, 10),
        Ipv4Addr::new(10, 0, 0, 12),
        subnet,
        pool,
    );

    assert_eq!(chain.len(), 3);
    assert_eq!(db.pool(pool).free_leases, 3);
    for id in &chain {
        assert_eq!(db.lease(*id).binding_state, BindingState::Free);
        assert_eq!(db.lease(*id).sort_time, dhcp_db::time::MIN_TIME);
        assert_eq!(db.find_lease_by_ip_addr(db.lease(*id).ip_addr), Some(*id));
    }
    let ips: Vec<_> = chain.iter().map(|id| db.lease(*id).ip_addr).collect();
    assert_eq!(ips, vec![range_addr(10), range_addr(11), range_addr(12)]);
}

async fn setup_s1() -> (Database<CountingJournal>, dhcp_db::PoolId, dhcp_db::LeaseId) {
    let mut db = Database::new(CountingJournal::default());
    let subnet = db.enter_subnet(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 0), None);
    let pool = db.enter_pool(None);
    let chain = db.new_address_range(
        Ipv4Addr::new(10, 0, 0, 10),
        Ipv4Addr::new(10, 0, 0, 12),
        subnet,
        pool,
    );
    (db, pool, chain[1]) // .11
}

#[tokio::test]
async fn s2_request_ack() {
    let (mut db, pool, lease_id) = setup_s1().await;
    let now = 1_000_000i64;

    let mut sample = db.lease(lease_id).clone_as_sample();
    sample.uid = Some(vec![0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    sample.starts = now;
    sample.cltt = now;
    sample.ends = now + 3600;
    sample.next_binding_state = BindingState::Active;
    db.supersede_lease(lease_id, Some(sample), true, false, true, false)
        .await
        .unwrap();

    assert_eq!(db.pool(pool).free_leases, 2);
    assert_eq!(
        db.find_lease_by_uid(&[0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        Some(lease_id)
    );
    assert_eq!(db.lease(lease_id).sort_time, now + 3600);
    assert_eq!(db.pool(pool).next_event_time, now + 3600);
    assert_eq!(db.journal().leases_written.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s3_expiry_with_no_peer_returns_lease_to_free() {
    let (mut db, pool, lease_id) = setup_s1().await;
    let now = 1_000_000i64;

    let mut sample = db.lease(lease_id).clone_as_sample();
    let uid = vec![0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    sample.uid = Some(uid.clone());
    sample.ends = now + 3600;
    sample.next_binding_state = BindingState::Active;
    db.supersede_lease(lease_id, Some(sample), true, false, true, false)
        .await
        .unwrap();

    db.pool_timer_at(pool, now + 3601).await.unwrap();

    // no failover peer configured on this pool: default_next collapses
    // ACTIVE's expiry straight through to FREE rather than stopping at
    // EXPIRED (§4.5 step 6, "Active -> Expired if has_peer else Free").
    assert_eq!(db.lease(lease_id).binding_state, BindingState::Free);
    assert_eq!(db.pool(pool).free_leases, 3);
    // index entries for an expired (not released) lease are untouched by
    // the no-sample supersede path.
    assert_eq!(db.find_lease_by_uid(&uid), Some(lease_id));
}

#[tokio::test]
async fn s4_conflicting_uid_replaces_old_index_entry() {
    let (mut db, _pool, lease_id) = setup_s1().await;
    let now = 1_000_000i64;

    let mut first = db.lease(lease_id).clone_as_sample();
    first.uid = Some(vec![0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    first.ends = now + 3600;
    first.next_binding_state = BindingState::Active;
    db.supersede_lease(lease_id, Some(first), true, false, true, false)
        .await
        .unwrap();

    let mut second = db.lease(lease_id).clone_as_sample();
    second.uid = Some(vec![0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    second.ends = now + 7200;
    second.next_binding_state = BindingState::Active;
    db.supersede_lease(lease_id, Some(second), true, false, true, false)
        .await
        .unwrap();

    assert_eq!(
        db.find_lease_by_uid(&[0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        None
    );
    assert_eq!(
        db.find_lease_by_uid(&[0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        Some(lease_id)
    );
    assert_eq!(db.journal().leases_written.load(Ordering::SeqCst), 2);
}

struct Frame<'a> {
    code_value: Option<(u16, Vec<u8>)>,
    inner: Option<&'a Frame<'a>>,
}

impl<'a> RelayPacket for Frame<'a> {
    fn inner(&self) -> Option<&dyn RelayPacket> {
        self.inner.map(|f| f as &dyn RelayPacket)
    }
    fn option_value(&self, code: u16) -> Option<Vec<u8>> {
        match &self.code_value {
            Some((c, v)) if *c == code => Some(v.clone()),
            _ => None,
        }
    }
}

#[tokio::test]
async fn s5_host_lookup_by_relayed_option() {
    let mut db = Database::new(CountingJournal::default());
    let mut host = Host::new(Default::default(), "relay-client");
    host.host_id_option = Some(HostIdOption { code: 37, relays: 2 });
    host.host_id = Some(vec![0xDE, 0xAD, 0xBE, 0xEF]);
    let id = db.enter_host(host, false, false).await.unwrap();

    let innermost = Frame {
        code_value: Some((37, vec![0xDE, 0xAD, 0xBE, 0xEF])),
        inner: None,
    };
    let middle = Frame {
        code_value: None,
        inner: Some(&innermost),
    };
    let outer = Frame {
        code_value: None,
        inner: Some(&middle),
    };
    assert_eq!(db.find_hosts_by_option(&outer), Some(id));

    let shallow = Frame {
        code_value: None,
        inner: Some(&innermost),
    };
    assert_eq!(db.find_hosts_by_option(&shallow), None);
}

#[tokio::test]
async fn s6_abandon_and_recover() {
    let (mut db, _pool, lease_id) = setup_s1().await;
    let now = 1_000_000i64;

    let mut active = db.lease(lease_id).clone_as_sample();
    active.uid = Some(vec![0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    active.ends = now + 3600;
    active.next_binding_state = BindingState::Active;
    db.supersede_lease(lease_id, Some(active), true, false, true, false)
        .await
        .unwrap();

    db.abandon_lease(lease_id, "decline received", now, 86_400)
        .await
        .unwrap();

    assert_eq!(db.lease(lease_id).binding_state, BindingState::Abandoned);
    assert_eq!(db.lease(lease_id).uid, None);
    assert_eq!(db.lease(lease_id).hardware_addr, None);
    assert_eq!(db.lease(lease_id).ends, now + 86_400);
    assert_eq!(
        db.find_lease_by_uid(&[0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        None
    );
    // recovery: a later abandon past MAX_TIME caps rather than overflows.
    db.abandon_lease(lease_id, "decline received again", dhcp_db::time::MAX_TIME, 86_400)
        .await
        .unwrap();
    assert_eq!(db.lease(lease_id).ends, dhcp_db::time::MAX_TIME);
}
