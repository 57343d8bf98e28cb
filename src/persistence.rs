//! The persistence bridge (§6 "Journal contract (consumed)").
//!
//! The concrete log format, file layout, and fsync policy are out of scope
//! (§1) — the database only needs an append-and-flush contract. Modeled on
//! `ip-manager::Storage`: an `async_trait` so a real implementation can
//! suspend on I/O (§5, "Suspension points") without blocking the single
//! server thread, with an associated `Error` type threaded through
//! [`crate::error::DbError`].
use async_trait::async_trait;

use crate::host::Host;
use crate::lease::Lease;
use crate::scope::Scope;

#[async_trait]
pub trait Journal: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn write_host(&self, host: &Host) -> Result<(), Self::Error>;
    async fn write_lease(&self, lease: &Lease) -> Result<(), Self::Error>;
    async fn write_named_billing_class(&self, name: &str, cp: Option<&[u8]>)
        -> Result<(), Self::Error>;
    async fn write_group(&self, name: &str, group: &Scope) -> Result<(), Self::Error>;
    async fn commit_leases(&self) -> Result<(), Self::Error>;
}

/// DDNS removals invoked before `on_expiry`/`on_release` fire (§6, §4.5).
/// The update engine itself is out of scope (§1) — this is the narrow slice
/// the state machine calls into.
pub trait Ddns: Send + Sync {
    fn removals(&self, lease: &Lease, active: bool);
}

/// Timer registration for pool expiry (§6 "Timer contract (consumed)").
/// The event loop that eventually calls back into
/// [`crate::db::Database::pool_timer`] lives outside this crate.
pub trait Timer: Send + Sync {
    fn add_timeout(&self, when: crate::time::Time, pool: crate::ids::PoolId);
}
