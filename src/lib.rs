//! In-memory DHCP lease and host database.
//!
//! Modeled on ISC `dhcpd`'s `mdb.c`: one [`db::Database`] handle owns every
//! lease, host, subnet, shared network, pool, and class as a flat arena,
//! replacing the original's process-wide globals and reference-counted
//! pointers. Persistence, DDNS, timers, and failover are consumed through
//! the traits in [`persistence`] and [`failover`] — this crate owns the
//! state machine, not the I/O around it.
pub mod class;
pub mod class_registry;
pub mod db;
pub mod error;
pub mod failover;
pub mod flags;
pub mod hooks;
pub mod host;
pub mod host_registry;
pub mod ids;
pub mod index;
pub mod lease;
pub mod lease_registry;
pub mod persistence;
pub mod queue;
pub mod scheduler;
pub mod scope;
pub mod state_machine;
pub mod time;
pub mod topology;
pub mod topology_registry;

pub use class::Class;
pub use db::{Database, Phase};
pub use error::DbError;
pub use failover::{FailoverChannel, FailoverPeer, PeerState, Role, ServiceState};
pub use flags::{ClassFlags, HostFlags, LeaseFlags};
pub use hooks::{Hook, HookContext, HookEvent};
pub use host::{Host, HostIdOption, RelayPacket, MAX_V6RELAY_HOPS};
pub use ids::{ClassId, HostId, LeaseId, PoolId, SharedNetworkId, SubnetId};
pub use lease::{BindingState, DdnsControlBlock, HwAddr, Lease};
pub use persistence::{Ddns, Journal, Timer};
pub use queue::{Queue, QueueKind};
pub use scope::Scope;
pub use state_machine::SupersedeSample;
pub use topology::{Pool, PoolRange, SharedNetwork, Subnet};
