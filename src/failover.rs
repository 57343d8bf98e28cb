//! Failover peer state consumed by the state machine and scheduler (§6,
//! "Failover contract (consumed)"). The failover protocol state machine
//! itself is out of scope (§1) — this is just the slice of peer state the
//! core reads.
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Normal,
    CommunicationsInterrupted,
    PartnerDown,
    Recover,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Cooperating,
    NotCooperating,
    NotResponding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPeer {
    pub i_am: Role,
    pub state: PeerState,
    pub service_state: ServiceState,
    /// start-of-state-transition time
    pub stos: Time,
    /// maximum client lead time
    pub mclt: Time,
}

impl FailoverPeer {
    pub fn is_partner_down(&self) -> bool {
        self.state == PeerState::PartnerDown
    }
}

/// Collaborator invoked to propagate a lease update and to recheck a
/// pool's failover posture (§6). Kept as a trait object on
/// [`crate::db::Database`] since it's called rarely compared to the
/// journal, which is on every commit's hot path.
pub trait FailoverChannel: Send + Sync {
    /// queue (or send immediately) an update describing `lease` to the peer
    fn queue_update(&self, lease: &crate::lease::Lease, immediate: bool) -> bool;
    /// re-examine a pool's lease distribution against failover policy
    fn pool_check(&self, pool: crate::ids::PoolId);
}
