//! Per-pool state queues and `sort_time` ordering (§4.4).
use crate::db::Database;
use crate::failover::PeerState;
use crate::flags::LeaseFlags;
use crate::ids::{LeaseId, PoolId};
use crate::lease::BindingState;
use crate::persistence::Journal;
use crate::time::Time;

/// The six binding-state queues a pool owns (§3 Pool, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Free,
    Active,
    Expired,
    Abandoned,
    Backup,
    Reserved,
}

impl QueueKind {
    /// iteration order used by `pool_timer` (§4.6): "FREE→RESERVED"
    pub const ALL: [QueueKind; 6] = [
        QueueKind::Free,
        QueueKind::Active,
        QueueKind::Expired,
        QueueKind::Abandoned,
        QueueKind::Backup,
        QueueKind::Reserved,
    ];
}

/// An insertion-sorted singly linked list of leases, keyed by `sort_time`
/// (§4.4). The chain pointers live on [`crate::lease::Lease::next`]; this
/// type is just the head plus the fast-path insertion memo.
#[derive(Debug, Default, Clone, Copy)]
pub struct Queue {
    pub(crate) head: Option<LeaseId>,
}

impl Queue {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<LeaseId> {
        self.head
    }
}

/// Startup fast-path insertion memo (§4.4: "A fast-path insertion
/// optimization is honored only during startup"). One pool-wide memo,
/// matching the original's single `last_lq`/`last_insert_point` statics —
/// here scoped to the pool instead of being a process-global, since each
/// pool's queues are logically independent insertion sequences.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct InsertMemo {
    pub(crate) queue: Option<QueueKind>,
    pub(crate) point: Option<LeaseId>,
}

/// which of the six queues a lease belongs to, from its state and flags
/// (§4.4, §4.5 field copy step — `RESERVED_LEASE` always wins; EXPIRED,
/// RELEASED, and RESET all share the `expired` queue, matching the
/// original's `lease->binding_state` switch in `supersede_lease`).
pub(crate) fn queue_kind_for(state: BindingState, flags: LeaseFlags) -> QueueKind {
    if flags.contains(LeaseFlags::RESERVED_LEASE) {
        return QueueKind::Reserved;
    }
    match state {
        BindingState::Free => QueueKind::Free,
        BindingState::Active => QueueKind::Active,
        BindingState::Expired | BindingState::Released | BindingState::Reset => QueueKind::Expired,
        BindingState::Abandoned => QueueKind::Abandoned,
        BindingState::Backup => QueueKind::Backup,
    }
}

/// §4.4's `sort_time` assignment table.
pub(crate) fn sort_time_for(
    state: BindingState,
    flags: LeaseFlags,
    ends: Time,
    tsfp: Time,
    partner_down: bool,
) -> Time {
    if flags.contains(LeaseFlags::RESERVED_LEASE) {
        return ends;
    }
    match state {
        BindingState::Expired | BindingState::Released | BindingState::Reset if partner_down => {
            ends.max(tsfp)
        }
        _ => ends,
    }
}

impl<J: Journal> Database<J> {
    /// insert `id` into its pool's proper queue in `sort_time` order
    /// (§4.4), honoring the startup fast-path memo, and keep
    /// `free_leases`/`backup_leases` in step (invariant 6, §8.4).
    pub(crate) fn enqueue_lease(&mut self, pool_id: PoolId, id: LeaseId) {
        let (state, flags, ends, tsfp) = {
            let l = self.lease(id);
            (l.binding_state, l.flags, l.ends, l.tsfp)
        };
        let kind = queue_kind_for(state, flags);
        let partner_down = self
            .pool(pool_id)
            .failover_peer
            .map(|p| p.state == PeerState::PartnerDown)
            .unwrap_or(false);
        let sort_time = sort_time_for(state, flags, ends, tsfp, partner_down);
        self.lease_mut(id).sort_time = sort_time;

        let memo = self.pool(pool_id).insert_memo;
        let fast_path = self.phase.qfollow()
            && memo.queue == Some(kind)
            && memo
                .point
                .map(|p| self.lease(p).sort_time <= sort_time)
                .unwrap_or(false);
        let start = if fast_path { memo.point } else { None };

        let mut prev = start;
        let mut scan = match start {
            Some(p) => self.lease(p).next,
            None => self.pool(pool_id).queue(kind).head(),
        };
        while let Some(c) = scan {
            if self.lease(c).sort_time > sort_time {
                break;
            }
            prev = Some(c);
            scan = self.lease(c).next;
        }

        match prev {
            Some(p) => {
                let next = self.lease(p).next;
                self.lease_mut(id).next = next;
                self.lease_mut(p).next = Some(id);
            }
            None => {
                let head = self.pool(pool_id).queue(kind).head();
                self.lease_mut(id).next = head;
                self.pool_mut(pool_id).queue_mut(kind).head = Some(id);
            }
        }

        let pool = self.pool_mut(pool_id);
        pool.insert_memo.queue = Some(kind);
        pool.insert_memo.point = Some(id);
        match kind {
            QueueKind::Free => pool.free_leases += 1,
            QueueKind::Backup => pool.backup_leases += 1,
            _ => {}
        }
    }

    /// unlink `id` from `kind`'s queue. Absence is a programming error and
    /// panics, matching the original's fatal "lease not found on queue"
    /// (§4.4, §7).
    pub(crate) fn dequeue_lease(&mut self, pool_id: PoolId, kind: QueueKind, id: LeaseId) {
        let mut prev: Option<LeaseId> = None;
        let mut cur = self.pool(pool_id).queue(kind).head();
        while let Some(c) = cur {
            if c == id {
                let next = self.lease(c).next;
                match prev {
                    Some(p) => self.lease_mut(p).next = next,
                    None => self.pool_mut(pool_id).queue_mut(kind).head = next,
                }
                self.lease_mut(id).next = None;
                let pool = self.pool_mut(pool_id);
                match kind {
                    QueueKind::Free => pool.free_leases -= 1,
                    QueueKind::Backup => pool.backup_leases -= 1,
                    _ => {}
                }
                if pool.insert_memo.point == Some(id) {
                    pool.insert_memo.point = None;
                    pool.insert_memo.queue = None;
                }
                return;
            }
            prev = Some(c);
            cur = self.lease(c).next;
        }
        panic!("dequeue_lease: lease {id} not present in pool {pool_id}'s {kind:?} queue");
    }
}
