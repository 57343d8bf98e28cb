//! `supersede_lease` and `make_binding_state_transition` (§4.5).
use std::net::IpAddr;

use crate::db::Database;
use crate::error::DbError;
use crate::failover::PeerState;
use crate::flags::LeaseFlags;
use crate::hooks::{Hook, HookContext, HookEvent};
use crate::ids::{ClassId, HostId, LeaseId, PoolId};
use crate::lease::{BindingState, DdnsControlBlock, HwAddr};
use crate::persistence::Journal;
use crate::queue::{queue_kind_for, QueueKind};
use crate::scope::Scope;
use crate::time::{Time, MIN_TIME};

/// the mutable fields a transition proposes for an existing lease (§4.5
/// step 4's field-copy list). Identity fields (`ip_addr`, `pool`,
/// `subnet`, chain links) are never part of a sample — they belong to the
/// existing lease and are untouched by a supersede.
#[derive(Debug, Clone)]
pub struct SupersedeSample {
    pub starts: Time,
    pub ends: Time,
    pub cltt: Time,
    pub tstp: Time,
    pub tsfp: Time,
    pub atsfp: Time,
    pub uid: Option<Vec<u8>>,
    pub hardware_addr: Option<HwAddr>,
    pub host: Option<HostId>,
    pub billing_class: Option<ClassId>,
    pub scope: Option<Scope>,
    pub agent_options: Option<Vec<u8>>,
    pub client_hostname: Option<String>,
    pub on_expiry: Option<Hook>,
    pub on_commit: Option<Hook>,
    pub on_release: Option<Hook>,
    pub ddns_cb: Option<DdnsControlBlock>,
    pub next_binding_state: BindingState,
    pub flags: LeaseFlags,
}

impl<J: Journal> Database<J> {
    /// §4.5 `supersede_lease`. With no `sample`, only the queue position is
    /// refreshed. Otherwise runs conflict detection, index withdrawal,
    /// billing, field copy, re-enqueue, timer arming, persistence, and
    /// failover propagation in that order.
    pub async fn supersede_lease(
        &mut self,
        existing_id: LeaseId,
        sample: Option<SupersedeSample>,
        commit: bool,
        propagate: bool,
        immediate: bool,
        from_pool: bool,
    ) -> Result<(), DbError<J::Error>> {
        if immediate && !commit {
            return Err(DbError::ImmediateWithoutCommit);
        }

        let pool_id = self
            .lease(existing_id)
            .pool
            .ok_or_else(|| DbError::NoPool(self.lease(existing_id).ip_addr))?;

        let Some(sample) = sample else {
            // no new client data: the caller (typically the scheduler) has
            // already set `next_binding_state`, possibly after a rewind.
            // Still run the transition and re-sort, still persist if asked.
            let old_kind = queue_kind_for(self.lease(existing_id).binding_state, self.lease(existing_id).flags);
            self.dequeue_lease(pool_id, old_kind, existing_id);
            self.make_binding_state_transition(existing_id);
            self.enqueue_lease(pool_id, existing_id);
            let sort_time = self.lease(existing_id).sort_time;
            self.arm_timer_if_earlier(pool_id, sort_time);

            if commit {
                let lease_ref = self.lease(existing_id);
                self.journal.write_lease(lease_ref).await?;
                if !self.phase.nosync() {
                    self.journal.commit_leases().await?;
                }
            }
            if propagate {
                if let Some(failover) = self.failover.clone() {
                    failover.queue_update(self.lease(existing_id), immediate);
                }
                self.lease_mut(existing_id).atsfp = MIN_TIME;
            }
            return Ok(());
        };

        if sample.flags.contains(LeaseFlags::STATIC_LEASE) {
            // static leases are not kept in the database; treat the sample
            // as a no-op rather than churning indices/queues for it.
            return Ok(());
        }

        self.detect_conflict(existing_id, &sample);

        if let Some(uid) = self.lease(existing_id).uid.clone() {
            if !uid.is_empty() {
                self.chain_remove_lease_uid(&uid, existing_id);
            }
        }
        if let Some(hw) = self.lease(existing_id).hardware_addr.clone() {
            if !hw.is_infiniband() {
                self.chain_remove_lease_hw(&hw.hash_key(), existing_id);
            }
        }

        let old_class = self.lease(existing_id).billing_class;
        if old_class != sample.billing_class {
            if let Some(old) = old_class {
                self.class_mut(old).leases_billed = self.class(old).leases_billed.saturating_sub(1);
            }
            if let Some(new) = sample.billing_class {
                self.class_mut(new).leases_billed += 1;
            }
        }

        let retain_agent_options =
            matches!(sample.next_binding_state, BindingState::Active | BindingState::Expired);
        let old_flags = self.lease(existing_id).flags;
        let new_flags = (sample.flags & !LeaseFlags::PERSISTENT_FLAGS) | (old_flags & !LeaseFlags::EPHEMERAL_FLAGS);
        let old_kind = queue_kind_for(self.lease(existing_id).binding_state, old_flags);

        {
            let lease = self.lease_mut(existing_id);
            lease.starts = sample.starts;
            lease.uid = sample.uid;
            lease.host = sample.host;
            lease.hardware_addr = sample.hardware_addr;
            lease.scope = sample.scope;
            lease.agent_options = if retain_agent_options { sample.agent_options } else { None };
            lease.client_hostname = sample.client_hostname;
            lease.on_expiry = sample.on_expiry;
            lease.on_commit = sample.on_commit;
            lease.on_release = sample.on_release;
            lease.cltt = sample.cltt;
            lease.tstp = sample.tstp;
            lease.tsfp = sample.tsfp;
            lease.atsfp = sample.atsfp;
            lease.ends = sample.ends;
            lease.next_binding_state = sample.next_binding_state;
            lease.ddns_cb = sample.ddns_cb;
            lease.billing_class = sample.billing_class;
            lease.flags = new_flags;
        }

        if let Some(uid) = self.lease(existing_id).uid.clone() {
            if !uid.is_empty() {
                self.insert_lease_uid_sorted(uid, existing_id);
            }
        }
        if let Some(hw) = self.lease(existing_id).hardware_addr.clone() {
            if !hw.is_infiniband() {
                self.insert_lease_hw_sorted(hw.hash_key(), existing_id);
            }
        }

        self.dequeue_lease(pool_id, old_kind, existing_id);
        self.make_binding_state_transition(existing_id);
        self.enqueue_lease(pool_id, existing_id);

        let sort_time = self.lease(existing_id).sort_time;
        self.arm_timer_if_earlier(pool_id, sort_time);

        if commit {
            let lease_ref = self.lease(existing_id);
            self.journal.write_lease(lease_ref).await?;
            if !self.phase.nosync() {
                self.journal.commit_leases().await?;
            }
        }

        if propagate {
            if let Some(failover) = self.failover.clone() {
                failover.queue_update(self.lease(existing_id), immediate);
            }
            self.lease_mut(existing_id).atsfp = MIN_TIME;
            if !from_pool {
                let already_expired =
                    matches!(self.lease(existing_id).binding_state, BindingState::Expired | BindingState::Released);
                if already_expired {
                    Box::pin(self.pool_timer(pool_id)).await?;
                }
            }
        }

        Ok(())
    }

    /// §4.5 step 1: an ACTIVE lease whose sample disagrees on client
    /// identity is logged, not rejected — memory wins, the journal settles
    /// it offline.
    fn detect_conflict(&self, existing_id: LeaseId, sample: &SupersedeSample) {
        if self.lease(existing_id).binding_state != BindingState::Active {
            return;
        }
        let conflict = match (&self.lease(existing_id).uid, &sample.uid) {
            (Some(a), Some(b)) => a != b,
            (None, None) => {
                let existing_hw = self.lease(existing_id).hardware_addr.as_ref().map(HwAddr::hash_key);
                let sample_hw = sample.hardware_addr.as_ref().map(HwAddr::hash_key);
                existing_hw != sample_hw
            }
            _ => true,
        };
        if conflict {
            let ip: IpAddr = self.lease(existing_id).ip_addr;
            let ends = crate::time::format(self.lease(existing_id).ends);
            tracing::warn!(%ip, %ends, "lease conflict: client identity changed on an active lease");
        }
    }

    /// arm `pool`'s expiry timer at `candidate` if no event is pending or
    /// `candidate` precedes the pending one (§4.5 step 6).
    pub(crate) fn arm_timer_if_earlier(&mut self, pool_id: PoolId, candidate: Time) {
        let pool = self.pool(pool_id);
        if pool.next_event_time == MIN_TIME || candidate < pool.next_event_time {
            self.pool_mut(pool_id).next_event_time = candidate;
            if let Some(timer) = self.timer.clone() {
                timer.add_timeout(candidate, pool_id);
            }
        }
    }

    /// §4.5 `make_binding_state_transition`. Fires `on_expiry` or
    /// `on_release` at most once, then computes the default
    /// `next_binding_state` for whatever state was just entered.
    pub fn make_binding_state_transition(&mut self, id: LeaseId) {
        let old_state = self.lease(id).binding_state;
        let new_state = self.lease(id).next_binding_state;
        let pool_id = self.lease(id).pool;
        let peer = pool_id.and_then(|p| self.pool(p).failover_peer);

        let expiry_path = old_state == BindingState::Active
            && matches!(new_state, BindingState::Free | BindingState::Backup | BindingState::Expired);
        let release_path = (old_state == BindingState::Active && new_state == BindingState::Released)
            || (old_state == BindingState::Released && matches!(new_state, BindingState::Free | BindingState::Backup));

        if expiry_path {
            if let Some(ddns) = self.ddns.clone() {
                ddns.removals(self.lease(id), false);
            }
            if let Some(hook) = self.lease(id).on_expiry.clone() {
                hook.fire(&HookContext { lease: self.lease(id), event: HookEvent::Expiry });
            }
            self.lease_mut(id).on_release = None;
            self.unbill_lease(id);
            self.lease_mut(id).agent_options = None;
            self.lease_mut(id).client_hostname = None;
            self.lease_mut(id).host = None;
            let ends = self.lease(id).ends;
            self.lease_mut(id).tstp = ends;
        } else if release_path {
            if let Some(ddns) = self.ddns.clone() {
                ddns.removals(self.lease(id), true);
            }
            if let Some(hook) = self.lease(id).on_release.clone() {
                hook.fire(&HookContext { lease: self.lease(id), event: HookEvent::Release });
            }
            self.lease_mut(id).on_expiry = None;
            self.unbill_lease(id);
            self.lease_mut(id).agent_options = None;
            self.lease_mut(id).client_hostname = None;
            self.lease_mut(id).host = None;
            let ends = self.lease(id).ends;
            self.lease_mut(id).tstp = ends;
        }

        self.lease_mut(id).binding_state = new_state;

        let has_peer = peer.is_some();
        let default_next = match new_state {
            BindingState::Active => {
                if has_peer {
                    BindingState::Expired
                } else {
                    BindingState::Free
                }
            }
            BindingState::Expired | BindingState::Released | BindingState::Abandoned | BindingState::Reset => {
                BindingState::Free
            }
            BindingState::Free | BindingState::Backup => new_state,
        };
        self.lease_mut(id).next_binding_state = default_next;

        let partner_down = peer.map(|p| p.state == PeerState::PartnerDown).unwrap_or(false);
        if partner_down
            && matches!(
                new_state,
                BindingState::Expired | BindingState::Released | BindingState::Abandoned | BindingState::Reset
            )
        {
            if let Some(peer) = peer {
                self.lease_mut(id).tsfp = peer.stos.saturating_add(peer.mclt);
            }
        }
    }

    fn unbill_lease(&mut self, id: LeaseId) {
        if let Some(class) = self.lease(id).billing_class {
            self.class_mut(class).leases_billed = self.class(class).leases_billed.saturating_sub(1);
        }
        self.lease_mut(id).billing_class = None;
    }

    /// `release_lease`: thin wrapper over `supersede_lease` that moves
    /// `id` to RELEASED (`mdb.c`).
    pub async fn release_lease(&mut self, id: LeaseId) -> Result<(), DbError<J::Error>> {
        let mut sample = self.lease(id).clone_as_sample();
        sample.next_binding_state = BindingState::Released;
        self.supersede_lease(id, Some(sample), true, true, true, false).await
    }

    /// `dissociate_lease` (`mdb.c`): clear the client identity immediately
    /// (`ends = now`, no capped abandon window) and return `id` to FREE, or
    /// to RESET when a failover peer is configured on its pool so the peer
    /// sees the change go through the normal reset/recovery path.
    pub async fn dissociate_lease(&mut self, id: LeaseId, now: Time) -> Result<(), DbError<J::Error>> {
        let mut sample = self.lease(id).clone_as_sample();
        sample.uid = None;
        sample.hardware_addr = None;
        sample.ends = now;
        sample.next_binding_state = match self.lease(id).pool.map(|p| self.pool(p).failover_peer.is_some()) {
            Some(true) => BindingState::Reset,
            _ => BindingState::Free,
        };
        self.supersede_lease(id, Some(sample), true, true, true, false).await
    }

    /// `abandon_lease` (§8 S6): clear the client identity, cap `ends` at
    /// `now + abandon_lease_time`, and move `id` to ABANDONED. Builds the
    /// sample from the lease's own current fields (`mdb.c`'s
    /// `lease_copy(&lt, lease)` into a scratch struct) rather than
    /// allocating a throwaway arena entry — the arena never shrinks, so a
    /// real second `Lease` would outlive its purpose.
    pub async fn abandon_lease(
        &mut self,
        id: LeaseId,
        message: &str,
        now: Time,
        abandon_lease_time: Time,
    ) -> Result<(), DbError<J::Error>> {
        let ip = self.lease(id).ip_addr;
        tracing::warn!(%ip, %message, "abandoning lease");

        let mut sample = self.lease(id).clone_as_sample();
        sample.uid = None;
        sample.hardware_addr = None;
        sample.ddns_cb = None;
        sample.ends = now.saturating_add(abandon_lease_time).min(crate::time::MAX_TIME);
        sample.next_binding_state = BindingState::Abandoned;
        self.supersede_lease(id, Some(sample), true, true, true, false).await
    }
}

impl crate::lease::Lease {
    /// snapshot this lease's copyable fields as a [`SupersedeSample`],
    /// e.g. to resupersede with only `next_binding_state` changed.
    pub fn clone_as_sample(&self) -> SupersedeSample {
        SupersedeSample {
            starts: self.starts,
            ends: self.ends,
            cltt: self.cltt,
            tstp: self.tstp,
            tsfp: self.tsfp,
            atsfp: self.atsfp,
            uid: self.uid.clone(),
            hardware_addr: self.hardware_addr.clone(),
            host: self.host,
            billing_class: self.billing_class,
            scope: self.scope.clone(),
            agent_options: self.agent_options.clone(),
            client_hostname: self.client_hostname.clone(),
            on_expiry: self.on_expiry.clone(),
            on_commit: self.on_commit.clone(),
            on_release: self.on_release.clone(),
            ddns_cb: self.ddns_cb.clone(),
            next_binding_state: self.next_binding_state,
            flags: self.flags,
        }
    }
}
