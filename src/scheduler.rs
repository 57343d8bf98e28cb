//! Pool expiry timer and startup reconciliation (§4.6).
use crate::db::{Database, Phase};
use crate::error::DbError;
use crate::failover::{PeerState, Role};
use crate::ids::PoolId;
use crate::lease::BindingState;
use crate::persistence::Journal;
use crate::queue::QueueKind;
use crate::time::{self, Time, MAX_TIME, MIN_TIME};

impl<J: Journal> Database<J> {
    /// §4.6 `pool_timer`: reclaim every due lease in `pool` and rearm its
    /// timer at the next pending expiry. Uses the wall clock; see
    /// [`Self::pool_timer_at`] for a clock-injectable variant used by
    /// tests.
    pub async fn pool_timer(&mut self, pool_id: PoolId) -> Result<(), DbError<J::Error>> {
        self.pool_timer_at(pool_id, time::now()).await
    }

    /// clock-injectable variant of [`Self::pool_timer`], for deterministic
    /// tests.
    pub async fn pool_timer_at(&mut self, pool_id: PoolId, now: Time) -> Result<(), DbError<J::Error>> {
        let peer = self.pool(pool_id).failover_peer;
        let partner_down = peer.map(|p| p.state == PeerState::PartnerDown).unwrap_or(false);
        let is_secondary = peer.map(|p| p.i_am == Role::Secondary).unwrap_or(false);

        let mut next_expiry = MAX_TIME;

        for kind in QueueKind::ALL {
            // FREE leases carry `sort_time == MIN_TIME` and are never
            // reclaimed by the timer; BACKUP leases belong to the partner
            // and are only ever moved by an explicit failover transaction.
            if matches!(kind, QueueKind::Free | QueueKind::Backup) {
                continue;
            }
            if kind == QueueKind::Active && is_secondary && !partner_down {
                continue;
            }
            if kind == QueueKind::Expired && peer.is_some() && !partner_down {
                continue;
            }

            let mut due = Vec::new();
            let mut cur = self.pool(pool_id).queue(kind).head();
            while let Some(id) = cur {
                let sort_time = self.lease(id).sort_time;
                if sort_time > now {
                    next_expiry = next_expiry.min(sort_time);
                    break;
                }
                due.push(id);
                cur = self.lease(id).next;
            }

            for id in due {
                if kind == QueueKind::Abandoned {
                    let rewind = self.lease(id).rewind_binding_state;
                    if rewind != BindingState::Abandoned {
                        self.lease_mut(id).next_binding_state = rewind;
                    }
                }
                if self.lease(id).next_binding_state == self.lease(id).binding_state {
                    // a reserved-queue lease parked in its own state (e.g. FREE)
                    // past sort_time has nothing to transition to; resuperseding
                    // it would re-fire journal/failover side effects forever.
                    continue;
                }
                let ip = self.lease(id).ip_addr;
                let sort_time = time::format(self.lease(id).sort_time);
                tracing::debug!(%ip, %sort_time, queue = ?kind, "pool_timer reclaiming due lease");
                self.supersede_lease(id, None, true, true, true, true).await?;
            }
        }

        if next_expiry == MAX_TIME {
            self.pool_mut(pool_id).next_event_time = MIN_TIME;
        } else {
            self.pool_mut(pool_id).next_event_time = next_expiry;
            if let Some(timer) = self.timer.clone() {
                timer.add_timeout(next_expiry, pool_id);
            }
        }
        Ok(())
    }

    /// §4.6 startup reconciliation. Runs with `qfollow` on so every lease
    /// replayed from the journal takes the queue-insertion fast path, then
    /// runs [`Self::pool_timer`] over every pool once to reclaim anything
    /// already due, and finally recomputes `lease_count`/`free_leases`/
    /// `backup_leases` by walking the queues directly rather than trusting
    /// counters accumulated during replay.
    pub async fn expire_all_pools(&mut self) -> Result<(), DbError<J::Error>> {
        self.phase = Phase::Starting {
            nosync: true,
            qfollow: true,
        };

        let lease_ids: Vec<_> = self.leases_iter().map(|l| l.id()).collect();
        for id in lease_ids {
            let Some(pool_id) = self.lease(id).pool else {
                continue;
            };
            // a lease without a failover peer parked in BACKUP belongs to
            // no partner: demote it to FREE before it's ever enqueued.
            if self.lease(id).binding_state == BindingState::Backup
                && self.pool(pool_id).failover_peer.is_none()
            {
                self.lease_mut(id).binding_state = BindingState::Free;
                self.lease_mut(id).next_binding_state = BindingState::Free;
            }
            self.enqueue_lease(pool_id, id);
        }

        self.phase = Phase::Starting {
            nosync: true,
            qfollow: false,
        };

        let pool_ids: Vec<_> = self.pools_iter().map(|p| p.id()).collect();
        for pool_id in &pool_ids {
            self.pool_timer(*pool_id).await?;
        }

        for pool_id in &pool_ids {
            let mut lease_count = 0usize;
            let mut free_leases = 0usize;
            let mut backup_leases = 0usize;
            for kind in QueueKind::ALL {
                let mut cur = self.pool(*pool_id).queue(kind).head();
                while let Some(id) = cur {
                    lease_count += 1;
                    match kind {
                        QueueKind::Free => free_leases += 1,
                        QueueKind::Backup => backup_leases += 1,
                        _ => {}
                    }
                    cur = self.lease(id).next;
                }
            }
            let pool = self.pool_mut(*pool_id);
            pool.lease_count = lease_count;
            pool.free_leases = free_leases;
            pool.backup_leases = backup_leases;
        }

        self.phase = Phase::Running;
        Ok(())
    }
}
