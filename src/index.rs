//! Chain-index maintenance and client-preference ordering (§4.2, §4.7).
//!
//! The original keeps lease and host collision chains as intrusive linked
//! lists threaded through `n_uid`/`n_hw`/`n_ipaddr`. Here the chain link
//! still lives on the entity (`Lease::n_uid`, `Lease::n_hw`,
//! `Host::n_ipaddr`) but the bucket head lives in a `HashMap` on
//! [`crate::db::Database`] rather than in a fixed-size hash table.
//!
//! Lease chains (UID, HW) are insertion-sorted by [`preferred`] (§4.7): the
//! hash always points at the globally most-preferred lease in the bucket.
//! Host chains (UID, HW, option-value) are not ordered by any policy — a
//! colliding host is linked in directly behind the existing head (§4.2),
//! and the head only changes when the head entry itself is removed.
use crate::db::Database;
use crate::ids::{HostId, LeaseId};
use crate::lease::BindingState;
use crate::persistence::Journal;

impl<J: Journal> Database<J> {
    /// insert `id` into the `lease_uid_hash` bucket for `key` at its sorted
    /// position (§4.7).
    pub(crate) fn insert_lease_uid_sorted(&mut self, key: Vec<u8>, id: LeaseId) {
        let head = self.lease_uid_hash.get(&key).copied();
        let (new_head, reseat) = insert_sorted(head, id, |l| self.lease(l).n_uid, |a, b| {
            preferred(self.lease(a), self.lease(b))
        });
        if let Some((prev, next)) = reseat {
            match prev {
                Some(p) => self.lease_mut(p).n_uid = Some(id),
                None => {}
            }
            self.lease_mut(id).n_uid = next;
        }
        if new_head != head {
            self.lease_uid_hash.insert(key, id);
        }
    }

    /// unlink `id` from the `lease_uid_hash` bucket for `key`.
    pub(crate) fn chain_remove_lease_uid(&mut self, key: &[u8], id: LeaseId) {
        let Some(&head) = self.lease_uid_hash.get(key) else {
            return;
        };
        if head == id {
            match self.lease(id).n_uid {
                Some(next) => {
                    self.lease_uid_hash.insert(key.to_vec(), next);
                }
                None => {
                    self.lease_uid_hash.remove(key);
                }
            }
            self.lease_mut(id).n_uid = None;
            return;
        }
        let mut prev = head;
        loop {
            match self.lease(prev).n_uid {
                Some(c) if c == id => {
                    let after = self.lease(id).n_uid;
                    self.lease_mut(prev).n_uid = after;
                    self.lease_mut(id).n_uid = None;
                    return;
                }
                Some(c) => prev = c,
                None => return,
            }
        }
    }

    pub(crate) fn insert_lease_hw_sorted(&mut self, key: Vec<u8>, id: LeaseId) {
        let head = self.lease_hw_addr_hash.get(&key).copied();
        let (new_head, reseat) = insert_sorted(head, id, |l| self.lease(l).n_hw, |a, b| {
            preferred(self.lease(a), self.lease(b))
        });
        if let Some((prev, next)) = reseat {
            if let Some(p) = prev {
                self.lease_mut(p).n_hw = Some(id);
            }
            self.lease_mut(id).n_hw = next;
        }
        if new_head != head {
            self.lease_hw_addr_hash.insert(key, id);
        }
    }

    pub(crate) fn chain_remove_lease_hw(&mut self, key: &[u8], id: LeaseId) {
        let Some(&head) = self.lease_hw_addr_hash.get(key) else {
            return;
        };
        if head == id {
            match self.lease(id).n_hw {
                Some(next) => {
                    self.lease_hw_addr_hash.insert(key.to_vec(), next);
                }
                None => {
                    self.lease_hw_addr_hash.remove(key);
                }
            }
            self.lease_mut(id).n_hw = None;
            return;
        }
        let mut prev = head;
        loop {
            match self.lease(prev).n_hw {
                Some(c) if c == id => {
                    let after = self.lease(id).n_hw;
                    self.lease_mut(prev).n_hw = after;
                    self.lease_mut(id).n_hw = None;
                    return;
                }
                Some(c) => prev = c,
                None => return,
            }
        }
    }

    /// link `id` into a host index bucket behind the existing head, or
    /// make it the head if the bucket is empty (§4.2: "append to the
    /// `n_ipaddr` chain behind the existing head").
    pub(crate) fn chain_insert_host(&mut self, which: HostHashKind, key: Vec<u8>, id: HostId) {
        let head = self.host_hash(which).get(&key).copied();
        match head {
            None => {
                self.host_hash_mut(which).insert(key, id);
                self.host_mut(id).n_ipaddr = None;
            }
            Some(head_id) => {
                let head_next = self.host(head_id).n_ipaddr;
                self.host_mut(id).n_ipaddr = head_next;
                self.host_mut(head_id).n_ipaddr = Some(id);
            }
        }
    }

    /// unlink `id` from a host index bucket (§4.2 `delete_host`). Removing
    /// the head of the UID or HW index promotes its successor to head;
    /// removing the head of an option-value bucket does not (`which`
    /// distinguishes the two per §4.2's explicit carve-out).
    pub(crate) fn chain_remove_host(&mut self, which: HostHashKind, key: &[u8], id: HostId) {
        let Some(head) = self.host_hash(which).get(key).copied() else {
            return;
        };
        if head == id {
            let next = self.host(id).n_ipaddr;
            match which {
                HostHashKind::OptionValue(_) => {
                    self.host_hash_mut(which).remove(key);
                }
                HostHashKind::Uid | HostHashKind::Hw => match next {
                    Some(n) => {
                        self.host_hash_mut(which).insert(key.to_vec(), n);
                    }
                    None => {
                        self.host_hash_mut(which).remove(key);
                    }
                },
            }
            self.host_mut(id).n_ipaddr = None;
            return;
        }
        let mut prev = head;
        loop {
            match self.host(prev).n_ipaddr {
                Some(c) if c == id => {
                    let after = self.host(id).n_ipaddr;
                    self.host_mut(prev).n_ipaddr = after;
                    self.host_mut(id).n_ipaddr = None;
                    return;
                }
                Some(c) => prev = c,
                None => return,
            }
        }
    }

    fn host_hash(&self, which: HostHashKind) -> &std::collections::HashMap<Vec<u8>, HostId> {
        match which {
            HostHashKind::Uid => &self.host_uid_hash,
            HostHashKind::Hw => &self.host_hw_addr_hash,
            HostHashKind::OptionValue(entry_idx) => &self.host_id_info.entries[entry_idx].values_hash,
        }
    }

    fn host_hash_mut(&mut self, which: HostHashKind) -> &mut std::collections::HashMap<Vec<u8>, HostId> {
        match which {
            HostHashKind::Uid => &mut self.host_uid_hash,
            HostHashKind::Hw => &mut self.host_hw_addr_hash,
            HostHashKind::OptionValue(entry_idx) => {
                &mut self.host_id_info.entries[entry_idx].values_hash
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostHashKind {
    Uid,
    Hw,
    OptionValue(usize),
}

/// find where `id` belongs in a chain starting at `head`, walking via
/// `next_of` and comparing with `is_preferred(candidate, id)`. Returns the
/// new head (unchanged unless `id` belongs at the front) and, when `id`
/// does not become the head, the `(predecessor, successor)` pair to splice
/// it between.
fn insert_sorted(
    head: Option<LeaseId>,
    id: LeaseId,
    next_of: impl Fn(LeaseId) -> Option<LeaseId>,
    is_preferred: impl Fn(LeaseId, LeaseId) -> bool,
) -> (Option<LeaseId>, Option<(Option<LeaseId>, Option<LeaseId>)>) {
    let mut prev: Option<LeaseId> = None;
    let mut cur = head;
    while let Some(c) = cur {
        if !is_preferred(c, id) {
            break;
        }
        prev = Some(c);
        cur = next_of(c);
    }
    match prev {
        None => (Some(id), Some((None, head))),
        Some(_) => (head, Some((prev, cur))),
    }
}

/// §4.7: among leases sharing a `uid` or hardware-address chain, rank
/// ACTIVE above EXPIRED/RELEASED above other non-ABANDONED states above
/// ABANDONED; within a tier, prefer the longer remaining `ends` for ACTIVE
/// and the larger `cltt` otherwise. Returns `true` if `candidate` outranks
/// `incumbent`.
pub fn preferred(candidate: &crate::lease::Lease, incumbent: &crate::lease::Lease) -> bool {
    fn tier(state: BindingState) -> u8 {
        match state {
            BindingState::Active => 0,
            BindingState::Expired | BindingState::Released => 1,
            BindingState::Abandoned => 3,
            _ => 2,
        }
    }

    let (tc, ti) = (tier(candidate.binding_state), tier(incumbent.binding_state));
    if tc != ti {
        return tc < ti;
    }
    match candidate.binding_state {
        BindingState::Active => candidate.ends > incumbent.ends,
        _ => candidate.cltt > incumbent.cltt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PoolId, SubnetId};
    use crate::lease::Lease;
    use std::net::IpAddr;

    fn lease(state: BindingState, ends: i64, cltt: i64) -> Lease {
        let mut l = Lease::new_free(LeaseId(0), IpAddr::from([10, 0, 0, 1]), PoolId(0), SubnetId(0));
        l.binding_state = state;
        l.ends = ends;
        l.cltt = cltt;
        l
    }

    #[test]
    fn active_beats_expired_regardless_of_times() {
        let active = lease(BindingState::Active, 10, 1000);
        let expired = lease(BindingState::Expired, 9999, 2000);
        assert!(preferred(&active, &expired));
        assert!(!preferred(&expired, &active));
    }

    #[test]
    fn active_tiebreak_is_longer_ends() {
        let a = lease(BindingState::Active, 100, 0);
        let b = lease(BindingState::Active, 200, 0);
        assert!(preferred(&b, &a));
        assert!(!preferred(&a, &b));
    }

    #[test]
    fn abandoned_is_last_resort() {
        let abandoned = lease(BindingState::Abandoned, 0, 9999);
        let free = lease(BindingState::Free, 0, 1);
        assert!(preferred(&free, &abandoned));
    }

    #[test]
    fn non_abandoned_tiebreak_is_larger_cltt() {
        let reset_old = lease(BindingState::Reset, 0, 10);
        let reset_new = lease(BindingState::Reset, 0, 20);
        assert!(preferred(&reset_new, &reset_old));
    }
}
