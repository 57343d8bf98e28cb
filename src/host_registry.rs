//! Host reservation registration and lookup (§4.2).
use std::net::Ipv4Addr;

use crate::db::Database;
use crate::error::DbError;
use crate::flags::HostFlags;
use crate::host::{Host, RelayPacket, MAX_V6RELAY_HOPS};
use crate::ids::{HostId, SharedNetworkId, SubnetId};
use crate::index::HostHashKind;
use crate::persistence::Journal;

impl<J: Journal> Database<J> {
    /// register `host` in the name index, then conditionally in the HW,
    /// UID, and option-value indexes (§4.2).
    ///
    /// A name collision with a live, distinct entry fails with
    /// [`DbError::Exists`] — the higher layer may rename and retry. A name
    /// collision with an entry flagged `DECL_DELETED` is a supersede: the
    /// incoming host reuses that entry's id, inherits its `DECL_STATIC`
    /// flag, and clears `DECL_DELETED`. Re-registering the exact same
    /// live `HostId` in place (the original's "rewrite-in-place" branch) is
    /// [`Self::refresh_host`], not this path — a fresh [`Host`] value has
    /// no identity to match against an arena entry.
    pub async fn enter_host(
        &mut self,
        mut host: Host,
        dynamic: bool,
        commit: bool,
    ) -> Result<HostId, DbError<J::Error>> {
        let id = match self.host_name_hash.get(&host.name).copied() {
            Some(old_id) if self.host(old_id).flags.contains(HostFlags::DECL_DELETED) => {
                if self.host(old_id).flags.contains(HostFlags::DECL_STATIC) {
                    host.flags.insert(HostFlags::DECL_STATIC);
                }
                host.flags.remove(HostFlags::DECL_DELETED);
                host.id = old_id;
                *self.host_mut(old_id) = host;
                old_id
            }
            Some(_) => return Err(DbError::Exists),
            None => {
                let id = HostId(self.hosts.len() as u32);
                host.id = id;
                self.hosts.push(host);
                id
            }
        };

        self.index_host(id);
        self.host_name_hash.insert(self.host(id).name.clone(), id);

        if dynamic && commit {
            let host_ref = self.host(id);
            self.journal.write_host(host_ref).await?;
            self.journal.commit_leases().await?;
        }
        Ok(id)
    }

    /// rewrite a live host's declaration in place: re-journal under its
    /// existing id, clearing `DECL_DELETED` if set (§4.2's "rewrite in
    /// place" branch). Whether the journal should also see a delete record
    /// first is undocumented upstream; this crate writes only the refresh.
    pub async fn refresh_host(&mut self, id: HostId, commit: bool) -> Result<(), DbError<J::Error>> {
        self.host_mut(id).flags.remove(HostFlags::DECL_DELETED);
        if commit {
            let host_ref = self.host(id);
            self.journal.write_host(host_ref).await?;
            self.journal.commit_leases().await?;
        }
        Ok(())
    }

    /// index `id` into HW/UID/option-value buckets per its declared
    /// identifiers (§4.2). Called after allocating or superseding a host
    /// entry in [`Self::enter_host`].
    fn index_host(&mut self, id: HostId) {
        let hw_key = self
            .host(id)
            .interface
            .as_ref()
            .filter(|hw| !hw.is_infiniband())
            .map(|hw| hw.hash_key());
        if let Some(key) = hw_key {
            self.chain_insert_host(HostHashKind::Hw, key, id);
        }

        let uid_key = self.host(id).client_identifier.clone();
        if let Some(key) = uid_key {
            if !key.is_empty() {
                self.chain_insert_host(HostHashKind::Uid, key, id);
            }
        }

        let option_entry = self
            .host(id)
            .host_id_option
            .map(|opt| (opt, self.host(id).host_id.clone()));
        if let Some((opt, Some(value))) = option_entry {
            let entry_idx = self.host_id_info.find_or_insert(opt.code, opt.relays);
            self.chain_insert_host(HostHashKind::OptionValue(entry_idx), value, id);
        }
    }

    /// logically delete `host`, idempotent on `DECL_DELETED` (§4.2). Prunes
    /// every index the host occupies, then (unless it is `DECL_STATIC`)
    /// removes it from the name index too.
    pub async fn delete_host(&mut self, id: HostId, commit: bool) -> Result<(), DbError<J::Error>> {
        if self.host(id).flags.contains(HostFlags::DECL_DELETED) {
            return Ok(());
        }

        if let Some(key) = self
            .host(id)
            .interface
            .as_ref()
            .filter(|hw| !hw.is_infiniband())
            .map(|hw| hw.hash_key())
        {
            self.chain_remove_host(HostHashKind::Hw, &key, id);
        }
        if let Some(key) = self.host(id).client_identifier.clone() {
            if !key.is_empty() {
                self.chain_remove_host(HostHashKind::Uid, &key, id);
            }
        }
        if let Some(opt) = self.host(id).host_id_option {
            if let Some(value) = self.host(id).host_id.clone() {
                if let Some(entry_idx) = self.host_id_info.find(opt.code, opt.relays) {
                    self.chain_remove_host(HostHashKind::OptionValue(entry_idx), &value, id);
                }
            }
        }

        self.host_mut(id).flags.insert(HostFlags::DECL_DELETED);
        if !self.host(id).flags.contains(HostFlags::DECL_STATIC) {
            if self.host_name_hash.get(&self.host(id).name) == Some(&id) {
                let name = self.host(id).name.clone();
                self.host_name_hash.remove(&name);
            }
        }

        if commit {
            let host_ref = self.host(id);
            self.journal.write_host(host_ref).await?;
            self.journal.commit_leases().await?;
        }
        Ok(())
    }

    /// atomically replace `id`'s UID: remove the old entry (if any) from
    /// the UID index, install `uid`, and re-add it (§4.2).
    pub fn change_host_uid(&mut self, id: HostId, uid: Vec<u8>) {
        if let Some(old) = self.host(id).client_identifier.clone() {
            if !old.is_empty() {
                self.chain_remove_host(HostHashKind::Uid, &old, id);
            }
        }
        self.host_mut(id).client_identifier = Some(uid.clone());
        if !uid.is_empty() {
            self.chain_insert_host(HostHashKind::Uid, uid, id);
        }
    }

    /// `find_hosts_by_haddr`: prepends the hardware-type byte before
    /// hashing (§4.2).
    pub fn find_hosts_by_haddr(&self, htype: u8, haddr: &[u8]) -> Option<HostId> {
        let mut key = Vec::with_capacity(haddr.len() + 1);
        key.push(htype);
        key.extend_from_slice(haddr);
        self.host_hw_addr_hash.get(&key).copied()
    }

    /// `find_hosts_by_uid`: direct lookup (§4.2).
    pub fn find_hosts_by_uid(&self, uid: &[u8]) -> Option<HostId> {
        if uid.is_empty() {
            return None;
        }
        self.host_uid_hash.get(uid).copied()
    }

    /// `find_hosts_by_option` (§4.2, §8 S5): for each host-identifier
    /// registry entry, descend `entry.relays` hops into `packet` (bounded
    /// by [`MAX_V6RELAY_HOPS`]); entries whose descent can't reach the
    /// requested depth are skipped. The first entry whose evaluated option
    /// value is present in its values hash wins; entries are tried in
    /// insertion order.
    pub fn find_hosts_by_option(&self, packet: &dyn RelayPacket) -> Option<HostId> {
        for entry in &self.host_id_info.entries {
            let hops = entry.relays.min(MAX_V6RELAY_HOPS);
            let mut frame = packet;
            let mut reached = true;
            for _ in 0..hops {
                match frame.inner() {
                    Some(next) => frame = next,
                    None => {
                        reached = false;
                        break;
                    }
                }
            }
            if !reached {
                continue;
            }
            let Some(value) = frame.option_value(entry.option_code) else {
                continue;
            };
            if let Some(&id) = entry.values_hash.get(&value) {
                return Some(id);
            }
        }
        None
    }

    /// `find_host_for_network`: walk `host_chain`'s `n_ipaddr` siblings;
    /// for the first host with a `fixed_addr` whose evaluated address lies
    /// in a subnet belonging to `share`, return that subnet and address
    /// (§4.2).
    pub fn find_host_for_network(
        &self,
        host_chain: HostId,
        share: SharedNetworkId,
    ) -> Option<(HostId, SubnetId, Ipv4Addr)> {
        let mut cur = Some(host_chain);
        while let Some(id) = cur {
            for addr in self.host(id).fixed_addrs() {
                if let Some(subnet) = self
                    .subnets
                    .iter()
                    .find(|s| s.shared_network == Some(share) && s.contains(addr))
                {
                    return Some((id, subnet.id(), addr));
                }
            }
            cur = self.host(id).n_ipaddr;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::host::{Host, HostIdOption};
    use crate::lease::Lease;
    use crate::scope::Scope;
    use async_trait::async_trait;

    struct NoopJournal;

    #[derive(Debug, thiserror::Error)]
    #[error("noop journal error")]
    struct NoopError;

    #[async_trait]
    impl Journal for NoopJournal {
        type Error = NoopError;
        async fn write_host(&self, _host: &Host) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_lease(&self, _lease: &Lease) -> Result<(), Self::Error> {
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
    async fn duplicate_live_name_fails_with_exists() {
        let mut db = Database::new(NoopJournal);
        let a = Host::new(HostId(0), "client-a");
        db.enter_host(a, false, false).await.unwrap();

        let b = Host::new(HostId(0), "client-a");
        let err = db.enter_host(b, false, false).await.unwrap_err();
        assert!(matches!(err, DbError::Exists));
    }

    #[tokio::test]
    async fn delete_host_is_idempotent() {
        let mut db = Database::new(NoopJournal);
        let h = Host::new(HostId(0), "client-a");
        let id = db.enter_host(h, false, false).await.unwrap();
        db.delete_host(id, false).await.unwrap();
        assert!(db.host(id).flags.contains(HostFlags::DECL_DELETED));
        db.delete_host(id, false).await.unwrap();
        assert!(db.host(id).flags.contains(HostFlags::DECL_DELETED));
    }

    #[tokio::test]
    async fn change_host_uid_round_trips() {
        let mut db = Database::new(NoopJournal);
        let h = Host::new(HostId(0), "client-a");
        let id = db.enter_host(h, false, false).await.unwrap();
        db.change_host_uid(id, vec![1, 2, 3]);
        assert_eq!(db.find_hosts_by_uid(&[1, 2, 3]), Some(id));
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
        let mut db = Database::new(NoopJournal);
        let mut h = Host::new(HostId(0), "relay-client");
        h.host_id_option = Some(HostIdOption { code: 37, relays: 2 });
        h.host_id = Some(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let id = db.enter_host(h, false, false).await.unwrap();

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
}
