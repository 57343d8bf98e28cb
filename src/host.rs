//! The `Host` type and host-identifier registry (§3 Data Model, "Host",
//! "Host-identifier registry").
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::flags::HostFlags;
use crate::ids::HostId;
use crate::lease::HwAddr;
use crate::scope::Scope;

/// DHCPv6 relay nesting bound observed while descending
/// `dhcpv6_container_packet` links in `find_hosts_by_option` (§4.2).
pub const MAX_V6RELAY_HOPS: u8 = 32;

/// The slice of a received packet's relay-encapsulation structure that
/// `find_hosts_by_option` needs (§4.2, §8 S5). The packet parser and
/// option-evaluation engine are out of scope (§1); implementors hand in
/// whatever wraps their real packet type.
pub trait RelayPacket {
    /// the next (more deeply nested) relay frame, if any.
    fn inner(&self) -> Option<&dyn RelayPacket>;
    /// evaluate the host-identifier option cache for `code` against this
    /// frame's option state, yielding the byte string used to key the
    /// values hash.
    fn option_value(&self, code: u16) -> Option<Vec<u8>>;
}

/// `(option code, relay depth)` identifying a host-identifier option, per
/// §3 "option code + relay depth".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostIdOption {
    pub code: u16,
    pub relays: u8,
}

/// An evaluatable expression producing a host's option-derived identifier
/// or fixed address byte string. Expression evaluation is out of scope
/// (§1, "the option evaluation engine"); this is the opaque callback slot
/// the database invokes, mirroring the original's `option_cache`.
pub type OptionCache = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

#[derive(Clone)]
pub struct Host {
    pub(crate) id: HostId,
    pub name: String,
    pub interface: Option<HwAddr>,
    pub client_identifier: Option<Vec<u8>>,
    pub host_id_option: Option<HostIdOption>,
    pub host_id: Option<Vec<u8>>,
    /// evaluates to one or more candidate IPv4 addresses (§4.2
    /// `find_host_for_network`); `None` means this host has no fixed
    /// address declaration.
    pub fixed_addr: Option<OptionCache>,
    pub group: Option<Scope>,
    pub flags: HostFlags,

    /// sibling within whichever index chain (HW, UID, or option-value)
    /// this host currently collides in. A single field mirrors the
    /// original's single `n_ipaddr` pointer (§3): a host only ever occupies
    /// one collision chain position at a time across the non-name indexes.
    pub(crate) n_ipaddr: Option<HostId>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interface", &self.interface)
            .field("client_identifier", &self.client_identifier)
            .field("host_id_option", &self.host_id_option)
            .field("host_id", &self.host_id)
            .field("flags", &self.flags)
            .field("n_ipaddr", &self.n_ipaddr)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn id(&self) -> HostId {
        self.id
    }

    /// build a fresh, unregistered host. `id` is a placeholder overwritten
    /// by [`crate::db::Database::enter_host`] on registration — pass
    /// `HostId::default()`.
    pub fn new(id: HostId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            interface: None,
            client_identifier: None,
            host_id_option: None,
            host_id: None,
            fixed_addr: None,
            group: None,
            flags: HostFlags::empty(),
            n_ipaddr: None,
        }
    }

    /// resolve `fixed_addr` into 4-byte IPv4 chunks, as `find_host_for_network`
    /// does with the byte string produced by evaluating the option cache.
    pub fn fixed_addrs(&self) -> Vec<Ipv4Addr> {
        let Some(eval) = &self.fixed_addr else {
            return Vec::new();
        };
        let bytes = eval();
        bytes
            .chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect()
    }
}

/// One entry in the host-identifier registry (§3): all hosts that use the
/// same `(option, relay_depth)` pair as their host-identifier share one
/// values hash, keyed by the evaluated option byte string.
#[derive(Debug, Default)]
pub(crate) struct HostIdEntry {
    pub option_code: u16,
    pub relays: u8,
    pub values_hash: HashMap<Vec<u8>, HostId>,
}

/// singly linked list of `(option, relay_depth, values_hash)` triples
/// (§3). Modeled as a `Vec` to preserve insertion order (§4.2
/// `find_hosts_by_option`: "Ordering of entries in the registry is
/// insertion order") without the awkwardness of an intrusive list.
#[derive(Debug, Default)]
pub(crate) struct HostIdRegistry {
    pub(crate) entries: Vec<HostIdEntry>,
}

impl HostIdRegistry {
    pub(crate) fn find(&self, option_code: u16, relays: u8) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.option_code == option_code && e.relays == relays)
    }

    pub(crate) fn find_or_insert(&mut self, option_code: u16, relays: u8) -> usize {
        match self.find(option_code, relays) {
            Some(idx) => idx,
            None => {
                self.entries.push(HostIdEntry {
                    option_code,
                    relays,
                    values_hash: HashMap::new(),
                });
                self.entries.len() - 1
            }
        }
    }
}
