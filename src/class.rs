//! Class/subclass registry data (§3 "Class / subclass", §4.8).
use std::collections::HashMap;

use crate::flags::ClassFlags;
use crate::ids::ClassId;

#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) id: ClassId,
    /// `None` for an anonymous subclass (a subclass with no parent is
    /// invalid at the top level — §4.8 `enter_class`).
    pub name: Option<String>,
    pub superclass: Option<ClassId>,
    pub flags: ClassFlags,
    /// subclasses keyed by `hash_string` (§3): matching data for a named
    /// class's per-class subclass table.
    pub(crate) subclasses: HashMap<Vec<u8>, ClassId>,
    /// number of leases currently billed to this class (§4.5 step 3). The
    /// original's limit-enforcement counters live in the classification
    /// engine (out of scope, §1); this is just the count `supersede_lease`
    /// bumps and drops.
    pub leases_billed: usize,
}

impl Class {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub(crate) fn new(id: ClassId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            superclass: None,
            flags: ClassFlags::empty(),
            subclasses: HashMap::new(),
            leases_billed: 0,
        }
    }
}

/// top-level `collections->classes` list (§4.8).
#[derive(Debug, Default)]
pub(crate) struct Collections {
    pub(crate) classes: Vec<ClassId>,
}
