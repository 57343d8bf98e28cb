//! Hook statements (`on_expiry`, `on_commit`, `on_release`).
//!
//! The original stores parsed config-grammar statements on each lease and
//! runs them through the statement executor when a transition fires. The
//! executor and grammar are out of scope (§1); per the DESIGN NOTES we keep
//! the slot on the lease but treat it as an opaque action handle invoked
//! with a small context record, same shape as a config callback.
use std::fmt;
use std::sync::Arc;

use crate::lease::Lease;

/// Context passed to a hook when it fires.
#[derive(Debug)]
pub struct HookContext<'a> {
    pub lease: &'a Lease,
    pub event: HookEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Expiry,
    Commit,
    Release,
}

/// An opaque, lease-owned action. Cloning a `Hook` clones the `Arc`, not
/// the closure, matching the original's reference-counted statement
/// pointers (`executable_statement_reference`/`_dereference`).
#[derive(Clone)]
pub struct Hook(Arc<dyn Fn(&HookContext<'_>) + Send + Sync>);

impl Hook {
    pub fn new(f: impl Fn(&HookContext<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn fire(&self, ctx: &HookContext<'_>) {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").finish_non_exhaustive()
    }
}
