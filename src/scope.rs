//! Binding scope / statement group environments.
//!
//! The original's `binding_scope` and `group` structures hold parsed
//! config-grammar statement lists and named binding variables. The grammar
//! and statement executor are out of scope (§1); what the database layer
//! actually needs from them is an opaque, cloneable bag of named values
//! that travels with a lease or host and is copied whole during
//! `supersede_lease`'s field copy (§4.5 step 4).
use std::collections::HashMap;

pub type Scope = HashMap<String, String>;
