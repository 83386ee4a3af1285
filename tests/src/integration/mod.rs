//! Cross-crate flows: wallet model, backend client, relay service and engine.

pub mod full_stack;
pub mod ordering;
