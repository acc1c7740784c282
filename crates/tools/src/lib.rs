//! Developer tooling: streamer inspector and per-object summaries.
//!
//! # Invariants
//! - Inspection is read-only; nothing here changes streamer state.

mod inspector;

pub use inspector::{ObjectInfo, ObjectState, StreamerInspector, StreamerSummary};

pub fn crate_info() -> &'static str {
    "worldstream-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
