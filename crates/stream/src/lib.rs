//! Streaming: object lifecycle, world index, background loads and the
//! per-frame activation pass.
//!
//! # Invariants
//! - Frame subscribers are always a subset of the activated set; no object
//!   appears twice in any set.
//! - Phases run A (deactivate) → B (evict) → C (load/activate) within a pass.
//! - Hooks may re-enter the streamer; scans run over snapshots and re-check
//!   every object after a callout.
//! - The frame pass never waits on background work.

mod class;
mod config;
mod error;
mod grid;
mod index;
mod lifecycle;
mod loader;
mod object;
mod pass;
mod registry;
mod stats;
mod streamer;

#[cfg(test)]
mod testing;

pub use class::{
    Behaviour, ClassRef, GfxHandle, GraphicsContext, HookError, Inert, ObjectClass,
    PhysicsContext, PhysicsHandle,
};
pub use config::StreamerConfig;
pub use error::StreamError;
pub use grid::{CellCoord, GridIndex};
pub use index::WorldIndex;
pub use loader::{BackgroundLoader, LoadRequest, LoaderOptions, PrepareFn, ThreadPoolLoader};
pub use object::{LoadState, ObjectDesc, ObjectRef, WorldObject, DEFAULT_RENDERING_DISTANCE};
pub use registry::Registry;
pub use stats::{PassHistory, PassStats};
pub use streamer::Streamer;

pub fn crate_info() -> &'static str {
    "worldstream-stream v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("stream"));
    }
}
