use std::time::Duration;

use worldstream_common::ObjectId;
use worldstream_stream::{LoadState, ObjectRef, PassStats, Streamer};

/// Streamer inspector for developer tooling.
///
/// Provides read-only queries against the streamer for debugging, profiling
/// and the CLI.
pub struct StreamerInspector;

impl StreamerInspector {
    /// Produce a summary of the streamer state.
    pub fn summary(streamer: &Streamer) -> StreamerSummary {
        let c = streamer.centre_point();
        StreamerSummary {
            objects: streamer.registry().object_count(),
            classes: streamer.registry().class_count(),
            indexed: streamer.index().len(),
            candidates: streamer.candidates().len(),
            loaded: streamer.loaded().len(),
            activated: streamer.activated().len(),
            subscribers: streamer.frame_subscribers().len(),
            centre: [c.x, c.y, c.z],
            last_pass: *streamer.last_pass(),
            average_pass: streamer.history().average_time(),
            max_pass: streamer.history().max_time(),
            total_passes: streamer.history().total_passes(),
        }
    }

    /// Look up one object by name.
    pub fn object_info(streamer: &Streamer, name: &str) -> Option<ObjectInfo> {
        streamer
            .get_object(name)
            .ok()
            .map(|o| Self::describe(streamer, &o))
    }

    /// Every registered object, in name order.
    pub fn list_objects(streamer: &Streamer) -> Vec<ObjectInfo> {
        streamer
            .registry()
            .objects()
            .map(|o| Self::describe(streamer, o))
            .collect()
    }

    pub fn describe(streamer: &Streamer, obj: &ObjectRef) -> ObjectInfo {
        let p = obj.position();
        ObjectInfo {
            id: obj.id(),
            name: obj.name().to_owned(),
            class: obj.class_name(),
            position: [p.x, p.y, p.z],
            state: ObjectState::of(obj),
            range2: obj.range2(),
            fade: obj.fade(),
            near: obj.near().map(|n| n.name().to_owned()),
            far: obj.far().map(|f| f.name().to_owned()),
            subscribed: streamer
                .frame_subscribers()
                .iter()
                .any(|s| std::rc::Rc::ptr_eq(s, obj)),
        }
    }
}

/// Summary of streamer state for the inspector.
#[derive(Debug, Clone)]
pub struct StreamerSummary {
    pub objects: usize,
    pub classes: usize,
    pub indexed: usize,
    pub candidates: usize,
    pub loaded: usize,
    pub activated: usize,
    pub subscribers: usize,
    pub centre: [f32; 3],
    pub last_pass: PassStats,
    pub average_pass: Duration,
    pub max_pass: Duration,
    pub total_passes: u64,
}

impl std::fmt::Display for StreamerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Streamer: objects={} classes={} indexed={} centre=({:.1}, {:.1}, {:.1})",
            self.objects, self.classes, self.indexed, self.centre[0], self.centre[1], self.centre[2]
        )?;
        writeln!(
            f,
            "  sets: candidates={} loaded={} activated={} subscribers={}",
            self.candidates, self.loaded, self.activated, self.subscribers
        )?;
        let p = &self.last_pass;
        writeln!(
            f,
            "  last pass: candidates={} loads={} activated={} deactivated={} destroyed={} evicted={} occluded={} deferred={}",
            p.candidates,
            p.loads_issued,
            p.activated,
            p.deactivated,
            p.destroyed,
            p.evicted,
            p.occluded,
            p.deferred
        )?;
        write!(
            f,
            "  passes={} avg={:?} max={:?}",
            self.total_passes, self.average_pass, self.max_pass
        )
    }
}

/// Coarse lifecycle position of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Known, nothing loaded.
    Dormant,
    Loading,
    /// Resources ready, not activated.
    Prepared,
    Activated,
    Destroyed,
}

impl ObjectState {
    pub fn of(obj: &ObjectRef) -> Self {
        if !obj.is_live() {
            return Self::Destroyed;
        }
        if obj.is_activated() {
            return Self::Activated;
        }
        match obj.load_state() {
            LoadState::Idle => Self::Dormant,
            LoadState::Pending => Self::Loading,
            LoadState::Ready => Self::Prepared,
        }
    }
}

impl std::fmt::Display for ObjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dormant => "dormant",
            Self::Loading => "loading",
            Self::Prepared => "prepared",
            Self::Activated => "activated",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Detailed info about a single object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
    pub class: Option<String>,
    pub position: [f32; 3],
    pub state: ObjectState,
    pub range2: f32,
    pub fade: f32,
    pub near: Option<String>,
    pub far: Option<String>,
    pub subscribed: bool,
}

impl std::fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Object {} [{}] class={} pos=({:.2}, {:.2}, {:.2}) state={} range2={:.3} fade={:.2}",
            self.name,
            self.id,
            self.class.as_deref().unwrap_or("-"),
            self.position[0],
            self.position[1],
            self.position[2],
            self.state,
            self.range2,
            self.fade,
        )?;
        if let Some(near) = &self.near {
            write!(f, " near={near}")?;
        }
        if let Some(far) = &self.far {
            write!(f, " far={far}")?;
        }
        if self.subscribed {
            f.write_str(" ticking")?;
        }
        Ok(())
    }
}
