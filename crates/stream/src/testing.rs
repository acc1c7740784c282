//! Shared fixtures for the streamer tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Vec3;
use worldstream_common::PropertyBag;

use crate::class::{Behaviour, GfxHandle, GraphicsContext, HookError, PhysicsContext, PhysicsHandle};
use crate::config::StreamerConfig;
use crate::grid::GridIndex;
use crate::index::WorldIndex;
use crate::loader::BackgroundLoader;
use crate::object::ObjectRef;
use crate::streamer::Streamer;

pub(crate) struct DummyGfx(pub &'static str);

impl GraphicsContext for DummyGfx {
    fn label(&self) -> &str {
        self.0
    }
}

pub(crate) struct DummyPhysics;

impl PhysicsContext for DummyPhysics {
    fn label(&self) -> &str {
        "dummy-physics"
    }
}

pub(crate) fn gfx(label: &'static str) -> GfxHandle {
    Rc::new(DummyGfx(label))
}

pub(crate) fn physics() -> PhysicsHandle {
    Rc::new(DummyPhysics)
}

/// Index that never finds anything, so only the candidate set feeds a pass.
pub(crate) struct BlindIndex;

impl WorldIndex for BlindIndex {
    fn insert(&mut self, _obj: &ObjectRef) {}
    fn remove(&mut self, _obj: &ObjectRef) {}
    fn relocate(&mut self, _obj: &ObjectRef, _old_position: Vec3) {}
    fn objects_near(&self, _point: Vec3, _step: f32, _factor: f32) -> Vec<ObjectRef> {
        Vec::new()
    }
    fn len(&self) -> usize {
        0
    }
}

#[derive(Debug, Default)]
pub(crate) struct LoaderState {
    /// Every load completes as soon as it is issued.
    pub instant: bool,
    /// `enqueue` reports nothing to prepare.
    pub reject: bool,
    /// Names whose loads have completed.
    pub complete: HashSet<String>,
    pub enqueued: Vec<String>,
    pub released: Vec<String>,
    pub process_calls: usize,
    pub pressure_calls: usize,
}

/// Loader whose completions are decided by the test.
pub(crate) struct ScriptedLoader(Rc<RefCell<LoaderState>>);

impl ScriptedLoader {
    pub fn new(instant: bool) -> (Self, Rc<RefCell<LoaderState>>) {
        let state = Rc::new(RefCell::new(LoaderState {
            instant,
            ..LoaderState::default()
        }));
        (Self(Rc::clone(&state)), state)
    }
}

impl BackgroundLoader for ScriptedLoader {
    fn enqueue(&mut self, obj: &ObjectRef) -> bool {
        let mut state = self.0.borrow_mut();
        state.enqueued.push(obj.name().to_owned());
        if state.reject {
            return false;
        }
        if state.instant {
            state.complete.insert(obj.name().to_owned());
        }
        true
    }

    fn is_complete(&mut self, obj: &ObjectRef) -> bool {
        self.0.borrow().complete.contains(obj.name())
    }

    fn release(&mut self, obj: &ObjectRef) {
        let mut state = self.0.borrow_mut();
        state.released.push(obj.name().to_owned());
        if !state.instant {
            state.complete.remove(obj.name());
        }
    }

    fn process_pending(&mut self) {
        self.0.borrow_mut().process_calls += 1;
    }

    fn check_resource_pressure(&mut self) {
        self.0.borrow_mut().pressure_calls += 1;
    }
}

pub(crate) type Log = Rc<RefCell<Vec<String>>>;
type Callback = Rc<dyn Fn(&mut Streamer, &ObjectRef)>;

/// Behaviour that logs `"<hook> <object>"` for every call and can be told to
/// ask for destruction, fail, or re-enter the streamer.
#[derive(Default)]
pub(crate) struct Recording {
    log: Log,
    killme: bool,
    keep_frames: bool,
    failing: HashSet<&'static str>,
    callbacks: HashMap<&'static str, Callback>,
}

impl Recording {
    pub fn new(log: &Log) -> Self {
        Self {
            log: Rc::clone(log),
            ..Self::default()
        }
    }

    pub fn killme(mut self) -> Self {
        self.killme = true;
        self
    }

    pub fn keep_frames(mut self) -> Self {
        self.keep_frames = true;
        self
    }

    pub fn failing(mut self, hook: &'static str) -> Self {
        self.failing.insert(hook);
        self
    }

    pub fn on(mut self, hook: &'static str, f: impl Fn(&mut Streamer, &ObjectRef) + 'static) -> Self {
        self.callbacks.insert(hook, Rc::new(f));
        self
    }

    fn run(&self, hook: &'static str, streamer: &mut Streamer, obj: &ObjectRef) -> Result<(), HookError> {
        self.log.borrow_mut().push(format!("{hook} {}", obj.name()));
        if let Some(f) = self.callbacks.get(hook) {
            f(streamer, obj);
        }
        if self.failing.contains(hook) {
            return Err(HookError::new(format!("{hook} failed for {}", obj.name())));
        }
        Ok(())
    }
}

impl Behaviour for Recording {
    fn activate(
        &self,
        streamer: &mut Streamer,
        obj: &ObjectRef,
        _gfx: &GfxHandle,
        _physics: &PhysicsHandle,
    ) -> Result<(), HookError> {
        self.run("activate", streamer, obj)
    }

    fn deactivate(&self, streamer: &mut Streamer, obj: &ObjectRef) -> Result<bool, HookError> {
        self.run("deactivate", streamer, obj)?;
        Ok(self.killme)
    }

    fn frame(&self, streamer: &mut Streamer, obj: &ObjectRef, _elapsed: f32) -> Result<bool, HookError> {
        self.run("frame", streamer, obj)?;
        Ok(self.keep_frames)
    }

    fn range_changed(
        &self,
        streamer: &mut Streamer,
        obj: &ObjectRef,
        _range2: f32,
        _fade: f32,
    ) -> Result<(), HookError> {
        self.run("range", streamer, obj)
    }

    fn destroy(&self, streamer: &mut Streamer, obj: &ObjectRef) -> Result<(), HookError> {
        self.run("destroy", streamer, obj)
    }
}

pub(crate) fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub(crate) fn count(log: &Log, entry: &str) -> usize {
    log.borrow().iter().filter(|e| *e == entry).count()
}

/// Streamer with both contexts set.
pub(crate) fn configured(
    config: StreamerConfig,
    index: Box<dyn WorldIndex>,
    loader: Box<dyn BackgroundLoader>,
) -> Streamer {
    let mut s = Streamer::new(config, index, loader).unwrap();
    s.set_gfx(gfx("main"));
    s.set_physics(physics());
    s
}

/// Grid-indexed streamer with default config and an instant loader.
pub(crate) fn instant_streamer() -> (Streamer, Rc<RefCell<LoaderState>>) {
    let (loader, state) = ScriptedLoader::new(true);
    let s = configured(
        StreamerConfig::default(),
        Box::new(GridIndex::new(16.0)),
        Box::new(loader),
    );
    (s, state)
}

pub(crate) fn rock_props(rendering_distance: f64) -> PropertyBag {
    PropertyBag::new()
        .with("renderingDistance", rendering_distance)
        .with("resources", vec!["rock.mesh"])
}

/// Assert the set invariants that must hold between passes.
pub(crate) fn assert_set_invariants(s: &Streamer) {
    for (label, set) in [
        ("candidates", s.candidates()),
        ("loaded", s.loaded()),
        ("activated", s.activated()),
        ("subscribers", s.frame_subscribers()),
    ] {
        let mut seen = HashSet::new();
        for o in set {
            assert!(seen.insert(Rc::as_ptr(o)), "{} twice in {label}", o.name());
        }
    }
    for o in s.frame_subscribers() {
        assert!(
            s.activated().iter().any(|a| Rc::ptr_eq(a, o)),
            "subscriber {} is not activated",
            o.name()
        );
    }
    for o in s.activated() {
        assert!(o.is_live() && o.is_activated(), "stale activated entry {}", o.name());
    }
    for o in s.loaded() {
        assert!(o.is_live(), "stale loaded entry {}", o.name());
    }
}
