use std::rc::Rc;

use glam::Vec3;
use worldstream_common::{PropertyBag, SplineTable};

use crate::class::{Behaviour, ClassRef, GfxHandle, ObjectClass, PhysicsHandle};
use crate::config::StreamerConfig;
use crate::error::StreamError;
use crate::index::WorldIndex;
use crate::loader::BackgroundLoader;
use crate::object::{contains, remove_if_exists, ObjectDesc, ObjectRef, WorldObject};
use crate::registry::Registry;
use crate::stats::{PassHistory, PassStats};

/// Owns the registry and the scheduler sets, and runs the per-frame pass.
///
/// All state lives on the frame thread. Behaviour hooks receive `&mut
/// Streamer` and may re-enter any method here; every scan that calls a hook
/// works on a snapshot and re-checks the object afterwards.
pub struct Streamer {
    pub(crate) config: StreamerConfig,
    pub(crate) fade_table: SplineTable<f32>,
    pub(crate) registry: Registry,
    pub(crate) index: Box<dyn WorldIndex>,
    pub(crate) loader: Box<dyn BackgroundLoader>,
    pub(crate) gfx: Option<GfxHandle>,
    pub(crate) physics: Option<PhysicsHandle>,
    pub(crate) centre: Vec3,
    /// Objects to consider on the next pass regardless of the index.
    pub(crate) fresh: Vec<ObjectRef>,
    /// Objects with a pending or completed background load.
    pub(crate) loaded: Vec<ObjectRef>,
    pub(crate) activated: Vec<ObjectRef>,
    pub(crate) frame_subscribers: Vec<ObjectRef>,
    pub(crate) last_pass: PassStats,
    pub(crate) history: PassHistory,
    shutdown: bool,
}

impl Streamer {
    pub fn new(
        config: StreamerConfig,
        index: Box<dyn WorldIndex>,
        loader: Box<dyn BackgroundLoader>,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            fade_table: config.fade_table(),
            config,
            registry: Registry::new(),
            index,
            loader,
            gfx: None,
            physics: None,
            centre: Vec3::ZERO,
            fresh: Vec::new(),
            loaded: Vec::new(),
            activated: Vec::new(),
            frame_subscribers: Vec::new(),
            last_pass: PassStats::default(),
            history: PassHistory::default(),
            shutdown: false,
        })
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect from the next pass.
    pub fn set_config(&mut self, config: StreamerConfig) -> Result<(), StreamError> {
        config.validate()?;
        self.fade_table = config.fade_table();
        self.config = config;
        Ok(())
    }

    pub fn gfx(&self) -> Option<&GfxHandle> {
        self.gfx.as_ref()
    }

    pub fn physics(&self) -> Option<&PhysicsHandle> {
        self.physics.as_ref()
    }

    /// Install a graphics context. Everything activated against the old one
    /// is deactivated and reconsidered on the next pass.
    pub fn set_gfx(&mut self, gfx: GfxHandle) {
        self.deactivate_all("gfx");
        self.gfx = Some(gfx);
    }

    /// Install a physics context, with the same effect as [`Streamer::set_gfx`].
    pub fn set_physics(&mut self, physics: PhysicsHandle) {
        self.deactivate_all("physics");
        self.physics = Some(physics);
    }

    fn deactivate_all(&mut self, reason: &'static str) {
        let victims = self.activated.clone();
        if !victims.is_empty() {
            tracing::debug!(count = victims.len(), reason, "context changed, deactivating");
        }
        for o in &victims {
            // killme is not honoured here: the object did not leave view
            self.deactivate_object(o);
            if o.is_live() && !contains(&self.fresh, o) {
                self.fresh.push(Rc::clone(o));
            }
        }
    }

    // ---- classes --------------------------------------------------------

    /// Create class `name`, or merge `properties` into the existing class of
    /// that name, re-parent it and swap in `behaviour`.
    ///
    /// Objects already created from the class keep the properties they were
    /// created with.
    pub fn add_class(
        &mut self,
        name: &str,
        parent: Option<&ClassRef>,
        properties: PropertyBag,
        behaviour: Rc<dyn Behaviour>,
    ) -> Result<ClassRef, StreamError> {
        match self.registry.class(name) {
            Ok(existing) => {
                if parent.is_some_and(|p| p.inherits_from(&existing)) {
                    return Err(StreamError::ClassCycle(name.to_owned()));
                }
                existing.merge(parent.cloned(), &properties, behaviour);
                tracing::debug!(class = name, "class merged");
                Ok(existing)
            }
            Err(_) => {
                let class = Rc::new(ObjectClass::new(
                    name.to_owned(),
                    parent.cloned(),
                    properties,
                    behaviour,
                ));
                self.registry.insert_class(Rc::clone(&class));
                tracing::debug!(class = name, "class added");
                Ok(class)
            }
        }
    }

    pub fn get_class(&self, name: &str) -> Result<ClassRef, StreamError> {
        self.registry.class(name)
    }

    /// Hide `name` from lookup. Live objects keep using the class.
    pub fn erase_class(&mut self, name: &str) -> Result<(), StreamError> {
        self.registry
            .remove_class(name)
            .map(|_| ())
            .ok_or_else(|| StreamError::ClassNotFound(name.to_owned()))
    }

    pub fn clear_classes(&mut self) {
        for name in self.registry.class_names() {
            self.registry.remove_class(&name);
        }
    }

    // ---- objects --------------------------------------------------------

    /// Create an object of `class`. Both contexts must be configured.
    ///
    /// An empty name gets a generated `Unnamed:<n>`. An existing object with
    /// the same name is deleted first, hooks and all.
    pub fn add_object(&mut self, class: &ClassRef, desc: ObjectDesc) -> Result<ObjectRef, StreamError> {
        if self.gfx.is_none() {
            return Err(StreamError::NotConfigured("gfx"));
        }
        if self.physics.is_none() {
            return Err(StreamError::NotConfigured("physics"));
        }

        let name = if desc.name.is_empty() {
            self.registry.generate_name()
        } else {
            desc.name
        };
        // a destroy hook may recreate the name, so keep going until it is free
        while let Ok(existing) = self.registry.object(&name) {
            tracing::debug!(object = %name, "replacing existing object");
            self.delete_object(&existing)?;
        }

        let inherited = class.properties().clone();
        let properties = PropertyBag::inherit(Some(&inherited), &desc.properties);
        let obj = Rc::new(WorldObject::new(name, Rc::clone(class), desc.position, properties));
        self.registry.insert_object(Rc::clone(&obj));
        self.index.insert(&obj);
        self.fresh.push(Rc::clone(&obj));
        tracing::debug!(object = obj.name(), class = class.name(), "object added");
        Ok(obj)
    }

    pub fn get_object(&self, name: &str) -> Result<ObjectRef, StreamError> {
        self.registry.object(name)
    }

    /// Run the object's teardown hooks, drop it from the index and every set,
    /// then erase it from the registry.
    ///
    /// Fails with `NotRegistered` if the registry did not hold `obj` when
    /// called. Deleting an object whose hooks already deleted it is fine.
    pub fn delete_object(&mut self, obj: &ObjectRef) -> Result<(), StreamError> {
        let was_registered = self.registry.holds(obj);
        self.destroy_object(obj);

        self.index.remove(obj);
        remove_if_exists(&mut self.fresh, obj);
        self.unlist(obj);
        if remove_if_exists(&mut self.loaded, obj) {
            self.unload_resources(obj);
        }

        match self.registry.erase_object(obj) {
            Err(_) if was_registered => Ok(()),
            result => result,
        }
    }

    /// Delete every object.
    pub fn clear_objects(&mut self) {
        for o in self.registry.object_snapshot() {
            if !self.registry.holds(&o) {
                continue;
            }
            if let Err(err) = self.delete_object(&o) {
                tracing::warn!(object = o.name(), %err, "failed to delete object");
            }
        }
    }

    /// Tear down classes and objects. Required before drop.
    pub fn shutdown(&mut self) {
        self.clear_classes();
        self.clear_objects();
        self.shutdown = true;
        tracing::debug!("streamer shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Move `obj`, keeping the world index in step.
    pub fn set_position(&mut self, obj: &ObjectRef, position: Vec3) -> Result<(), StreamError> {
        if !obj.is_live() {
            return Err(StreamError::ObjectDestroyed(obj.name().to_owned()));
        }
        let old = obj.position();
        obj.set_position(position);
        self.index.relocate(obj, old);
        Ok(())
    }

    /// Link `near` as the higher-detail substitute of `obj`.
    pub fn set_near(&mut self, obj: &ObjectRef, near: Option<&ObjectRef>) -> Result<(), StreamError> {
        WorldObject::set_near(obj, near)
    }

    /// Link `far` as the lower-detail substitute of `obj`.
    pub fn set_far(&mut self, obj: &ObjectRef, far: Option<&ObjectRef>) -> Result<(), StreamError> {
        WorldObject::set_far(obj, far)
    }

    // ---- set membership -------------------------------------------------

    /// Enter the activated set, and the subscriber set if the object wants
    /// frame callbacks. No-op if already listed.
    pub fn list(&mut self, obj: &ObjectRef) {
        if contains(&self.activated, obj) {
            return;
        }
        self.activated.push(Rc::clone(obj));
        if obj.needs_frame_callbacks() && !contains(&self.frame_subscribers, obj) {
            self.frame_subscribers.push(Rc::clone(obj));
        }
    }

    /// Leave the activated and subscriber sets. No-op if absent.
    pub fn unlist(&mut self, obj: &ObjectRef) {
        remove_if_exists(&mut self.activated, obj);
        remove_if_exists(&mut self.frame_subscribers, obj);
    }

    /// Set whether `obj` wants per-frame ticks. Only activated objects are
    /// subscribed; the flag is picked up on the next activation otherwise.
    pub fn set_needs_frame_callbacks(&mut self, obj: &ObjectRef, v: bool) {
        obj.set_needs_frame_callbacks_flag(v);
        remove_if_exists(&mut self.frame_subscribers, obj);
        if v && obj.is_activated() && contains(&self.activated, obj) {
            self.frame_subscribers.push(Rc::clone(obj));
        }
    }

    /// Tick every subscriber. An `Ok(false)` from the hook unsubscribes the
    /// object; it stays activated.
    pub fn frame_callbacks(&mut self, elapsed: f32) {
        let subscribers = self.frame_subscribers.clone();
        for o in &subscribers {
            if !o.is_live() || !o.needs_frame_callbacks() || !contains(&self.frame_subscribers, o) {
                continue;
            }
            let Some(class) = o.class() else { continue };
            match class.behaviour().frame(self, o, elapsed) {
                Ok(true) => {}
                Ok(false) => {
                    if o.is_live() {
                        self.set_needs_frame_callbacks(o, false);
                    }
                }
                Err(err) => self.hook_failed(o, "frame", &err),
            }
        }
    }

    // ---- accessors ------------------------------------------------------

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn index(&self) -> &dyn WorldIndex {
        self.index.as_ref()
    }

    /// Reference point of the most recent pass.
    pub fn centre_point(&self) -> Vec3 {
        self.centre
    }

    pub fn candidates(&self) -> &[ObjectRef] {
        &self.fresh
    }

    pub fn loaded(&self) -> &[ObjectRef] {
        &self.loaded
    }

    pub fn activated(&self) -> &[ObjectRef] {
        &self.activated
    }

    pub fn frame_subscribers(&self) -> &[ObjectRef] {
        &self.frame_subscribers
    }

    pub fn last_pass(&self) -> &PassStats {
        &self.last_pass
    }

    pub fn history(&self) -> &PassHistory {
        &self.history
    }

    /// Fade curve in use, as a function of normalised range.
    pub fn fade_table(&self) -> &SplineTable<f32> {
        &self.fade_table
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        if !self.shutdown && self.registry.object_count() > 0 {
            tracing::warn!(
                objects = self.registry.object_count(),
                "streamer dropped without shutdown"
            );
        }
    }
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("objects", &self.registry.object_count())
            .field("classes", &self.registry.class_count())
            .field("candidates", &self.fresh.len())
            .field("loaded", &self.loaded.len())
            .field("activated", &self.activated.len())
            .field("subscribers", &self.frame_subscribers.len())
            .finish()
    }
}
