use std::cell::{Ref, RefCell};
use std::rc::Rc;

use worldstream_common::{PropertyBag, PropertyValue};

use crate::object::ObjectRef;
use crate::streamer::Streamer;

/// Shared handle to a class. Objects keep their class alive after it has been
/// erased from the registry.
pub type ClassRef = Rc<ObjectClass>;

/// Opaque graphics context. The streamer hands it to activation hooks and
/// never looks inside.
pub trait GraphicsContext {
    fn label(&self) -> &str;
}

/// Opaque physics context, handled like [`GraphicsContext`].
pub trait PhysicsContext {
    fn label(&self) -> &str;
}

pub type GfxHandle = Rc<dyn GraphicsContext>;
pub type PhysicsHandle = Rc<dyn PhysicsContext>;

/// Recoverable error raised by a behaviour hook.
///
/// The streamer logs it and treats the object as destroyed; it never aborts
/// a frame pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-class hooks supplied by the scripting layer.
///
/// Every hook receives the streamer and may re-enter it: create or delete
/// objects, toggle frame callbacks, move things. The streamer re-validates the
/// object after each call.
pub trait Behaviour {
    /// Bind graphics/physics resources. The object is already listed as
    /// activated when this runs.
    fn activate(
        &self,
        streamer: &mut Streamer,
        obj: &ObjectRef,
        gfx: &GfxHandle,
        physics: &PhysicsHandle,
    ) -> Result<(), HookError> {
        let _ = (streamer, obj, gfx, physics);
        Ok(())
    }

    /// Release bound resources. Returning `true` asks the streamer to destroy
    /// the object once it has left visibility.
    fn deactivate(&self, streamer: &mut Streamer, obj: &ObjectRef) -> Result<bool, HookError> {
        let _ = (streamer, obj);
        Ok(false)
    }

    /// Per-frame tick for subscribed objects. Returning `false` unsubscribes.
    fn frame(
        &self,
        streamer: &mut Streamer,
        obj: &ObjectRef,
        elapsed: f32,
    ) -> Result<bool, HookError> {
        let _ = (streamer, obj, elapsed);
        Ok(false)
    }

    /// New normalised squared range and fade factor for an activated object.
    fn range_changed(
        &self,
        streamer: &mut Streamer,
        obj: &ObjectRef,
        range2: f32,
        fade: f32,
    ) -> Result<(), HookError> {
        let _ = (streamer, obj, range2, fade);
        Ok(())
    }

    /// Last call before the object loses its class.
    fn destroy(&self, streamer: &mut Streamer, obj: &ObjectRef) -> Result<(), HookError> {
        let _ = (streamer, obj);
        Ok(())
    }
}

/// Behaviour with every hook left at its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inert;

impl Behaviour for Inert {}

/// Named template shared by many objects.
///
/// `properties()` is resolved at creation/merge time: the parent's resolved
/// table overridden key by key by this class's own table. Later changes to the
/// parent are not pushed down.
pub struct ObjectClass {
    name: String,
    parent: RefCell<Option<ClassRef>>,
    own: RefCell<PropertyBag>,
    resolved: RefCell<PropertyBag>,
    behaviour: RefCell<Rc<dyn Behaviour>>,
}

impl ObjectClass {
    pub(crate) fn new(
        name: String,
        parent: Option<ClassRef>,
        own: PropertyBag,
        behaviour: Rc<dyn Behaviour>,
    ) -> Self {
        let inherited = parent.as_ref().map(|p| p.properties().clone());
        let resolved = PropertyBag::inherit(inherited.as_ref(), &own);
        Self {
            name,
            parent: RefCell::new(parent),
            own: RefCell::new(own),
            resolved: RefCell::new(resolved),
            behaviour: RefCell::new(behaviour),
        }
    }

    /// Merge new properties into this class, re-parent it and swap its
    /// behaviour, then re-resolve inheritance.
    pub(crate) fn merge(
        &self,
        parent: Option<ClassRef>,
        properties: &PropertyBag,
        behaviour: Rc<dyn Behaviour>,
    ) {
        self.own.borrow_mut().merge_from(properties);
        let inherited = parent.as_ref().map(|p| p.properties().clone());
        let resolved = PropertyBag::inherit(inherited.as_ref(), &self.own.borrow());
        *self.resolved.borrow_mut() = resolved;
        *self.parent.borrow_mut() = parent;
        *self.behaviour.borrow_mut() = behaviour;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ClassRef> {
        self.parent.borrow().clone()
    }

    /// True if `other` is this class or one of its ancestors.
    pub fn inherits_from(&self, other: &ObjectClass) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let mut cur = self.parent();
        while let Some(class) = cur {
            if std::ptr::eq(&*class, other) {
                return true;
            }
            cur = class.parent();
        }
        false
    }

    /// Resolved properties, inheritance applied.
    pub fn properties(&self) -> Ref<'_, PropertyBag> {
        self.resolved.borrow()
    }

    /// Properties set on this class itself.
    pub fn own_properties(&self) -> Ref<'_, PropertyBag> {
        self.own.borrow()
    }

    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.resolved.borrow().get(key).cloned()
    }

    pub fn behaviour(&self) -> Rc<dyn Behaviour> {
        Rc::clone(&self.behaviour.borrow())
    }
}

impl std::fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("parent", &self.parent().map(|p| p.name.clone()))
            .field("properties", &*self.resolved.borrow())
            .finish()
    }
}
