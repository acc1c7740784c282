use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use glam::Vec3;
use worldstream_common::{ObjectId, PropertyBag, PropertyValue};

use crate::class::ClassRef;
use crate::error::StreamError;

/// Shared handle to a world object. The registry holds the owning copy;
/// scheduler sets hold copies that are purged before the object is erased.
pub type ObjectRef = Rc<WorldObject>;

/// Rendering distance used when neither class nor object sets one.
pub const DEFAULT_RENDERING_DISTANCE: f32 = 100.0;

/// Background resource state of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No load issued.
    #[default]
    Idle,
    /// Load issued, not yet complete.
    Pending,
    /// Resources prepared (or nothing needed preparing).
    Ready,
}

/// Creation parameters for a world object.
#[derive(Debug, Clone, Default)]
pub struct ObjectDesc {
    /// Empty means "generate a name".
    pub name: String,
    pub position: Vec3,
    /// Per-object overrides on top of the class properties.
    pub properties: PropertyBag,
}

impl ObjectDesc {
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            position,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key, value);
        self
    }
}

/// A streamable entity: identity, class, placement and lifecycle flags.
///
/// All mutable state sits behind `Cell`/`RefCell` so that hooks holding an
/// `&ObjectRef` and the streamer can both update it on the frame thread.
pub struct WorldObject {
    id: ObjectId,
    name: String,
    /// `None` once destroyed.
    class: RefCell<Option<ClassRef>>,
    properties: PropertyBag,
    position: Cell<Vec3>,
    rendering_distance: f32,
    activated: Cell<bool>,
    needs_frame_callbacks: Cell<bool>,
    load: Cell<LoadState>,
    range2: Cell<f32>,
    fade: Cell<f32>,
    near: RefCell<Weak<WorldObject>>,
    far: RefCell<Weak<WorldObject>>,
    /// Re-entrancy guards for hooks that tear the object down from inside.
    deactivating: Cell<bool>,
    destroying: Cell<bool>,
}

impl WorldObject {
    pub(crate) fn new(name: String, class: ClassRef, position: Vec3, properties: PropertyBag) -> Self {
        let rendering_distance = properties
            .get_number("renderingDistance")
            .map(|d| d as f32)
            .filter(|d| *d > 0.0)
            .unwrap_or(DEFAULT_RENDERING_DISTANCE);
        let needs_frame_callbacks = properties.get_bool("needsFrameCallbacks").unwrap_or(false);
        Self {
            id: ObjectId::new(),
            name,
            class: RefCell::new(Some(class)),
            properties,
            position: Cell::new(position),
            rendering_distance,
            activated: Cell::new(false),
            needs_frame_callbacks: Cell::new(needs_frame_callbacks),
            load: Cell::new(LoadState::Idle),
            range2: Cell::new(f32::INFINITY),
            fade: Cell::new(0.0),
            near: RefCell::new(Weak::new()),
            far: RefCell::new(Weak::new()),
            deactivating: Cell::new(false),
            destroying: Cell::new(false),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> Option<ClassRef> {
        self.class.borrow().clone()
    }

    /// False once destroyed. Anything holding a handle across a hook call must
    /// check this before using the object again.
    pub fn is_live(&self) -> bool {
        self.class.borrow().is_some()
    }

    /// Class properties with per-object overrides applied.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn position(&self) -> Vec3 {
        self.position.get()
    }

    pub fn rendering_distance(&self) -> f32 {
        self.rendering_distance
    }

    pub fn is_activated(&self) -> bool {
        self.activated.get()
    }

    pub fn needs_frame_callbacks(&self) -> bool {
        self.needs_frame_callbacks.get()
    }

    pub fn load_state(&self) -> LoadState {
        self.load.get()
    }

    /// Normalised squared range from the most recent notification.
    pub fn range2(&self) -> f32 {
        self.range2.get()
    }

    /// Fade factor from the most recent notification, in [0, 1].
    pub fn fade(&self) -> f32 {
        self.fade.get()
    }

    /// Higher-detail substitute, if linked and still alive.
    pub fn near(&self) -> Option<ObjectRef> {
        self.near.borrow().upgrade()
    }

    /// Lower-detail substitute, if linked and still alive.
    pub fn far(&self) -> Option<ObjectRef> {
        self.far.borrow().upgrade()
    }

    pub fn distance2(&self, point: Vec3) -> f32 {
        self.position.get().distance_squared(point)
    }

    /// Squared distance to `point` normalised by the visibility radius
    /// (`rendering_distance * visibility`). Above 1 means out of view.
    pub fn range2_to(&self, point: Vec3, visibility: f32) -> f32 {
        let radius = self.rendering_distance * visibility;
        self.distance2(point) / (radius * radius)
    }

    /// True if `point` is strictly inside `rendering_distance * factor`.
    pub fn within_range(&self, point: Vec3, factor: f32) -> bool {
        let radius = self.rendering_distance * factor;
        self.distance2(point) < radius * radius
    }

    pub(crate) fn set_position(&self, position: Vec3) {
        self.position.set(position);
    }

    pub(crate) fn set_activated(&self, v: bool) {
        self.activated.set(v);
    }

    pub(crate) fn set_needs_frame_callbacks_flag(&self, v: bool) {
        self.needs_frame_callbacks.set(v);
    }

    pub(crate) fn set_load_state(&self, state: LoadState) {
        self.load.set(state);
    }

    pub(crate) fn set_range(&self, range2: f32, fade: f32) {
        self.range2.set(range2);
        self.fade.set(fade);
    }

    pub(crate) fn begin_deactivate(&self) -> bool {
        !self.deactivating.replace(true)
    }

    pub(crate) fn end_deactivate(&self) {
        self.deactivating.set(false);
    }

    pub(crate) fn begin_destroy(&self) -> bool {
        self.is_live() && !self.destroying.replace(true)
    }

    pub(crate) fn finish_destroy(&self) {
        if let Some(near) = self.near() {
            *near.far.borrow_mut() = Weak::new();
        }
        if let Some(far) = self.far() {
            *far.near.borrow_mut() = Weak::new();
        }
        *self.near.borrow_mut() = Weak::new();
        *self.far.borrow_mut() = Weak::new();
        self.class.borrow_mut().take();
        self.destroying.set(false);
    }

    /// Link `near` as the higher-detail substitute of `this` (and `this` as
    /// the far of `near`), replacing any previous links on either side.
    ///
    /// Rejected when it would put an object in its own near chain, which
    /// covers every near/far 2-cycle.
    pub fn set_near(this: &ObjectRef, near: Option<&ObjectRef>) -> Result<(), StreamError> {
        if !this.is_live() {
            return Err(StreamError::ObjectDestroyed(this.name.clone()));
        }
        if let Some(n) = near {
            if !n.is_live() {
                return Err(StreamError::ObjectDestroyed(n.name.clone()));
            }
            let mut cur = Some(Rc::clone(n));
            while let Some(c) = cur {
                if Rc::ptr_eq(&c, this) {
                    return Err(StreamError::LodCycle {
                        far: this.name.clone(),
                        near: n.name.clone(),
                    });
                }
                cur = c.near();
            }
        }

        if let Some(old) = this.near() {
            *old.far.borrow_mut() = Weak::new();
        }
        match near {
            Some(n) => {
                if let Some(old_far) = n.far() {
                    *old_far.near.borrow_mut() = Weak::new();
                }
                *n.far.borrow_mut() = Rc::downgrade(this);
                *this.near.borrow_mut() = Rc::downgrade(n);
            }
            None => *this.near.borrow_mut() = Weak::new(),
        }
        Ok(())
    }

    /// Mirror of [`WorldObject::set_near`]: link `far` as the lower-detail
    /// substitute of `this`.
    pub fn set_far(this: &ObjectRef, far: Option<&ObjectRef>) -> Result<(), StreamError> {
        match far {
            Some(f) => Self::set_near(f, Some(this)),
            None => {
                if !this.is_live() {
                    return Err(StreamError::ObjectDestroyed(this.name.clone()));
                }
                if let Some(old) = this.far() {
                    *old.near.borrow_mut() = Weak::new();
                }
                *this.far.borrow_mut() = Weak::new();
                Ok(())
            }
        }
    }

    /// Class name, or `None` once destroyed.
    pub fn class_name(&self) -> Option<String> {
        self.class.borrow().as_ref().map(|c| c.name().to_owned())
    }
}

impl std::fmt::Debug for WorldObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldObject")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("class", &self.class_name())
            .field("position", &self.position.get())
            .field("activated", &self.activated.get())
            .field("load", &self.load.get())
            .finish()
    }
}

/// Remove `obj` from an unordered handle list by swapping with the last
/// element. Returns whether it was present.
pub(crate) fn remove_if_exists(list: &mut Vec<ObjectRef>, obj: &ObjectRef) -> bool {
    match list.iter().position(|o| Rc::ptr_eq(o, obj)) {
        Some(i) => {
            list.swap_remove(i);
            true
        }
        None => false,
    }
}

pub(crate) fn contains(list: &[ObjectRef], obj: &ObjectRef) -> bool {
    list.iter().any(|o| Rc::ptr_eq(o, obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Inert, ObjectClass};

    fn rock_class() -> ClassRef {
        Rc::new(ObjectClass::new(
            "Rock".into(),
            None,
            PropertyBag::new().with("renderingDistance", 10.0),
            Rc::new(Inert),
        ))
    }

    fn object(name: &str, position: Vec3) -> ObjectRef {
        let class = rock_class();
        let props = class.properties().clone();
        Rc::new(WorldObject::new(name.into(), class, position, props))
    }

    #[test]
    fn rendering_distance_from_properties() {
        let class = rock_class();
        let o = WorldObject::new("a".into(), class.clone(), Vec3::ZERO, class.properties().clone());
        assert_eq!(o.rendering_distance(), 10.0);

        let defaulted = WorldObject::new("b".into(), class, Vec3::ZERO, PropertyBag::new());
        assert_eq!(defaulted.rendering_distance(), DEFAULT_RENDERING_DISTANCE);
    }

    #[test]
    fn normalised_range() {
        let o = object("a", Vec3::new(5.0, 0.0, 0.0));
        // 5 / 10 = 0.5, squared
        assert_eq!(o.range2_to(Vec3::ZERO, 1.0), 0.25);
        // doubling visibility quarters the squared range
        assert_eq!(o.range2_to(Vec3::ZERO, 2.0), 0.0625);
        assert!(o.within_range(Vec3::ZERO, 1.0));
        assert!(!o.within_range(Vec3::ZERO, 0.5));
    }

    #[test]
    fn near_far_links_are_bidirectional() {
        let far = object("far", Vec3::ZERO);
        let near = object("near", Vec3::ZERO);
        WorldObject::set_near(&far, Some(&near)).unwrap();

        assert!(Rc::ptr_eq(&far.near().unwrap(), &near));
        assert!(Rc::ptr_eq(&near.far().unwrap(), &far));

        WorldObject::set_near(&far, None).unwrap();
        assert!(far.near().is_none());
        assert!(near.far().is_none());
    }

    #[test]
    fn set_far_mirrors_set_near() {
        let a = object("a", Vec3::ZERO);
        let b = object("b", Vec3::ZERO);
        WorldObject::set_far(&a, Some(&b)).unwrap();
        assert!(Rc::ptr_eq(&b.near().unwrap(), &a));
        WorldObject::set_far(&a, None).unwrap();
        assert!(b.near().is_none());
    }

    #[test]
    fn relinking_clears_previous_partners() {
        let far = object("far", Vec3::ZERO);
        let near1 = object("near1", Vec3::ZERO);
        let near2 = object("near2", Vec3::ZERO);
        WorldObject::set_near(&far, Some(&near1)).unwrap();
        WorldObject::set_near(&far, Some(&near2)).unwrap();
        assert!(near1.far().is_none());
        assert!(Rc::ptr_eq(&near2.far().unwrap(), &far));

        let other = object("other", Vec3::ZERO);
        WorldObject::set_near(&other, Some(&near2)).unwrap();
        assert!(far.near().is_none());
    }

    #[test]
    fn rejects_two_cycles_and_self_links() {
        let a = object("a", Vec3::ZERO);
        let b = object("b", Vec3::ZERO);
        WorldObject::set_near(&a, Some(&b)).unwrap();
        assert!(matches!(
            WorldObject::set_near(&b, Some(&a)),
            Err(StreamError::LodCycle { .. })
        ));
        assert!(matches!(
            WorldObject::set_near(&a, Some(&a)),
            Err(StreamError::LodCycle { .. })
        ));
    }

    #[test]
    fn rejects_longer_cycles() {
        let a = object("a", Vec3::ZERO);
        let b = object("b", Vec3::ZERO);
        let c = object("c", Vec3::ZERO);
        WorldObject::set_near(&a, Some(&b)).unwrap();
        WorldObject::set_near(&b, Some(&c)).unwrap();
        assert!(WorldObject::set_near(&c, Some(&a)).is_err());
        // chain untouched by the failed link
        assert!(Rc::ptr_eq(&b.near().unwrap(), &c));
        assert!(c.near().is_none());
    }

    #[test]
    fn destroy_unlinks_partners() {
        let far = object("far", Vec3::ZERO);
        let near = object("near", Vec3::ZERO);
        WorldObject::set_near(&far, Some(&near)).unwrap();
        assert!(near.begin_destroy());
        near.finish_destroy();
        assert!(!near.is_live());
        assert!(far.near().is_none());
        assert!(matches!(
            WorldObject::set_near(&far, Some(&near)),
            Err(StreamError::ObjectDestroyed(_))
        ));
    }

    #[test]
    fn remove_if_exists_swaps_last() {
        let a = object("a", Vec3::ZERO);
        let b = object("b", Vec3::ZERO);
        let c = object("c", Vec3::ZERO);
        let mut list = vec![a.clone(), b.clone(), c.clone()];
        assert!(remove_if_exists(&mut list, &a));
        assert!(!remove_if_exists(&mut list, &a));
        assert_eq!(list.len(), 2);
        assert!(Rc::ptr_eq(&list[0], &c));
        assert!(contains(&list, &b));
    }
}
