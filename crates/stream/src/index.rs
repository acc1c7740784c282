use glam::Vec3;

use crate::object::ObjectRef;

/// Spatial index over world objects, queried once per frame pass.
///
/// The streamer keeps it in sync: objects are inserted on creation, relocated
/// when moved through the streamer and removed on deletion.
pub trait WorldIndex {
    fn insert(&mut self, obj: &ObjectRef);

    /// Remove `obj`. Unknown objects are ignored.
    fn remove(&mut self, obj: &ObjectRef);

    /// `obj` has moved from `old_position` to `obj.position()`.
    fn relocate(&mut self, obj: &ObjectRef, old_position: Vec3);

    /// Objects whose radius `rendering_distance * factor + prediction_step`
    /// contains `point`. Order is unspecified.
    fn objects_near(&self, point: Vec3, prediction_step: f32, factor: f32) -> Vec<ObjectRef>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
