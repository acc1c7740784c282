//! Per-object transitions: load, activate, notify, deactivate, destroy.
//!
//! Each transition that calls a behaviour hook leaves the object in a
//! consistent state even if the hook deletes it, and callers check
//! [`WorldObject::is_live`](crate::WorldObject::is_live) before carrying on.

use glam::Vec3;

use crate::class::HookError;
use crate::object::{LoadState, ObjectRef};
use crate::streamer::Streamer;

impl Streamer {
    /// Bind the object to the current contexts and run its activate hook.
    /// The object is listed before the hook runs.
    pub(crate) fn activate_object(&mut self, obj: &ObjectRef) {
        if obj.is_activated() {
            return;
        }
        let Some(class) = obj.class() else { return };
        let (Some(gfx), Some(physics)) = (self.gfx.clone(), self.physics.clone()) else {
            return;
        };
        obj.set_activated(true);
        self.list(obj);
        tracing::debug!(object = obj.name(), "activate");
        if let Err(err) = class.behaviour().activate(self, obj, &gfx, &physics) {
            self.hook_failed(obj, "activate", &err);
        }
    }

    /// Run the deactivate hook, then clear the flag and unlist. Returns the
    /// hook's request to destroy the object; a failing hook counts as one.
    pub(crate) fn deactivate_object(&mut self, obj: &ObjectRef) -> bool {
        if !obj.is_activated() || !obj.begin_deactivate() {
            return false;
        }
        let killme = match obj.class() {
            Some(class) => match class.behaviour().deactivate(self, obj) {
                Ok(killme) => killme,
                Err(err) => {
                    tracing::warn!(object = obj.name(), hook = "deactivate", error = %err, "hook failed");
                    true
                }
            },
            None => false,
        };
        obj.set_activated(false);
        obj.end_deactivate();
        self.unlist(obj);
        tracing::debug!(object = obj.name(), killme, "deactivate");
        killme
    }

    /// Deactivate, run the destroy hook, unlink LOD partners and drop the
    /// class. Leaves set and registry cleanup to `delete_object`.
    pub(crate) fn destroy_object(&mut self, obj: &ObjectRef) {
        if !obj.begin_destroy() {
            return;
        }
        self.deactivate_object(obj);
        if let Some(class) = obj.class() {
            if let Err(err) = class.behaviour().destroy(self, obj) {
                tracing::warn!(object = obj.name(), hook = "destroy", error = %err, "hook failed");
            }
        }
        obj.finish_destroy();
        tracing::debug!(object = obj.name(), "destroyed");
    }

    /// Record a new normalised squared range on the object and, if it is
    /// activated, tell its behaviour together with the fade factor.
    pub(crate) fn notify_range2(&mut self, obj: &ObjectRef, range2: f32) {
        let fade = self.fade_for(obj, range2);
        obj.set_range(range2, fade);
        if !obj.is_activated() {
            return;
        }
        let Some(class) = obj.class() else { return };
        if let Err(err) = class.behaviour().range_changed(self, obj, range2, fade) {
            self.hook_failed(obj, "range_changed", &err);
        }
    }

    /// Fade from the curve, reduced by however far an activated near
    /// substitute has faded in.
    pub(crate) fn fade_for(&self, obj: &ObjectRef, range2: f32) -> f32 {
        let range = range2.max(0.0).sqrt();
        let mut fade = self.fade_table.evaluate(range).clamp(0.0, 1.0);
        if let Some(near) = obj.near() {
            if near.is_activated() {
                fade *= 1.0 - near.fade();
            }
        }
        fade
    }

    /// First activated object along the near chain whose overlap radius
    /// contains `point`.
    pub(crate) fn occluding_near(&self, obj: &ObjectRef, point: Vec3) -> Option<ObjectRef> {
        let factor = self.config.visibility * self.config.fade_overlap_factor;
        let mut near = obj.near();
        while let Some(n) = near {
            if n.within_range(point, factor) && n.is_activated() {
                return Some(n);
            }
            near = n.near();
        }
        None
    }

    /// Issue the background load and start tracking the object in `loaded`.
    pub(crate) fn queue_bg_prepare(&mut self, obj: &ObjectRef) {
        let state = if self.loader.enqueue(obj) {
            LoadState::Pending
        } else {
            LoadState::Ready
        };
        obj.set_load_state(state);
        self.loaded.push(obj.clone());
        tracing::debug!(object = obj.name(), ?state, "load issued");
    }

    /// Poll a pending load without waiting.
    pub(crate) fn bg_prepare_complete(&mut self, obj: &ObjectRef) -> bool {
        match obj.load_state() {
            LoadState::Ready => true,
            LoadState::Pending => {
                let done = self.loader.is_complete(obj);
                if done {
                    obj.set_load_state(LoadState::Ready);
                }
                done
            }
            LoadState::Idle => false,
        }
    }

    pub(crate) fn unload_resources(&mut self, obj: &ObjectRef) {
        self.loader.release(obj);
        obj.set_load_state(LoadState::Idle);
        tracing::debug!(object = obj.name(), "resources released");
    }

    /// A hook failed: log it and treat the object as destroyed.
    pub(crate) fn hook_failed(&mut self, obj: &ObjectRef, hook: &'static str, err: &HookError) {
        tracing::warn!(object = obj.name(), hook, error = %err, "hook failed, destroying object");
        if !obj.is_live() {
            return;
        }
        if let Err(err) = self.delete_object(obj) {
            tracing::warn!(object = obj.name(), %err, "failed to delete object after hook error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use glam::Vec3;

    use crate::class::Inert;
    use crate::config::StreamerConfig;
    use crate::grid::GridIndex;
    use crate::object::{LoadState, ObjectDesc};
    use crate::testing::*;

    #[test]
    fn fade_follows_the_curve() {
        let (mut s, _) = instant_streamer();
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(Inert)).unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        assert_eq!(s.fade_for(&a, 0.25), 1.0);
        assert_eq!(s.fade_for(&a, 1.0), 0.0);
        let mid = s.fade_for(&a, 0.85 * 0.85);
        assert!(mid > 0.0 && mid < 1.0);
        // beyond the last sample the curve extrapolates, the fade does not
        assert_eq!(s.fade_for(&a, 4.0), 0.0);
    }

    #[test]
    fn activated_near_reduces_far_fade() {
        let (mut s, _) = instant_streamer();
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(Inert)).unwrap();
        let far = s.add_object(&rock, ObjectDesc::new("far", Vec3::ZERO)).unwrap();
        let near = s.add_object(&rock, ObjectDesc::new("near", Vec3::ZERO)).unwrap();
        s.set_near(&far, Some(&near)).unwrap();

        near.set_activated(true);
        near.set_range(0.8, 0.25);
        assert_relative_eq!(s.fade_for(&far, 0.0), 0.75);
        near.set_activated(false);
        assert_eq!(s.fade_for(&far, 0.0), 1.0);
    }

    #[test]
    fn occluding_near_walks_the_chain() {
        let (mut s, _) = instant_streamer();
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(Inert)).unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        let b = s.add_object(&rock, ObjectDesc::new("b", Vec3::ZERO)).unwrap();
        let c = s.add_object(&rock, ObjectDesc::new("c", Vec3::ZERO)).unwrap();
        s.set_near(&a, Some(&b)).unwrap();
        s.set_near(&b, Some(&c)).unwrap();

        assert!(s.occluding_near(&a, Vec3::ZERO).is_none());
        c.set_activated(true);
        let found = s.occluding_near(&a, Vec3::new(14.0, 0.0, 0.0)).unwrap();
        assert!(Rc::ptr_eq(&found, &c));
        // overlap radius is 10 * 1.5
        assert!(s.occluding_near(&a, Vec3::new(16.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn loader_rejection_counts_as_ready() {
        let (loader, state) = ScriptedLoader::new(false);
        state.borrow_mut().reject = true;
        let mut s = configured(
            StreamerConfig::default(),
            Box::new(GridIndex::new(16.0)),
            Box::new(loader),
        );
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(Inert)).unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        s.queue_bg_prepare(&a);
        assert_eq!(a.load_state(), LoadState::Ready);
        assert!(s.bg_prepare_complete(&a));
        assert_eq!(s.loaded().len(), 1);

        s.unload_resources(&a);
        assert_eq!(a.load_state(), LoadState::Idle);
        assert!(!s.bg_prepare_complete(&a));
    }

    #[test]
    fn pending_load_polls_the_loader() {
        let (loader, state) = ScriptedLoader::new(false);
        let mut s = configured(
            StreamerConfig::default(),
            Box::new(GridIndex::new(16.0)),
            Box::new(loader),
        );
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(Inert)).unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        s.queue_bg_prepare(&a);
        assert_eq!(a.load_state(), LoadState::Pending);
        assert!(!s.bg_prepare_complete(&a));
        state.borrow_mut().complete.insert("a".into());
        assert!(s.bg_prepare_complete(&a));
        assert_eq!(a.load_state(), LoadState::Ready);
    }

    #[test]
    fn deactivate_is_not_reentered() {
        let (mut s, _) = instant_streamer();
        let log = new_log();
        let behaviour = Recording::new(&log).on("deactivate", |s, o| {
            // tearing down from inside the hook must not recurse
            s.delete_object(o).unwrap();
        });
        let rock = s.add_class("Rock", None, rock_props(10.0), Rc::new(behaviour)).unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        s.centre(Vec3::ZERO);

        s.centre(Vec3::new(50.0, 0.0, 0.0));
        assert_eq!(count(&log, "deactivate a"), 1);
        assert_eq!(count(&log, "destroy a"), 1);
        assert!(!a.is_live());
        assert!(s.get_object("a").is_err());
        assert_set_invariants(&s);
    }

    #[test]
    fn failing_deactivate_destroys_on_leaving_view() {
        let (mut s, _) = instant_streamer();
        let log = new_log();
        let rock = s
            .add_class("Rock", None, rock_props(10.0), Rc::new(Recording::new(&log).failing("deactivate")))
            .unwrap();
        let a = s.add_object(&rock, ObjectDesc::new("a", Vec3::ZERO)).unwrap();
        s.centre(Vec3::ZERO);
        s.centre(Vec3::new(50.0, 0.0, 0.0));
        assert!(!a.is_live());
        assert_eq!(s.last_pass().destroyed, 1);
    }
}
