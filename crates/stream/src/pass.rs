use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

use glam::Vec3;

use crate::object::{contains, LoadState, ObjectRef};
use crate::stats::PassStats;
use crate::streamer::Streamer;

impl Streamer {
    /// Run one streaming pass around `point`.
    ///
    /// Phase A deactivates what left view, phase B releases resources of what
    /// left prepare range, phase C issues loads and activates what arrived.
    /// The loader gets its `process_pending`/`check_resource_pressure` calls
    /// once, after all activation decisions.
    pub fn centre(&mut self, point: Vec3) {
        let span = tracing::info_span!("stream_pass", x = point.x, y = point.y, z = point.z);
        let _enter = span.enter();
        let start = Instant::now();

        self.centre = point;
        let mut stats = PassStats::default();
        let mut found = std::mem::take(&mut self.fresh);

        self.deactivate_distant(point, &mut found, &mut stats);
        self.evict_distant(point, &mut stats);
        self.load_and_activate(point, found, &mut stats);

        self.loader.process_pending();
        self.loader.check_resource_pressure();

        stats.pass_time = start.elapsed();
        tracing::trace!(
            candidates = stats.candidates,
            deactivated = stats.deactivated,
            evicted = stats.evicted,
            loads = stats.loads_issued,
            activated = stats.activated,
            occluded = stats.occluded,
            deferred = stats.deferred,
            "stream pass complete"
        );
        self.last_pass = stats;
        self.history.record(stats);
    }

    /// Phase A. Works on a snapshot: deactivation and range hooks may change
    /// the activated set.
    fn deactivate_distant(&mut self, point: Vec3, found: &mut Vec<ObjectRef>, stats: &mut PassStats) {
        let visibility = self.config.visibility;
        let victims = self.activated.clone();
        for o in &victims {
            if !o.is_live() || !o.is_activated() {
                continue;
            }
            let range2 = o.range2_to(point, visibility);
            self.notify_range2(o, range2);
            if let Some(far) = o.far() {
                // again, so the far picks up the fade imposed by o
                let far_range2 = far.range2_to(point, visibility);
                self.notify_range2(&far, far_range2);
            }
            if !o.is_live() || !o.is_activated() {
                continue;
            }

            if range2 > 1.0 {
                let far = o.far();
                let killme = self.deactivate_object(o);
                stats.deactivated += 1;
                if let Some(far) = far {
                    // make sure the far is considered this pass
                    found.push(far);
                }
                if killme {
                    self.kill(o, stats);
                }
            } else if let Some(near) = self.occluding_near(o, point) {
                tracing::debug!(object = o.name(), near = near.name(), "replaced by near substitute");
                let killme = self.deactivate_object(o);
                stats.deactivated += 1;
                stats.occluded += 1;
                if killme {
                    self.kill(o, stats);
                }
            }
        }
    }

    /// Phase B. No hooks run here, so the live set is edited in place.
    fn evict_distant(&mut self, point: Vec3, stats: &mut PassStats) {
        let factor = self.config.visibility * self.config.prepare_distance_factor;
        let mut i = 0;
        while i < self.loaded.len() {
            if self.loaded[i].within_range(point, factor) {
                i += 1;
                continue;
            }
            let o = self.loaded.swap_remove(i);
            self.unload_resources(&o);
            stats.evicted += 1;
        }
    }

    /// Phase C.
    fn load_and_activate(&mut self, point: Vec3, mut found: Vec<ObjectRef>, stats: &mut PassStats) {
        let visibility = self.config.visibility;
        let prepare = visibility * self.config.prepare_distance_factor;

        found.extend(self.index.objects_near(point, self.config.prediction_step, prepare));
        let mut seen = HashSet::with_capacity(found.len());
        found.retain(|o| seen.insert(Rc::as_ptr(o)));
        stats.candidates = found.len();

        for o in &found {
            // a hook earlier in this scan may have destroyed it
            if !o.is_live() || o.is_activated() {
                continue;
            }

            if o.load_state() == LoadState::Idle {
                if !o.within_range(point, prepare) {
                    continue;
                }
                if self.config.load_budget.is_some_and(|b| stats.loads_issued >= b) {
                    self.defer(o, stats);
                    continue;
                }
                self.queue_bg_prepare(o);
                stats.loads_issued += 1;
            }
            if !self.bg_prepare_complete(o) {
                continue;
            }

            let range2 = o.range2_to(point, visibility);
            if range2 > 1.0 {
                continue;
            }

            if let Some(near) = self.occluding_near(o, point) {
                tracing::trace!(object = o.name(), near = near.name(), "held back by near substitute");
                stats.occluded += 1;
                continue;
            }

            if self.config.activation_budget.is_some_and(|b| stats.activated >= b) {
                self.defer(o, stats);
                continue;
            }

            self.activate_object(o);
            // activation hooks can destroy the object
            if !o.is_live() || !o.is_activated() {
                continue;
            }
            stats.activated += 1;
            self.notify_range2(o, range2);
        }
    }

    fn defer(&mut self, o: &ObjectRef, stats: &mut PassStats) {
        stats.deferred += 1;
        if !contains(&self.fresh, o) {
            self.fresh.push(Rc::clone(o));
        }
    }

    fn kill(&mut self, o: &ObjectRef, stats: &mut PassStats) {
        if !o.is_live() {
            return;
        }
        match self.delete_object(o) {
            Ok(()) => stats.destroyed += 1,
            Err(err) => tracing::warn!(object = o.name(), %err, "failed to delete object"),
        }
    }
}
