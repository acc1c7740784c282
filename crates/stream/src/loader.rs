//! Background resource preparation.
//!
//! The streamer never blocks on a load: it enqueues, then polls
//! [`BackgroundLoader::is_complete`] on later passes. [`ThreadPoolLoader`]
//! runs preparation jobs on rayon's pool and reports back over a channel that
//! is drained on the frame thread.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use worldstream_common::ObjectId;

use crate::object::ObjectRef;

/// Off-thread resource preparation, driven from the frame thread.
///
/// Every method must return without waiting on background work.
pub trait BackgroundLoader {
    /// Start preparing `obj`'s resources. `false` means there is nothing to
    /// prepare and the object counts as loaded straight away.
    fn enqueue(&mut self, obj: &ObjectRef) -> bool;

    /// True once the load issued by `enqueue` has finished.
    fn is_complete(&mut self, obj: &ObjectRef) -> bool;

    /// Drop interest in `obj`'s resources, whether or not the load finished.
    fn release(&mut self, obj: &ObjectRef);

    /// Called once per pass after all activation decisions.
    fn process_pending(&mut self);

    /// Housekeeping after [`BackgroundLoader::process_pending`].
    fn check_resource_pressure(&mut self);
}

/// Everything a preparation job needs, detached from the `Rc` world.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub id: ObjectId,
    pub object: String,
    pub class: String,
    pub resources: Vec<String>,
}

impl LoadRequest {
    /// Build a request from the object's `resources` property. `None` when the
    /// object lists no resources.
    pub fn for_object(obj: &ObjectRef) -> Option<Self> {
        let resources: Vec<String> = obj
            .properties()
            .get_text_list("resources")
            .into_iter()
            .map(str::to_owned)
            .collect();
        if resources.is_empty() {
            return None;
        }
        Some(Self {
            id: obj.id(),
            object: obj.name().to_owned(),
            class: obj.class_name().unwrap_or_default(),
            resources,
        })
    }
}

/// Job body run on a worker thread.
pub type PrepareFn = Arc<dyn Fn(&LoadRequest) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Jobs allowed on the pool at once; the rest wait for `process_pending`.
    pub max_in_flight: usize,
    /// Resident resource count above which `check_resource_pressure` warns.
    pub resident_budget: Option<usize>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            resident_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Queued,
    /// `abandoned`: released while running, discard the completion.
    InFlight { abandoned: bool },
    Ready { resources: usize },
}

struct Completion {
    id: ObjectId,
    resources: usize,
    result: Result<(), String>,
}

/// [`BackgroundLoader`] backed by rayon's global pool.
pub struct ThreadPoolLoader {
    prepare: PrepareFn,
    options: LoaderOptions,
    slots: HashMap<ObjectId, Slot>,
    queue: VecDeque<LoadRequest>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    in_flight: usize,
    resident: usize,
    failures: usize,
    over_budget: bool,
}

impl ThreadPoolLoader {
    pub fn new(options: LoaderOptions, prepare: PrepareFn) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            prepare,
            options: LoaderOptions {
                max_in_flight: options.max_in_flight.max(1),
                ..options
            },
            slots: HashMap::new(),
            queue: VecDeque::new(),
            tx,
            rx,
            in_flight: 0,
            resident: 0,
            failures: 0,
            over_budget: false,
        }
    }

    /// Loader whose jobs succeed immediately. Handy for tools and benches.
    pub fn instant(options: LoaderOptions) -> Self {
        Self::new(options, Arc::new(|_: &LoadRequest| Ok(())))
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Jobs currently running on the pool.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Requests waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.slots.values().filter(|s| **s == Slot::Queued).count()
    }

    /// Resources held by completed, unreleased loads.
    pub fn resident(&self) -> usize {
        self.resident
    }

    /// Jobs whose preparation function returned an error.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Objects the loader currently holds state for.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    fn spawn(&mut self, request: LoadRequest) {
        let prepare = Arc::clone(&self.prepare);
        let tx = self.tx.clone();
        self.slots.insert(request.id, Slot::InFlight { abandoned: false });
        self.in_flight += 1;
        tracing::trace!(object = %request.object, "load dispatched");
        rayon::spawn(move || {
            let result = prepare(&request);
            // receiver gone means the loader was dropped; nobody is waiting
            let _ = tx.send(Completion {
                id: request.id,
                resources: request.resources.len(),
                result,
            });
        });
    }

    fn drain_completions(&mut self) {
        while let Ok(done) = self.rx.try_recv() {
            self.in_flight -= 1;
            match self.slots.get(&done.id) {
                Some(Slot::InFlight { abandoned: true }) => {
                    self.slots.remove(&done.id);
                }
                Some(Slot::InFlight { abandoned: false }) => {
                    if let Err(message) = &done.result {
                        self.failures += 1;
                        tracing::warn!(id = %done.id, %message, "background load failed");
                    }
                    // a failed load still completes so the object is not
                    // stuck pending forever
                    self.slots.insert(done.id, Slot::Ready { resources: done.resources });
                    self.resident += done.resources;
                }
                _ => {}
            }
        }
    }

    fn dispatch(&mut self) {
        while self.in_flight < self.options.max_in_flight {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            if self.slots.get(&request.id) == Some(&Slot::Queued) {
                self.spawn(request);
            }
        }
    }
}

impl BackgroundLoader for ThreadPoolLoader {
    fn enqueue(&mut self, obj: &ObjectRef) -> bool {
        let Some(request) = LoadRequest::for_object(obj) else {
            return false;
        };
        match self.slots.get_mut(&request.id) {
            Some(Slot::InFlight { abandoned }) => {
                *abandoned = false;
                return true;
            }
            Some(_) => return true,
            None => {}
        }
        if self.in_flight < self.options.max_in_flight {
            self.spawn(request);
        } else {
            self.slots.insert(request.id, Slot::Queued);
            self.queue.push_back(request);
        }
        true
    }

    fn is_complete(&mut self, obj: &ObjectRef) -> bool {
        self.drain_completions();
        matches!(self.slots.get(&obj.id()), Some(Slot::Ready { .. }))
    }

    fn release(&mut self, obj: &ObjectRef) {
        let id = obj.id();
        match self.slots.get_mut(&id) {
            Some(Slot::InFlight { abandoned }) => *abandoned = true,
            Some(Slot::Ready { resources }) => {
                self.resident -= *resources;
                self.slots.remove(&id);
            }
            Some(Slot::Queued) => {
                self.slots.remove(&id);
            }
            None => {}
        }
    }

    fn process_pending(&mut self) {
        self.drain_completions();
        self.dispatch();
    }

    fn check_resource_pressure(&mut self) {
        let Some(budget) = self.options.resident_budget else {
            return;
        };
        let over = self.resident > budget;
        if over && !self.over_budget {
            tracing::warn!(resident = self.resident, budget, "resident resources over budget");
        }
        self.over_budget = over;
    }
}

impl std::fmt::Debug for ThreadPoolLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolLoader")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight)
            .field("queued", &self.queue.len())
            .field("resident", &self.resident)
            .finish()
    }
}
