use std::collections::BTreeMap;
use std::rc::Rc;

use crate::class::ClassRef;
use crate::error::StreamError;
use crate::object::ObjectRef;

/// Canonical name → class and name → object maps.
///
/// Pure bookkeeping: hooks, sets and the world index are the streamer's
/// business. Uses BTreeMap so listings come out in name order.
#[derive(Debug, Default)]
pub struct Registry {
    classes: BTreeMap<String, ClassRef>,
    objects: BTreeMap<String, ObjectRef>,
    name_counter: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&self, name: &str) -> Result<ClassRef, StreamError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::ClassNotFound(name.to_owned()))
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub(crate) fn insert_class(&mut self, class: ClassRef) {
        self.classes.insert(class.name().to_owned(), class);
    }

    /// Hide a class from lookup. Objects using it keep their handle.
    pub(crate) fn remove_class(&mut self, name: &str) -> Option<ClassRef> {
        self.classes.remove(name)
    }

    pub fn object(&self, name: &str) -> Result<ObjectRef, StreamError> {
        self.objects
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::ObjectNotFound(name.to_owned()))
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// True if `obj` itself (not merely its name) is registered.
    pub fn holds(&self, obj: &ObjectRef) -> bool {
        self.objects
            .get(obj.name())
            .is_some_and(|o| Rc::ptr_eq(o, obj))
    }

    pub(crate) fn insert_object(&mut self, obj: ObjectRef) {
        self.objects.insert(obj.name().to_owned(), obj);
    }

    /// Erase exactly `obj`. A missing name, or a name now bound to another
    /// object, is `NotRegistered` rather than `ObjectNotFound`.
    pub(crate) fn erase_object(&mut self, obj: &ObjectRef) -> Result<(), StreamError> {
        if !self.holds(obj) {
            return Err(StreamError::NotRegistered(obj.name().to_owned()));
        }
        self.objects.remove(obj.name());
        Ok(())
    }

    /// Next `Unnamed:<n>` name not already in use.
    pub(crate) fn generate_name(&mut self) -> String {
        loop {
            let name = format!("Unnamed:{}", self.name_counter);
            self.name_counter += 1;
            if !self.objects.contains_key(&name) {
                return name;
            }
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectRef> {
        self.objects.values()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassRef> {
        self.classes.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn object_snapshot(&self) -> Vec<ObjectRef> {
        self.objects.values().cloned().collect()
    }

    pub(crate) fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }
}
