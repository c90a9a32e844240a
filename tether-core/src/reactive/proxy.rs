//! Reactive Records
//!
//! A [`Record`] is a plain mutable mapping from field names to [`Value`]s.
//! On its own it is not observable. Wrapping it with [`wrap`] produces a
//! [`Reactive`] proxy: reading a field through the proxy inside an effect
//! subscribes the effect to that field, and writing a field through the
//! proxy re-runs the effects that read it.
//!
//! # Containers
//!
//! Proxies do not intercept anything at runtime. Every container that can be
//! made reactive implements [`Target`], an explicit get/set/remove/keys
//! interface, and the proxy calls it around its tracking and notification.
//! [`Record`] is the container shipped with the crate.
//!
//! # Identity
//!
//! There is at most one live proxy per target. Proxies are cached in a
//! thread-local map keyed by the target's [`EntityId`] and holding weak
//! references, so the cache keeps neither the proxy nor the target alive.
//! `wrap(proxy.target())` always returns `proxy` itself.
//!
//! # Nesting
//!
//! Wrapping is shallow. A nested record is stored as [`Value::Record`] and
//! [`Reactive::get`] returns it raw. [`Reactive::child`] reads the field
//! with tracking and wraps the nested record on first access, through the
//! same cache, so nested proxies are identity-stable too.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::runtime::{DepKey, Runtime};
use super::value::{record_to_json, Value};
use super::EntityId;
use crate::error::{ReactiveError, Result};

/// A container whose fields can be observed through a [`Reactive`] proxy.
///
/// Implementations are handles: cloning one must yield another handle to
/// the same container, with the same [`EntityId`]. None of these methods
/// track or notify; that is the proxy's job.
pub trait Target: Clone + 'static {
    /// Stable identity of the container.
    fn entity_id(&self) -> EntityId;

    /// Read a field.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a field, returning the previous value.
    fn set(&self, key: &str, value: Value) -> Option<Value>;

    /// Remove a field, returning its value.
    fn remove(&self, key: &str) -> Option<Value>;

    /// Field names, in container order.
    fn keys(&self) -> Vec<String>;

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

struct RecordInner {
    entity: EntityId,
    fields: RefCell<IndexMap<String, Value>>,
}

impl Drop for RecordInner {
    fn drop(&mut self) {
        Runtime::forget_entity(self.entity);
    }
}

/// An insertion-ordered mutable record.
///
/// Cloning a `Record` creates a new handle to the **same** record.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RecordInner {
                entity: EntityId::new(),
                fields: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Build a record from a JSON object. Nested objects become nested
    /// records.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let found = json_kind(&json);
        match Value::from_json(json) {
            Value::Record(record) => Ok(record),
            _ => Err(ReactiveError::NotAnObject { found }),
        }
    }

    /// Serialize the record, failing if it contains itself.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        record_to_json(self, &mut Vec::new())
    }

    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    /// Check whether two handles refer to the same record.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Target for Record {
    fn entity_id(&self) -> EntityId {
        self.inner.entity
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.inner.fields.borrow_mut().insert(key.to_string(), value)
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow_mut().shift_remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Self::new();
        record
            .inner
            .fields
            .borrow_mut()
            .extend(iter.into_iter().map(|(key, value)| (key.into(), value.into())));
        record
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Fields are left out: records may contain themselves.
        f.debug_struct("Record")
            .field("id", &self.inner.entity)
            .field("keys", &self.keys())
            .finish()
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Proxies
// ----------------------------------------------------------------------------

thread_local! {
    static PROXIES: RefCell<HashMap<EntityId, Weak<dyn Any>>> = RefCell::new(HashMap::new());
}

struct ProxyInner<T: Target> {
    target: T,
}

impl<T: Target> Drop for ProxyInner<T> {
    fn drop(&mut self) {
        let entity = self.target.entity_id();
        let _ = PROXIES.try_with(|proxies| {
            if let Ok(mut proxies) = proxies.try_borrow_mut() {
                if proxies.get(&entity).is_some_and(|weak| weak.strong_count() == 0) {
                    proxies.remove(&entity);
                }
            }
        });
    }
}

/// The observable proxy of a [`Target`].
///
/// Cloning a `Reactive` yields the same proxy; see [`Reactive::ptr_eq`].
pub struct Reactive<T: Target = Record> {
    inner: Rc<ProxyInner<T>>,
}

/// Get the reactive proxy of `target`, creating it on first use.
///
/// # Example
///
/// ```rust,ignore
/// let user = wrap(&Record::from_iter([("name", "ada")]));
///
/// let greeting = run_effect({
///     let user = user.clone();
///     move || println!("hello {:?}", user.get("name"))
/// });
///
/// user.set("name", "grace"); // prints: hello Some(Str("grace"))
/// ```
pub fn wrap<T: Target>(target: &T) -> Reactive<T> {
    let entity = target.entity_id();

    let cached = PROXIES.with(|proxies| proxies.borrow().get(&entity).and_then(Weak::upgrade));
    if let Some(Ok(inner)) = cached.map(|any| any.downcast::<ProxyInner<T>>()) {
        return Reactive { inner };
    }

    let inner = Rc::new(ProxyInner {
        target: target.clone(),
    });
    let erased: Rc<dyn Any> = inner.clone();
    PROXIES.with(|proxies| {
        proxies.borrow_mut().insert(entity, Rc::downgrade(&erased));
    });

    Reactive { inner }
}

impl<T: Target> Reactive<T> {
    /// The wrapped container.
    pub fn target(&self) -> &T {
        &self.inner.target
    }

    pub fn entity_id(&self) -> EntityId {
        self.inner.target.entity_id()
    }

    /// Check whether two handles are the same proxy.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Read a field.
    ///
    /// If called within a running effect, this also subscribes the effect
    /// to the field, whether or not the field currently exists.
    pub fn get(&self, key: &str) -> Option<Value> {
        Runtime::track(self.entity_id(), DepKey::field(key));
        self.inner.target.get(key)
    }

    /// Read a field without subscribing to it.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.inner.target.get(key)
    }

    /// Check for a field, subscribing to it.
    pub fn contains_key(&self, key: &str) -> bool {
        Runtime::track(self.entity_id(), DepKey::field(key));
        self.inner.target.contains_key(key)
    }

    /// Field names, subscribing to insertions and removals.
    pub fn keys(&self) -> Vec<String> {
        Runtime::track(self.entity_id(), DepKey::Keys);
        self.inner.target.keys()
    }

    /// Write a field and re-run the effects that read it.
    ///
    /// Writing a value equal to the current one does nothing. Adding a new
    /// field also re-runs effects that listed the keys.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let old = self.inner.target.get(key);
        if old.as_ref() == Some(&value) {
            return;
        }

        self.inner.target.set(key, value);

        let entity = self.entity_id();
        Runtime::notify(entity, &DepKey::field(key));
        if old.is_none() {
            Runtime::notify(entity, &DepKey::Keys);
        }
    }

    /// Write a field computed from its current value.
    pub fn update<F>(&self, key: &str, f: F)
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let value = f(self.get_untracked(key));
        self.set(key, value);
    }

    /// Remove a field, re-running effects that read it or listed the keys.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let old = self.inner.target.remove(key)?;

        let entity = self.entity_id();
        Runtime::notify(entity, &DepKey::field(key));
        Runtime::notify(entity, &DepKey::Keys);

        Some(old)
    }

    /// Read a nested record as a proxy, subscribing to the field.
    ///
    /// Returns `None` if the field is missing or not a record.
    pub fn child(&self, key: &str) -> Option<Reactive<Record>> {
        self.get(key)?.as_record().map(wrap)
    }
}

impl<T: Target> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Target + fmt::Debug> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .finish()
    }
}

#[cfg(test)]
fn cached_proxies() -> usize {
    PROXIES.with(|proxies| proxies.borrow().len())
}
