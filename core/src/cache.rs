// kubeforge/src/cache.rs

//! Key/value stores used to pass facts between tasks and between hosts.
//!
//! A [`Cache`] is a cheap, cloneable handle to one shared store. The engine keeps three
//! independent scopes: one per host, one per module run and one per pipeline run.
//! Values are stored type-erased; reads name the expected type and fail closed
//! (`None`) on a mismatch instead of panicking. [`CacheKey`] pins the value type of a
//! key at compile time so that producers and consumers cannot disagree.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

/// Shared, internally synchronized key/value store.
///
/// Lock guards never escape this type, so it is safe to use from async code.
#[derive(Clone, Default)]
pub struct Cache(Arc<RwLock<HashMap<String, Value>>>);

impl Cache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores `value` under `key`, replacing any previous value regardless of its type.
  pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
    self.0.write().insert(key.into(), Arc::new(value));
  }

  /// Returns the raw, type-erased value.
  pub fn get(&self, key: &str) -> Option<Value> {
    self.0.read().get(key).cloned()
  }

  /// Returns a clone of the value if it exists and has type `T`.
  pub fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
    let guard = self.0.read();
    guard.get(key).and_then(|v| v.downcast_ref::<T>()).cloned()
  }

  pub fn get_must_string(&self, key: &str) -> Option<String> {
    self.get_as::<String>(key)
  }

  pub fn get_must_bool(&self, key: &str) -> Option<bool> {
    self.get_as::<bool>(key)
  }

  pub fn get_must_int(&self, key: &str) -> Option<i64> {
    self.get_as::<i64>(key)
  }

  /// Returns the current value of type `T`, or stores and returns `default`.
  ///
  /// If the key holds a value of another type it is left untouched and `default`
  /// is returned without being stored.
  pub fn get_or_set<T: Any + Send + Sync + Clone>(&self, key: &str, default: T) -> T {
    let mut guard = self.0.write();
    match guard.get(key) {
      Some(existing) => existing.downcast_ref::<T>().cloned().unwrap_or(default),
      None => {
        guard.insert(key.to_string(), Arc::new(default.clone()));
        default
      }
    }
  }

  pub fn delete(&self, key: &str) {
    self.0.write().remove(key);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.read().contains_key(key)
  }

  pub fn keys(&self) -> Vec<String> {
    self.0.read().keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.0.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.read().is_empty()
  }

  /// Drops every entry.
  pub fn clean(&self) {
    self.0.write().clear();
  }

  /// Typed read through a [`CacheKey`].
  pub fn get_typed<T: Any + Send + Sync + Clone>(&self, key: &CacheKey<T>) -> Option<T> {
    self.get_as::<T>(key.name)
  }

  /// Typed write through a [`CacheKey`].
  pub fn set_typed<T: Any + Send + Sync>(&self, key: &CacheKey<T>, value: T) {
    self.set(key.name, value);
  }

  /// True when both handles point at the same store.
  pub fn ptr_eq(&self, other: &Cache) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl fmt::Debug for Cache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut keys = self.keys();
    keys.sort();
    f.debug_struct("Cache").field("keys", &keys).finish()
  }
}

/// A cache key bound to the type of value stored under it.
///
/// ```
/// use kubeforge::{Cache, CacheKey};
///
/// const OS_FAMILY: CacheKey<String> = CacheKey::new("osFamily");
///
/// let cache = Cache::new();
/// cache.set_typed(&OS_FAMILY, "debian".to_string());
/// assert_eq!(cache.get_typed(&OS_FAMILY).as_deref(), Some("debian"));
/// ```
pub struct CacheKey<T> {
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> CacheKey<T> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      _marker: PhantomData,
    }
  }

  pub const fn name(&self) -> &'static str {
    self.name
  }
}

impl<T> Clone for CacheKey<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for CacheKey<T> {}

impl<T> fmt::Debug for CacheKey<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheKey")
      .field("name", &self.name)
      .field("type", &std::any::type_name::<T>())
      .finish()
  }
}
