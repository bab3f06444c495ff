use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::FieldError;

mod shape;

/// Serializes `value` on its own, returning `None` if it can't be represented or is null.
pub(crate) fn validate<T>(value: &T) -> Option<Value>
where
    T: ?Sized + Serialize,
{
    match serde_json::to_value(value) {
        Ok(Value::Null) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

/// A thread-safe bag of fields, shared by builders and events.
///
/// Keys are unique and a later insert overwrites an earlier one. Values are stored in their serialized form, so
/// anything that was accepted is guaranteed to be sendable. Values that are null (`None`, `()`) or that fail to
/// serialize are dropped silently.
#[derive(Debug, Default)]
pub struct FieldStore {
    data: Mutex<HashMap<String, Value>>,
}

impl FieldStore {
    /// Creates an empty `FieldStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single field, overwriting any existing field with the same key.
    ///
    /// The value is dropped without error if it is null or cannot be serialized.
    pub fn add_field<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Serialize,
    {
        self.insert(key.into(), validate(&value));
    }

    /// Adds every member of a struct, or every entry of a map, as an individual field.
    ///
    /// Struct members honor `#[serde(skip)]` and `#[serde(rename = "...")]`. Map keys must be strings or numbers.
    /// References, `Some` and newtype wrappers around either shape are unwrapped. Individual members that are null or
    /// cannot be serialized are dropped like they would be with [`add_field`][Self::add_field].
    ///
    /// # Errors
    ///
    /// If `data` is not a struct or a map, or if a map key is not a string or a number, an error naming the offending
    /// kind is returned and no fields are added.
    pub fn add<T>(&self, data: &T) -> Result<(), FieldError>
    where
        T: ?Sized + Serialize,
    {
        let fields = shape::extract(data)?.into_fields();

        let mut store = self.data.lock();
        store.extend(fields);
        Ok(())
    }

    /// Repeatedly calls `generator`, adding each returned key/value pair as a field until it returns `None`.
    pub fn add_func<F, K, V>(&self, mut generator: F)
    where
        F: FnMut() -> Option<(K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        while let Some((key, value)) = generator() {
            self.add_field(key, value);
        }
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Returns `true` if a field is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns `true` if no fields have been added.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns a point-in-time copy of all fields.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.lock().clone()
    }

    pub(crate) fn insert(&self, key: String, value: Option<Value>) {
        if let Some(value) = value {
            self.data.lock().insert(key, value);
        }
    }

    pub(crate) fn into_inner(self) -> HashMap<String, Value> {
        self.data.into_inner()
    }
}

impl Clone for FieldStore {
    fn clone(&self) -> Self {
        FieldStore { data: Mutex::new(self.snapshot()) }
    }
}
