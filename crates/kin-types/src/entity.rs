use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::group::EntityGroupId;
use crate::key::Key;
use crate::value::Value;

/// A stored record: a key plus an ordered property map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    key: Key,
    properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn kind(&self) -> &str {
        self.key.kind()
    }

    pub fn group(&self) -> EntityGroupId {
        self.key.group()
    }

    /// Returns `None` when the property is absent. A present null is
    /// `Some(&Value::Null)`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Builder-style [`Entity::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }
}
