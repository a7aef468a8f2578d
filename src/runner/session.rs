//! Session scratch storage
//!
//! Rule templates can stash values here to hand data from one command to a
//! later one. A session lives for exactly one pipeline run.

use crate::template::Value;
use std::collections::BTreeMap;

/// Key/value store shared by every template evaluation of a run
#[derive(Debug, Default)]
pub struct Session {
    entries: BTreeMap<String, Value>,
}

impl Session {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check if a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let mut session = Session::new();
        assert!(session.put("count", Value::Int(1)).is_none());
        assert_eq!(session.put("count", Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(session.get("count"), Some(&Value::Int(2)));
        assert!(session.contains("count"));
        assert_eq!(session.remove("count"), Some(Value::Int(2)));
        assert!(session.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut session = Session::new();
        session.put("a", "x".into());
        session.put("b", "y".into());
        assert_eq!(session.len(), 2);
        session.clear();
        assert!(session.is_empty());
    }
}
