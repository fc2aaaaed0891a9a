use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key/value state scoped to one session.
///
/// Values are opaque JSON; the store enforces no schema. Last write wins,
/// there is no versioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    entries: HashMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn merge(&mut self, changes: HashMap<String, Value>) {
        self.entries.extend(changes);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, Value>> for State {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }
}

/// Cloneable handle to a session's state store.
///
/// Agents and capabilities running within a session all hold clones of the
/// same handle and mutate the state in place. `merge` applies the whole
/// partial mapping under one write lock, so merges never interleave.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<State>>,
}

impl StateHandle {
    pub fn new(initial: State) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.set(key, value);
    }

    pub async fn merge(&self, changes: HashMap<String, Value>) {
        self.inner.write().await.merge(changes);
    }

    /// Point-in-time copy of the whole store, used as oracle input.
    pub async fn snapshot(&self) -> State {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins() {
        let mut state = State::new();
        state.set("color", json!("red"));
        state.set("color", json!("blue"));
        assert_eq!(state.get("color"), Some(&json!("blue")));
    }

    #[test]
    fn merge_extends_and_overwrites() {
        let mut state = State::new();
        state.set("a", json!(1));
        state.merge(HashMap::from([
            ("a".to_string(), json!(2)),
            ("b".to_string(), json!(3)),
        ]));
        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn concurrent_merges_apply_all_keys() {
        let handle = StateHandle::new(State::new());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .merge(HashMap::from([(format!("key_{i}"), json!(i))]))
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.len(), 8);
        for i in 0..8 {
            assert_eq!(snapshot.get(&format!("key_{i}")), Some(&json!(i)));
        }
    }

    #[tokio::test]
    async fn snapshot_is_detached() {
        let handle = StateHandle::new(State::new());
        handle.set("k", json!("v1")).await;
        let snapshot = handle.snapshot().await;
        handle.set("k", json!("v2")).await;
        assert_eq!(snapshot.get("k"), Some(&json!("v1")));
        assert_eq!(handle.get("k").await, Some(json!("v2")));
    }
}
