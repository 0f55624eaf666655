//! Instance registry — visible key instances and the strip each one controls.
//!
//! One mutex guards the whole map. Both the host event thread and the poll
//! thread go through it, and a traversal holds it from start to finish, so a
//! refresh pass never sees an instance removed halfway through.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Host-assigned identifier of one key instance (the host's "context").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        InstanceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        InstanceId(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        InstanceId(s)
    }
}

impl Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Per-instance configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceConfig {
    /// Mixer strip the key shows and toggles.
    pub strip: u32,
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Mutex<HashMap<InstanceId, InstanceConfig>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceId, InstanceConfig>> {
        self.instances.lock().unwrap_or_else(|e| {
            log::warn!("instance registry lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Insert or overwrite an instance. Returns the previous config, if any.
    pub fn upsert(&self, id: InstanceId, strip: u32) -> Option<InstanceConfig> {
        self.lock().insert(id, InstanceConfig { strip })
    }

    /// Change the strip of an instance that is already present.
    ///
    /// Returns `false` (and inserts nothing) if the instance is unknown, so a
    /// late settings write cannot resurrect an instance that has disappeared.
    pub fn update(&self, id: &str, strip: u32) -> bool {
        match self.lock().get_mut(id) {
            Some(config) => {
                config.strip = strip;
                true
            }
            None => false,
        }
    }

    /// Forget an instance. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<InstanceConfig> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<InstanceConfig> {
        self.lock().get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Visit every instance with the lock held for the whole traversal.
    ///
    /// The visitor must not call back into the registry: the lock is not
    /// reentrant and doing so deadlocks.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&InstanceId, &InstanceConfig),
    {
        for (id, config) in self.lock().iter() {
            visitor(id, config);
        }
    }

    /// Copy of all entries, sorted by id.
    pub fn snapshot(&self) -> Vec<(InstanceId, InstanceConfig)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, config)| (id.clone(), *config))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
