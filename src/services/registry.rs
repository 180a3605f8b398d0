//! Runtime catalog of executable actions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::domain::models::registry::ActionDefinition;
use crate::domain::ports::subject::Subject;
use crate::services::tools::general_tool_definitions;

/// Registry combining subject-native actions with the general tool
/// catalog shipped with the operator.
///
/// Definitions are cached after the first query; `refresh` drops the
/// cache if the subject's available actions may have changed.
pub struct ActionRegistry {
    subject: Arc<dyn Subject>,
    cache: RwLock<Option<BTreeMap<String, ActionDefinition>>>,
}

impl ActionRegistry {
    pub fn new(subject: Arc<dyn Subject>) -> Self {
        Self {
            subject,
            cache: RwLock::new(None),
        }
    }

    fn ensure_cache(&self) -> BTreeMap<String, ActionDefinition> {
        if let Some(cache) = self.cache.read().expect("registry lock poisoned").as_ref() {
            return cache.clone();
        }

        let mut map = BTreeMap::new();
        for def in self.subject.action_definitions() {
            map.insert(def.name.clone(), def);
        }
        for def in general_tool_definitions() {
            map.insert(def.name.clone(), def);
        }

        *self.cache.write().expect("registry lock poisoned") = Some(map.clone());
        map
    }

    /// All definitions: subject actions plus general tools.
    pub fn definitions(&self) -> Vec<ActionDefinition> {
        self.ensure_cache().into_values().collect()
    }

    /// Find a definition by name.
    pub fn get_definition(&self, action_name: &str) -> Option<ActionDefinition> {
        self.ensure_cache().get(action_name).cloned()
    }

    /// Just the action names, for prompt construction and error messages.
    pub fn list_names(&self) -> Vec<String> {
        self.ensure_cache().into_keys().collect()
    }

    /// Drop the cache so the next query re-reads the subject.
    pub fn refresh(&self) {
        *self.cache.write().expect("registry lock poisoned") = None;
    }
}
