//! Exception-aware recursive snapshot merging
//!
//! Pure data transformation over JSON trees: no I/O and no catalog
//! knowledge. The orchestrator merges the loaded snapshot (old) with the
//! freshly built one (new) in update mode.
//!
//! Three key lists steer the merge:
//! - recurse exceptions: replaced wholesale, never merged recursively, and
//!   removed from the old tree when the new tree no longer carries them
//!   (stale dependency edges must not survive a re-query);
//! - prune exceptions: exempt from empty-map pruning (`database` itself
//!   stays even when transiently empty);
//! - purge keys: removed from the merged result unconditionally, used to
//!   retire deprecated fields.

use serde_json::{Map, Value};

/// Keys that steer [`merge_trees`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRules {
    pub recurse_exceptions: Vec<String>,
    pub prune_exceptions: Vec<String>,
    pub purge_keys: Vec<String>,
}

impl Default for MergeRules {
    fn default() -> Self {
        Self {
            recurse_exceptions: vec!["dependencies".to_string()],
            prune_exceptions: vec!["database".to_string()],
            purge_keys: Vec::new(),
        }
    }
}

impl MergeRules {
    fn is_recurse_exception(&self, key: &str) -> bool {
        self.recurse_exceptions.iter().any(|k| k == key)
    }

    fn is_prune_exception(&self, key: &str) -> bool {
        self.prune_exceptions.iter().any(|k| k == key)
    }
}

/// Merge `new` into `old`, mutating `old` as the base
///
/// Applied recursively from the top-level map down:
/// 1. recurse-exception keys present in `old` but absent from `new` are
///    deleted from `old`;
/// 2. per `new` key: recurse exceptions are copied wholesale; two maps are
///    merged recursively; anything else overwrites the old value;
/// 3. keys whose merged value is an empty map are pruned unless listed as
///    a prune exception;
/// 4. purge keys are deleted regardless of origin.
///
/// A leaf field unique to `old` survives unless rule 1, 3 or 4 removes it,
/// so fields this engine does not understand pass through untouched.
pub fn merge_trees(old: &mut Map<String, Value>, new: Map<String, Value>, rules: &MergeRules) {
    let stale: Vec<String> = old
        .keys()
        .filter(|key| rules.is_recurse_exception(key) && !new.contains_key(*key))
        .cloned()
        .collect();
    for key in stale {
        old.remove(&key);
    }

    for (key, new_value) in new {
        if rules.is_recurse_exception(&key) {
            old.insert(key, new_value);
            continue;
        }

        if let Value::Object(new_child) = new_value {
            match old.get_mut(&key) {
                Some(Value::Object(old_child)) => merge_trees(old_child, new_child, rules),
                _ => {
                    old.insert(key, Value::Object(new_child));
                }
            }
        } else {
            old.insert(key, new_value);
        }
    }

    let empty: Vec<String> = old
        .iter()
        .filter(|(key, value)| {
            !rules.is_prune_exception(key)
                && value.as_object().is_some_and(|map| map.is_empty())
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in empty {
        old.remove(&key);
    }

    for key in &rules.purge_keys {
        old.remove(key);
    }
}
