//! Free-form engine parameters.
//!
//! Parameters are the named tuning values the replication engine shares with
//! the purge engine (retention windows, batch sizes, feature switches). They
//! are kept as raw TOML values here and interpreted by
//! [`crate::parameters::ConfigParameterService`], so a malformed value only
//! fails the purge category that reads it.
//!
//! ```toml
//! [parameters]
//! "purge.retention.data.minutes" = 7200
//! "purge.maxRowsPerBatch" = "${PURGE_BATCH_SIZE}"
//! "purge.stranded.enabled" = true
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParametersConfig {
    values: BTreeMap<String, toml::Value>,
}

impl ParametersConfig {
    pub fn get(&self, name: &str) -> Option<&toml::Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<toml::Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<toml::Value>> FromIterator<(K, V)> for ParametersConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
