//! Model-name remapping between the names clients ask for and the names the
//! backend serves.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Public model name -> backend model name, plus an optional catch-all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMap {
    #[serde(default)]
    pub map: HashMap<String, String>,
    /// Backend model used for names that have no explicit mapping.
    /// Without one, unknown names are forwarded unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// One entry of an OpenAI `/v1/models` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// The body of an OpenAI `/v1/models` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

impl ModelMap {
    /// Resolve the backend model for a requested name.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> String {
        if let Some(mapped) = self.map.get(requested) {
            return mapped.clone();
        }
        self.fallback
            .clone()
            .unwrap_or_else(|| requested.to_string())
    }

    /// The public names this gateway advertises, sorted.
    #[must_use]
    pub fn list(&self, owned_by: &str) -> ModelList {
        let created = chrono::Utc::now().timestamp();
        let mut names: Vec<&String> = self.map.keys().collect();
        names.sort();

        ModelList {
            object: "list".to_string(),
            data: names
                .into_iter()
                .map(|id| ModelEntry {
                    id: id.clone(),
                    object: "model".to_string(),
                    created,
                    owned_by: owned_by.to_string(),
                })
                .collect(),
        }
    }
}
