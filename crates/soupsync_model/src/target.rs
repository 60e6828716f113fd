//! Sync-down target descriptors.
//!
//! A target describes *what* to fetch and *how to page through it*. The
//! descriptor is pure data so it can be persisted with its sync state and
//! reconstructed later; fetch execution lives in the engine.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag identifying the fetch path of a [`SyncDownTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    /// Most-recently-used records for an object type.
    Mru,
    /// Structured query.
    Soql,
    /// Full-text search.
    Sosl,
    /// Runtime-registered target.
    Custom,
}

impl QueryType {
    /// Returns the serialized tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Mru => "mru",
            QueryType::Soql => "soql",
            QueryType::Sosl => "sosl",
            QueryType::Custom => "custom",
        }
    }
}

/// Descriptor of what a sync-down fetches.
///
/// Serialized with a `queryType` tag so a target can be reconstructed from
/// the persisted sync state. Custom targets carry a registration tag and
/// an opaque parameter object; the engine resolves the tag through a
/// registered-factory map and fails fast when nobody registered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "queryType", rename_all = "camelCase")]
pub enum SyncDownTarget {
    /// Fetch the most-recently-used records of one object type.
    Mru {
        /// Server object type to fetch.
        #[serde(rename = "sobjectType")]
        object_type: String,
        /// Fields to select for each record.
        #[serde(rename = "fieldlist")]
        field_list: Vec<String>,
    },
    /// Execute a structured query, following server pagination.
    Soql {
        /// The query text.
        query: String,
    },
    /// Execute a full-text search (single page).
    Sosl {
        /// The search text.
        query: String,
    },
    /// A target resolved at runtime through the factory registry.
    Custom {
        /// Registration tag.
        tag: String,
        /// Opaque parameters handed to the factory.
        #[serde(default)]
        params: Value,
    },
}

impl SyncDownTarget {
    /// Creates an MRU target.
    pub fn mru(
        object_type: impl Into<String>,
        field_list: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Mru {
            object_type: object_type.into(),
            field_list: field_list.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a SOQL target.
    pub fn soql(query: impl Into<String>) -> Self {
        Self::Soql {
            query: query.into(),
        }
    }

    /// Creates a SOSL target.
    pub fn sosl(query: impl Into<String>) -> Self {
        Self::Sosl {
            query: query.into(),
        }
    }

    /// Creates a custom target.
    pub fn custom(tag: impl Into<String>, params: Value) -> Self {
        Self::Custom {
            tag: tag.into(),
            params,
        }
    }

    /// Returns the target's query type.
    pub fn query_type(&self) -> QueryType {
        match self {
            SyncDownTarget::Mru { .. } => QueryType::Mru,
            SyncDownTarget::Soql { .. } => QueryType::Soql,
            SyncDownTarget::Sosl { .. } => QueryType::Sosl,
            SyncDownTarget::Custom { .. } => QueryType::Custom,
        }
    }

    /// Serializes the target to its persisted JSON form.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reconstructs a target from its persisted JSON form.
    pub fn from_json(value: &Value) -> ModelResult<Self> {
        serde_json::from_value(value.clone()).map_err(ModelError::target)
    }
}
