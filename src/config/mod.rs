//! Engine configuration
//!
//! The settings store itself lives in the embedding application; this module
//! only defines the fields the engine layer reads and the capability trait
//! used to fetch them at request time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings consumed by a provider adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// API key used as the bearer credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom API endpoint (adapter default applies when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Selected model identifier (adapter default applies when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

/// Source of [`Settings`], implemented by the embedding application
///
/// Adapters re-read settings on every send so that key or endpoint changes
/// take effect without rebuilding the adapter.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings(&self) -> Result<Settings>;
}

/// Fixed in-memory settings, for embedders with static configuration and for
/// tests
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn settings(&self) -> Result<Settings> {
        Ok(self.0.clone())
    }
}
