//! Configuration loading
//!
//! `~/.helmsman/config.toml` (missing file means defaults), then environment
//! overrides. Command-line flags are applied on top by the binary.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{OrchestratorConfig, UnmatchedReplyPolicy};
use crate::ai::HttpOracleConfig;
use crate::constants;
use crate::paths;
use crate::plan::PlanningContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmsmanConfig {
    pub cluster: ClusterSection,
    pub oracle: OracleSection,
    pub agent: AgentSection,
}

/// `[cluster]`: the policy context handed to planning and dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub default_namespace: String,
    pub allowed_namespaces: Vec<String>,
    pub max_replicas: u32,
    /// Empty means any image is accepted
    pub allowed_image_prefixes: Vec<String>,
    pub default_image: String,
    /// Namespaces the in-memory cluster starts with
    pub seed_namespaces: Vec<String>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            default_namespace: constants::cluster::DEFAULT_NAMESPACE.to_string(),
            allowed_namespaces: Vec::new(),
            max_replicas: constants::cluster::DEFAULT_MAX_REPLICAS,
            allowed_image_prefixes: Vec::new(),
            default_image: constants::cluster::DEFAULT_IMAGE.to_string(),
            seed_namespaces: vec![constants::cluster::DEFAULT_NAMESPACE.to_string()],
        }
    }
}

/// `[oracle]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Never call a model; every turn is planned by the keyword fallback
    pub offline: bool,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: constants::ai::DEFAULT_BASE_URL.to_string(),
            model: constants::ai::DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: constants::ai::DEFAULT_TEMPERATURE,
            max_tokens: constants::ai::MAX_OUTPUT_TOKENS,
            offline: false,
        }
    }
}

/// `[agent]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub unmatched_reply: UnmatchedReplyPolicy,
    pub read_only: bool,
    pub max_iterations: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            unmatched_reply: UnmatchedReplyPolicy::default(),
            read_only: false,
            max_iterations: constants::agent::MAX_ITERATIONS,
        }
    }
}

impl HelmsmanConfig {
    /// Load `~/.helmsman/config.toml` and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_file())?;
        config.apply_env();
        Ok(config)
    }

    /// Load a config file without environment overrides. A missing file
    /// yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(model) = get("HELMSMAN_MODEL") {
            self.oracle.model = model;
        }
        if let Some(url) = get("HELMSMAN_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Some(key) = get("HELMSMAN_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.oracle.api_key = Some(key);
        }
        if let Some(namespace) = get("HELMSMAN_DEFAULT_NAMESPACE") {
            self.cluster.default_namespace = namespace.trim().to_string();
        }
        if let Some(list) = get("HELMSMAN_ALLOWED_NAMESPACES") {
            self.cluster.allowed_namespaces = split_list(&list);
        }
        if let Some(max) = get("HELMSMAN_MAX_REPLICAS") {
            match max.trim().parse() {
                Ok(max) => self.cluster.max_replicas = max,
                Err(_) => tracing::warn!(value = %max, "Ignoring invalid HELMSMAN_MAX_REPLICAS"),
            }
        }
        if let Some(list) = get("HELMSMAN_ALLOWED_IMAGE_PREFIXES") {
            self.cluster.allowed_image_prefixes = split_list(&list);
        }
    }

    /// Policy context; the default namespace is always allowed.
    pub fn planning_context(&self) -> PlanningContext {
        let mut allowed: BTreeSet<String> =
            self.cluster.allowed_namespaces.iter().cloned().collect();
        allowed.insert(self.cluster.default_namespace.clone());

        PlanningContext::default()
            .with_default_namespace(self.cluster.default_namespace.clone())
            .with_allowed_namespaces(allowed)
            .with_max_replicas(self.cluster.max_replicas)
            .with_allowed_image_prefixes(self.cluster.allowed_image_prefixes.clone())
            .with_default_image(self.cluster.default_image.clone())
    }

    pub fn http_oracle_config(&self) -> HttpOracleConfig {
        HttpOracleConfig {
            base_url: self.oracle.base_url.clone(),
            model: self.oracle.model.clone(),
            api_key: self.oracle.api_key.clone(),
            temperature: self.oracle.temperature,
            max_tokens: self.oracle.max_tokens,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations: self.agent.max_iterations.max(1),
            unmatched_reply: self.agent.unmatched_reply,
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
