//! Backend catalog: which hosted models exist and where their configuration lives.
//!
//! A catalog only names environment variables; values are looked up once by
//! [`CatalogConfig::resolve`] and frozen into [`EndpointConfig`]s for the process lifetime.
//! Missing values are not a load-time error: the affected backend still shows up and every
//! call to it fails with a configuration error.

use crate::error::CatalogError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Name of the local CSV conversion tool; backends may not reuse it.
pub const LOCAL_CSV_TOOL: &str = "convert_csv_to_json";

pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_API_KEY_ENV: &str = "DATASAUR_API_KEY";

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.yaml");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub defaults: CatalogDefaults,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogDefaults {
    /// Key variable shared by every backend that does not name its own.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendConfig {
    /// Tool name exposed to MCP clients.
    pub tool: String,
    /// Human-readable name used in log lines and error messages. Defaults to `tool`.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub url_env: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub kind: BackendKind,
}

/// What a backend tool takes as input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A free-form `prompt` string.
    #[default]
    Prompt,
    /// A `file_path` to a CSV file whose rows are forwarded as JSON.
    Csv,
}

/// The (URL, API key) pair for one backend, plus what is needed to report on it.
#[derive(Clone)]
pub struct EndpointConfig {
    pub label: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Variable the URL was read from (only used to say what is missing).
    pub url_var: String,
    /// Variable the key was read from (only used to say what is missing).
    pub api_key_var: String,
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Build a config from explicit values. Empty or whitespace-only values count as absent.
    #[must_use]
    pub fn new(label: impl Into<String>, url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            label: label.into(),
            url: non_empty(url),
            api_key: non_empty(api_key),
            url_var: "base URL".to_string(),
            api_key_var: "API key".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_var_names(
        mut self,
        url_var: impl Into<String>,
        api_key_var: impl Into<String>,
    ) -> Self {
        self.url_var = url_var.into();
        self.api_key_var = api_key_var.into();
        self
    }

    /// Names of the values that are not configured, in (URL, key) order.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.url.is_none() {
            out.push(self.url_var.clone());
        }
        if self.api_key.is_none() {
            out.push(self.api_key_var.clone());
        }
        out
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("label", &self.label)
            .field("url", &self.url.as_deref().map(crate::safety::redact_url_str))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("url_var", &self.url_var)
            .field("api_key_var", &self.api_key_var)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A catalog entry with its configuration looked up.
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    pub tool: String,
    pub description: String,
    pub kind: BackendKind,
    pub endpoint: EndpointConfig,
}

impl CatalogConfig {
    /// The catalog compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded catalog is itself invalid.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the catalog fails [`Self::validate`].
    pub fn from_yaml_str(s: &str) -> Result<Self, CatalogError> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is not a valid catalog.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check tool names, variable names and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.defaults.api_key_env.trim().is_empty() {
            return Err(CatalogError::Invalid(
                "defaults.apiKeyEnv must not be empty".to_string(),
            ));
        }
        if self.defaults.timeout_secs == 0 {
            return Err(CatalogError::Invalid(
                "defaults.timeoutSecs must be greater than zero".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for b in &self.backends {
            validate_tool_name(&b.tool)?;
            if b.tool == LOCAL_CSV_TOOL {
                return Err(CatalogError::Invalid(format!(
                    "tool name '{LOCAL_CSV_TOOL}' is reserved for local CSV conversion"
                )));
            }
            if !seen.insert(b.tool.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate tool name '{}'",
                    b.tool
                )));
            }
            if b.url_env.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "backend '{}': urlEnv must not be empty",
                    b.tool
                )));
            }
            if b.api_key_env.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(CatalogError::Invalid(format!(
                    "backend '{}': apiKeyEnv must not be empty when set",
                    b.tool
                )));
            }
            if b.timeout_secs == Some(0) {
                return Err(CatalogError::Invalid(format!(
                    "backend '{}': timeoutSecs must be greater than zero",
                    b.tool
                )));
            }
        }
        Ok(())
    }

    /// Look up every backend's URL and key through `lookup`.
    ///
    /// `lookup` is the process environment in production (`|k| std::env::var(k).ok()`).
    #[must_use]
    pub fn resolve<F>(&self, lookup: F) -> Vec<ResolvedBackend>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.backends
            .iter()
            .map(|b| {
                let label = b.label.clone().unwrap_or_else(|| b.tool.clone());
                let api_key_var = b
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| self.defaults.api_key_env.clone());
                let timeout =
                    Duration::from_secs(b.timeout_secs.unwrap_or(self.defaults.timeout_secs));
                let description = b
                    .description
                    .clone()
                    .unwrap_or_else(|| default_description(&label, b.kind));

                let endpoint = EndpointConfig::new(
                    label,
                    lookup(&b.url_env),
                    lookup(&api_key_var),
                )
                .with_var_names(b.url_env.clone(), api_key_var)
                .with_timeout(timeout);

                ResolvedBackend {
                    tool: b.tool.clone(),
                    description,
                    kind: b.kind,
                    endpoint,
                }
            })
            .collect()
    }
}

fn validate_tool_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() {
        return Err(CatalogError::Invalid("tool name must not be empty".to_string()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(CatalogError::Invalid(format!(
            "tool name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

fn default_description(label: &str, kind: BackendKind) -> String {
    match kind {
        BackendKind::Prompt => {
            format!("Sends a prompt to the {label} model and returns the model's response.")
        }
        BackendKind::Csv => format!(
            "Reads a CSV file, converts it to JSON and sends it to the {label} API. \
             Provide the full path to the CSV file."
        ),
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
