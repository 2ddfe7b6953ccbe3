//! Request and response payloads for each action.
//!
//! Field names are PascalCase on the wire. Missing request fields decode to
//! empty values, and every response starts out successful with its maps
//! initialised, so handlers can fill them in without checks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Free-form config from the host's `cdflow.yaml`.
pub type ConfigMap = HashMap<String, Value>;

/// Environment variables passed through from the host.
pub type EnvMap = HashMap<String, String>;

/// Free-form requirements of each release, keyed by release name.
pub type ReleaseRequirements = HashMap<String, HashMap<String, Value>>;

/// Environment variable names each release needs, keyed by release name.
pub type ReleaseRequiredEnv = HashMap<String, Vec<String>>;

/// Requirement key listing the environment variables a release needs.
pub const REQUIRED_ENV_KEY: &str = "env";

/// Fill in `required_env` for releases that list names under
/// [`REQUIRED_ENV_KEY`] but have no explicit entry.
fn merge_required_env(requirements: &ReleaseRequirements, required_env: &mut ReleaseRequiredEnv) {
    for (release, requirement) in requirements {
        if required_env.contains_key(release) {
            continue;
        }
        let Some(Value::Array(names)) = requirement.get(REQUIRED_ENV_KEY) else {
            continue;
        };
        let names = names
            .iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect();
        required_env.insert(release.clone(), names);
    }
}

// =============================================================================
// setup
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SetupRequest {
    pub config: ConfigMap,
    pub env: EnvMap,
    pub release_requirements: ReleaseRequirements,
    pub release_required_env: ReleaseRequiredEnv,
    pub component: String,
    pub commit: String,
    pub team: String,
}

impl SetupRequest {
    /// Populate `release_required_env` from the `env` requirement of each
    /// release. Explicit entries win.
    pub fn resolve_required_env(&mut self) {
        merge_required_env(&self.release_requirements, &mut self.release_required_env);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetupResponse {
    pub success: bool,
}

impl Default for SetupResponse {
    fn default() -> Self {
        Self { success: true }
    }
}

// =============================================================================
// configure_release
// =============================================================================

/// Also the session payload: kept until the following `upload_release`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConfigureReleaseRequest {
    pub version: String,
    pub component: String,
    pub commit: String,
    pub team: String,
    pub config: ConfigMap,
    pub env: EnvMap,
    pub release_requirements: ReleaseRequirements,
    pub release_required_env: ReleaseRequiredEnv,
}

impl ConfigureReleaseRequest {
    /// See [`SetupRequest::resolve_required_env`].
    pub fn resolve_required_env(&mut self) {
        merge_required_env(&self.release_requirements, &mut self.release_required_env);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigureReleaseResponse {
    pub env: EnvMap,
    pub success: bool,
}

impl Default for ConfigureReleaseResponse {
    fn default() -> Self {
        Self {
            env: EnvMap::new(),
            success: true,
        }
    }
}

// =============================================================================
// upload_release
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UploadReleaseRequest {
    pub terraform_image: String,
    pub release_metadata: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadReleaseResponse {
    pub message: String,
    pub success: bool,
}

impl Default for UploadReleaseResponse {
    fn default() -> Self {
        Self {
            message: String::new(),
            success: true,
        }
    }
}

// =============================================================================
// prepare_terraform
// =============================================================================

/// Self-contained: runs in a different process from configure/upload, so it
/// carries its own component and version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PrepareTerraformRequest {
    pub version: String,
    pub env_name: String,
    pub component: String,
    pub commit: String,
    pub team: String,
    pub config: ConfigMap,
    pub env: EnvMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrepareTerraformResponse {
    pub terraform_image: String,
    pub env: EnvMap,
    pub terraform_backend_type: String,
    pub terraform_backend_config: HashMap<String, String>,
    pub success: bool,
}

impl Default for PrepareTerraformResponse {
    fn default() -> Self {
        Self {
            terraform_image: String::new(),
            env: EnvMap::new(),
            terraform_backend_type: String::new(),
            terraform_backend_config: HashMap::new(),
            success: true,
        }
    }
}
