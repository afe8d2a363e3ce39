use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory under the project root holding the generated configuration.
pub const TOOL_DIR_NAME: &str = "edgekit";
pub const CONFIG_FILE_NAME: &str = "edgekit-config.json";

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file not found at {0}")]
    NotFound(PathBuf),

    #[error("configuration file matches neither the repository nor the bucket shape: {0}")]
    Invalid(serde_json::Error),

    #[error("read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// The persisted hosting configuration, the single source of truth for a
/// deployment. Regenerated wholesale by `init`; read-only everywhere else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostingConfig {
    #[serde(flatten)]
    pub source: Source,

    #[serde(rename = "domainName", skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,

    #[serde(rename = "hostedZoneId", skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
}

/// Where the site content comes from. The on-disk JSON is untagged; the
/// repository shape wins when a file happens to satisfy both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Source {
    Repository {
        #[serde(rename = "repoUrl")]
        repo_url: String,
        #[serde(rename = "branchName")]
        branch_name: String,
        framework: String,
    },
    Bucket {
        #[serde(rename = "s3bucket")]
        bucket: String,
        #[serde(rename = "s3path")]
        path_prefix: String,
    },
}

impl HostingConfig {
    pub fn is_repository(&self) -> bool {
        matches!(self.source, Source::Repository { .. })
    }

    /// Human-readable origin used in the `show` and `deploy` summaries.
    pub fn origin_label(&self) -> String {
        match &self.source {
            Source::Repository {
                repo_url,
                branch_name,
                ..
            } => format!("{repo_url}/{branch_name}"),
            Source::Bucket {
                bucket,
                path_prefix,
            } => format!("{bucket}/{path_prefix}"),
        }
    }
}

pub fn tool_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(TOOL_DIR_NAME)
}

pub fn config_file_path(project_dir: &Path) -> PathBuf {
    tool_dir(project_dir).join(CONFIG_FILE_NAME)
}

pub fn exists(project_dir: &Path) -> bool {
    config_file_path(project_dir).is_file()
}

pub fn load(project_dir: &Path) -> Result<HostingConfig, Error> {
    let path = config_file_path(project_dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path))
        }
        Err(err) => return Err(err.into()),
    };
    debug!("loaded hosting configuration from {}", path.display());
    serde_json::from_str(&raw).map_err(Error::Invalid)
}

/// Serialize and overwrite the configuration file. There are no merge
/// semantics; the wizard always writes a complete record.
pub fn save(project_dir: &Path, config: &HostingConfig) -> Result<(), Error> {
    let dir = tool_dir(project_dir);
    std::fs::create_dir_all(&dir)?;
    let path = config_file_path(project_dir);
    let json = serde_json::to_string_pretty(config).map_err(Error::Invalid)?;
    std::fs::write(&path, json)?;
    debug!("wrote hosting configuration to {}", path.display());
    Ok(())
}
