use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stash_store::policy::STANDARD_TYPES;
use stash_store::{DiskObjectStore, KeyPolicy, UploadPolicy, DEFAULT_MAX_SIZE};

use crate::error::{ServerError, ServerResult};

/// Service configuration. Fields missing from a config file take their
/// default values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub storage_root: PathBuf,
    pub key_policy: KeyPolicy,
    pub max_size: u64,
    pub allowed_types: Vec<String>,
    pub sniff_content: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            storage_root: PathBuf::from("./uploads"),
            key_policy: KeyPolicy::default(),
            max_size: DEFAULT_MAX_SIZE,
            allowed_types: STANDARD_TYPES.iter().map(|t| t.to_string()).collect(),
            sniff_content: true,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> ServerResult<Self> {
        toml::from_str(input).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    /// The upload policy described by this config.
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_size, &self.allowed_types).with_sniffing(self.sniff_content)
    }

    /// Open the disk store at `storage_root` with the configured key policy.
    pub fn open_store(&self) -> ServerResult<DiskObjectStore> {
        Ok(DiskObjectStore::open(&self.storage_root, self.key_policy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_size, 5 * 1024 * 1024);
        assert_eq!(c.key_policy, KeyPolicy::Timestamped);
        assert!(c.allowed_types.iter().any(|t| t == "video/webm"));
        assert!(c.sniff_content);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:8080"
            key_policy = "original-name"
            allowed_types = ["image/png", "text/plain"]
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert_eq!(c.key_policy, KeyPolicy::OriginalName);
        assert_eq!(c.max_size, DEFAULT_MAX_SIZE);

        let policy = c.policy();
        assert!(policy.check(10, "text/plain").is_ok());
        assert!(policy.check(10, "video/mp4").is_err());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ServerConfig::from_toml_str("key_policy = \"sometimes\"").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stash.toml");
        std::fs::write(&path, "max_size = 1024\nsniff_content = false\n").unwrap();
        let c = ServerConfig::load(&path).unwrap();
        assert_eq!(c.max_size, 1024);
        assert!(!c.policy().sniff_content);
        assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let c = ServerConfig::default();
        let text = toml::to_string(&c).unwrap();
        assert_eq!(ServerConfig::from_toml_str(&text).unwrap(), c);
    }
}
