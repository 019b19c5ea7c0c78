//! Configuration loader and validator for the storefront and back-office.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub backend: BackendConfig,
    pub admin: Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted REST service.
    Rest,
    /// Local SQLite file under `app.data_dir`.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub backend: BackendKind,
    pub data_dir: String,
    /// Row cap for storefront listings; `None` lists everything.
    #[serde(default)]
    pub listing_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub storage_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub email: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite location, overridable through `DATABASE_URL`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/labmart.db", self.app.data_dir))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `labmart.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("labmart.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.listing_limit == Some(0) {
        return Err(ConfigError::Invalid("app.listing_limit must be > 0 when set"));
    }
    if cfg.admin.email.trim().is_empty() || !cfg.admin.email.contains('@') {
        return Err(ConfigError::Invalid("admin.email must be an email address"));
    }

    // The hosted service settings only matter when it is the selected backend.
    if cfg.app.backend == BackendKind::Rest {
        let url = cfg.backend.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid("backend.url must be an http(s) URL"));
        }
        if cfg.backend.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.anon_key must be non-empty"));
        }
        if cfg.backend.storage_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.storage_bucket must be non-empty"));
        }
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"app:
  backend: "rest"
  data_dir: "./data"
  listing_limit: 48

backend:
  url: "https://YOUR_PROJECT.supabase.co"
  anon_key: "YOUR_ANON_KEY"
  storage_bucket: "product-images"

admin:
  email: "admin@labmart.example"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.backend, BackendKind::Rest);
        assert_eq!(cfg.app.listing_limit, Some(48));
    }

    #[test]
    fn invalid_backend_url() {
        let mut cfg = example_cfg();
        cfg.backend.url = "ftp://nope".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("backend.url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn sqlite_backend_ignores_rest_settings() {
        let mut cfg = example_cfg();
        cfg.app.backend = BackendKind::Sqlite;
        cfg.backend.anon_key = "".into();
        cfg.backend.url = "".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_admin_and_limit() {
        let mut cfg = example_cfg();
        cfg.admin.email = "admin".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.app.listing_limit = Some(0);
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.backend.storage_bucket = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("labmart.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.admin.email, "admin@labmart.example");
    }
}
