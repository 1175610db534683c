use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;

pub const DEFAULT_TABLE: &str = "diary_entries";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which store the diary talks to, and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Embedded { db_path: PathBuf },
    Remote(RemoteConfig),
}

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// `{base_url}/rest/v1/{table}`
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("GLYCOLOG_BACKEND").as_deref() {
            None | Some("sqlite") => BackendConfig::Embedded {
                db_path: match var("GLYCOLOG_DB_PATH") {
                    Some(path) => prepare_db_path(PathBuf::from(path))?,
                    None => default_db_path()?,
                },
            },
            Some("supabase") => {
                let base_url = var("SUPABASE_URL")
                    .context("SUPABASE_URL must be set when GLYCOLOG_BACKEND=supabase")?;
                let api_key = var("SUPABASE_API_KEY")
                    .context("SUPABASE_API_KEY must be set when GLYCOLOG_BACKEND=supabase")?;
                let mut remote = RemoteConfig::new(base_url, api_key);
                if let Some(table) = var("SUPABASE_TABLE") {
                    remote.table = table;
                }
                BackendConfig::Remote(remote)
            }
            Some(other) => bail!("Unknown GLYCOLOG_BACKEND '{other}' (expected 'sqlite' or 'supabase')"),
        };

        Ok(Config { backend })
    }

    pub fn embedded(db_path: impl Into<PathBuf>) -> Self {
        Config {
            backend: BackendConfig::Embedded {
                db_path: db_path.into(),
            },
        }
    }

    pub fn remote(remote: RemoteConfig) -> Self {
        Config {
            backend: BackendConfig::Remote(remote),
        }
    }
}

fn default_db_path() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", "glycolog").context("Could not determine home directory")?;
    prepare_db_path(proj_dirs.data_dir().join("diary.sqlite"))
}

fn prepare_db_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    }
    Ok(path)
}
