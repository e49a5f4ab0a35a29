use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::Result;

pub const DEFAULT_API_URL: &str = "https://api.openstreetmap.org/api/0.6";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UserConfig {
    pub api_url: String,
    pub catalog_path: PathBuf,
    pub max_concurrent_lookups: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub log_level: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            api_url: DEFAULT_API_URL.to_string(),
            catalog_path: PathBuf::from("features.yaml"),
            max_concurrent_lookups: 8,
            request_timeout_secs: 30,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl UserConfig {
    pub fn max_concurrent_lookups(&self) -> usize {
        self.max_concurrent_lookups.max(1)
    }
}

/// Reads a JSON config; every field is optional.
pub fn load_user_config(path: Option<&Path>) -> Result<UserConfig> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }
        None => Ok(UserConfig::default()),
    }
}
