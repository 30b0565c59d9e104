//! Copernicus Climate Data Store credentials.
//!
//! Looked up in `CDSAPI_URL`/`CDSAPI_KEY` first, then in the YAML file
//! `~/.cdsapirc`:
//!
//! ```text
//! url: https://cds.climate.copernicus.eu/api
//! key: <personal access token>
//! ```

use crate::providers::error::ProviderError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CDSAPI_URL_ENV: &str = "CDSAPI_URL";
pub const CDSAPI_KEY_ENV: &str = "CDSAPI_KEY";
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
const CDSAPIRC_FILE_NAME: &str = ".cdsapirc";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CdsCredentials {
    #[serde(default = "default_url")]
    pub url: String,
    pub key: String,
}

fn default_url() -> String {
    DEFAULT_CDS_URL.to_string()
}

// Keeps the key out of logs.
impl std::fmt::Debug for CdsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdsCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CdsCredentials {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let key = std::env::var(CDSAPI_KEY_ENV).ok()?;
        let url = std::env::var(CDSAPI_URL_ENV).unwrap_or_else(|_| default_url());
        Some(Self::new(url, key))
    }

    /// Reads a `.cdsapirc` style file. `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ProviderError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProviderError::Io(path.to_path_buf(), e)),
        };
        let credentials: CdsCredentials = serde_yaml::from_str(&text)
            .map_err(|e| ProviderError::Credentials(path.to_path_buf(), e))?;
        Ok(Some(credentials))
    }

    pub fn default_file() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CDSAPIRC_FILE_NAME))
    }

    /// Environment first, then `~/.cdsapirc`. Nothing found is an auth error.
    pub fn discover() -> Result<Self, ProviderError> {
        if let Some(credentials) = Self::from_env() {
            return Ok(credentials);
        }
        if let Some(path) = Self::default_file() {
            if let Some(credentials) = Self::from_file(&path)? {
                return Ok(credentials);
            }
        }
        Err(ProviderError::Auth {
            provider: "era5".to_string(),
            message: format!(
                "no CDS API key found; set {CDSAPI_KEY_ENV} or create ~/{CDSAPIRC_FILE_NAME}"
            ),
        })
    }
}
