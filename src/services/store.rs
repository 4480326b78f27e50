//! On-disk list of tracked repositories and fetch settings

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};
use crate::models::{FetchSettings, Repository};

const STORE_DIR: &str = "fetchwarden";
const STORE_FILE: &str = "repositories.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    #[serde(default)]
    settings: FetchSettings,
    #[serde(default)]
    repositories: Vec<Repository>,
}

impl StoreFile {
    /// Older files hold only the repository array
    fn parse(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if value.is_array() {
            return Ok(StoreFile {
                settings: FetchSettings::default(),
                repositories: serde_json::from_value(value)?,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Repositories and settings backed by a JSON file
#[derive(Debug)]
pub struct RepositoryStore {
    path: PathBuf,
    pub settings: FetchSettings,
    pub repositories: Vec<Repository>,
}

impl RepositoryStore {
    /// `<config dir>/fetchwarden/repositories.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(STORE_DIR).join(STORE_FILE))
            .ok_or_else(|| {
                WardenError::OperationFailed("Could not determine config directory".to_string())
            })
    }

    /// Load the store at `path`; a missing file gives an empty store with default settings
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            tracing::info!("No repository list at {}, starting empty", path.display());
            return Ok(Self {
                path,
                settings: FetchSettings::default(),
                repositories: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path)?;
        let file = StoreFile::parse(&content)?;

        let settings = match file.settings.validate() {
            Ok(()) => file.settings,
            Err(e) => {
                tracing::warn!("Ignoring stored settings: {}", e);
                FetchSettings::default()
            }
        };

        tracing::info!(
            "Loaded {} repositories from {}",
            file.repositories.len(),
            path.display()
        );
        Ok(Self {
            path,
            settings,
            repositories: file.repositories,
        })
    }

    /// Write the store back as pretty-printed JSON
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = StoreFile {
            settings: self.settings.clone(),
            repositories: self.repositories.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Find the repository an event refers to
    pub fn find_mut(&mut self, name: &str, local_path: &Path) -> Option<&mut Repository> {
        self.repositories
            .iter_mut()
            .find(|repo| repo.matches(name, local_path))
    }
}
