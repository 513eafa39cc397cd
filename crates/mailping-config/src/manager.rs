use crate::{AppConfig, ConfigError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "mailping";
const APP: &str = "mailping";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    data_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the platform config directory, writing a default file on first run.
    /// An explicit `config_path` must already exist.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        let data_dir = dirs.data_dir().to_path_buf();

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                Self::at(path, data_dir)
            }
            None => {
                let config_dir = dirs.config_dir().to_path_buf();
                fs::create_dir_all(&config_dir)?;
                let config_path = config_dir.join("config.toml");
                if !config_path.exists() {
                    let content = toml::to_string_pretty(&AppConfig::default())?;
                    fs::write(&config_path, content)?;
                    tracing::info!(path = %config_path.display(), "wrote default config");
                }
                Self::at(config_path, data_dir)
            }
        }
    }

    pub fn at(config_path: PathBuf, data_dir: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            config_path,
            data_dir,
        })
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
