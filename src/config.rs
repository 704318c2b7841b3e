use crate::richtext::format::FormatRegistry;
use crate::richtext::format_toggle::ToggleRule;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;

const QUALIFIER: &str = "net.roblillack";
const ORGANIZATION: &str = "Ctxedit";
const APPLICATION: &str = "ctxedit";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid format table: {0}")]
    Format(#[from] crate::richtext::error::EditError),
}

/// User configuration
///
/// ```toml
/// toggle_rule = { kind = "coverage", threshold = 0.5 }
///
/// [formats]
/// small = "small"
/// bold = "b"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra or overriding `key = "tag"` entries for the format registry
    pub formats: BTreeMap<String, String>,
    pub toggle_rule: ToggleRule,
}

pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load from the default location, falling back to defaults on any problem
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Config::default();
        };
        if !path.exists() {
            return Config::default();
        }
        match Config::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Ignoring configuration: {err}");
                Config::default()
            }
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.registry()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self).map_err(|err| {
            io::Error::new(ErrorKind::Other, format!("toml serialization error: {err}"))
        })?;

        fs::write(path, toml)
    }

    /// The default registry with this configuration's entries applied
    pub fn registry(&self) -> Result<FormatRegistry, ConfigError> {
        Ok(FormatRegistry::with_overrides(&self.formats)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.toggle_rule, ToggleRule::Boundary);
        assert_eq!(config.registry().unwrap().len(), 6);
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
toggle_rule = { kind = "coverage", threshold = 0.75 }

[formats]
bold = "b"
small = "small"
"#,
        );
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.toggle_rule, ToggleRule::Coverage { threshold: 0.75 });

        let registry = config.registry().unwrap();
        assert_eq!(registry.resolve("bold").unwrap().tag(), "b");
        assert_eq!(registry.resolve("small").unwrap().tag(), "small");
    }

    #[test]
    fn test_invalid_files() {
        let file = write_config("toggle_rule = { kind = \"sometimes\" }");
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let file = write_config("[formats]\nbold = \"p\"\n");
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::Format(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = Config::default();
        config.formats.insert("small".to_string(), "small".to_string());
        config.toggle_rule = ToggleRule::Coverage { threshold: 0.5 };

        config.save(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
