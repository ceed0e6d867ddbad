use crate::project::{Project, ValidationError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML project: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML project: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("unsupported project file extension: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("invalid resource specification {0:?}, expected <name>=<capacity>")]
    InvalidResource(String),
}

/// Serialized form of a project, as read from TOML or YAML files.
///
/// Values are signed so that negative numbers reach validation and are reported as such,
/// instead of failing deserialization with a less helpful message.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    pub horizon: i64,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub activities: Vec<ActivityConfig>,
}

impl ProjectConfig {
    /// Load a project file, picking the format from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(text)?)
    }

    /// Add capacity to the named resource, creating it when it does not exist yet. The sum
    /// saturates, so an oversized total is reported by validation as out of range.
    pub fn add_resource(&mut self, name: &str, capacity: i64) {
        match self.resources.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.capacity = existing.capacity.saturating_add(capacity),
            None => self.resources.push(ResourceConfig {
                name: name.into(),
                capacity,
            }),
        }
    }
}

impl TryFrom<ProjectConfig> for Project {
    type Error = ValidationError;

    fn try_from(value: ProjectConfig) -> Result<Self, Self::Error> {
        let mut builder = Project::builder()
            .horizon(value.horizon)
            .activities(value.activities);
        if let Some(due_date) = value.due_date {
            builder = builder.due_date(due_date);
        }
        for resource in value.resources {
            builder = builder.resource(resource.name, resource.capacity);
        }
        builder.build()
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceConfig {
    pub name: String,
    pub capacity: i64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            name: String::default(),
            capacity: 1,
        }
    }
}

impl FromStr for ResourceConfig {
    type Err = ConfigError;

    /// From "<name>=<capacity>"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_once('=')
            .and_then(|(name, capacity)| {
                let capacity = capacity.trim().parse().ok()?;
                let name = name.trim();
                (!name.is_empty()).then(|| ResourceConfig {
                    name: name.into(),
                    capacity,
                })
            })
            .ok_or_else(|| ConfigError::InvalidResource(s.to_string()))
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActivityConfig {
    pub id: i64,
    pub duration: i64,
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub demand: BTreeMap<String, i64>,
    #[serde(default)]
    pub successors: Vec<i64>,
}

impl ActivityConfig {
    pub fn new(id: i64, duration: i64) -> Self {
        Self {
            id,
            duration,
            mode: None,
            demand: BTreeMap::new(),
            successors: Vec::new(),
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn demand(mut self, resource: impl Into<String>, amount: i64) -> Self {
        self.demand.insert(resource.into(), amount);
        self
    }

    pub fn successor(mut self, id: i64) -> Self {
        self.successors.push(id);
        self
    }

    pub fn successors(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.successors.extend(ids);
        self
    }
}
