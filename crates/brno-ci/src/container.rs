//! Declarative container recipes.
//!
//! A [`Container`] only describes what should happen: which image to start
//! from, what to mount, which environment to set and which commands to run.
//! Nothing is executed until the recipe is handed to a
//! [`ContainerEngine`](crate::engine::ContainerEngine).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a mounted file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// A file on the host.
    Host(PathBuf),

    /// A file fetched over HTTP(S) before the container starts.
    Url(String),
}

/// A named cache volume mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMount {
    pub path: String,
    pub volume: String,
}

/// A host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMount {
    pub path: String,
    pub host_dir: PathBuf,
}

/// A single file mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMount {
    pub path: String,
    pub source: FileSource,
}

/// Recipe for one pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Step name used in logs and errors.
    pub name: String,

    /// Base image reference.
    pub image: Option<String>,

    pub caches: Vec<CacheMount>,
    pub directories: Vec<DirectoryMount>,
    pub files: Vec<FileMount>,

    /// Working directory for every exec.
    pub workdir: Option<String>,

    /// Environment variables, unique by key, in insertion order.
    pub env: Vec<(String, String)>,

    /// Commands run in order; the first non-zero exit stops the step.
    pub execs: Vec<Vec<String>>,

    pub exposed_ports: Vec<u16>,
}

impl Container {
    /// Start an empty recipe for the named step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_mounted_cache(mut self, path: impl Into<String>, volume: impl Into<String>) -> Self {
        self.caches.push(CacheMount {
            path: path.into(),
            volume: volume.into(),
        });
        self
    }

    pub fn with_workdir(mut self, path: impl Into<String>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    pub fn with_mounted_directory(
        mut self,
        path: impl Into<String>,
        host_dir: impl Into<PathBuf>,
    ) -> Self {
        self.directories.push(DirectoryMount {
            path: path.into(),
            host_dir: host_dir.into(),
        });
        self
    }

    pub fn with_mounted_file(mut self, path: impl Into<String>, source: FileSource) -> Self {
        self.files.push(FileMount {
            path: path.into(),
            source,
        });
        self
    }

    /// Set an environment variable, replacing any earlier value for `key`.
    pub fn with_env_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    pub fn with_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execs.push(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    /// Apply `f` to the recipe, for conditional composition.
    pub fn with(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    /// Value of an environment variable, if set.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
