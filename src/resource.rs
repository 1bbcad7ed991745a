//! Named resources produced by providers.

use std::path::PathBuf;

/// Anything a provider can hand out and a selector can match by name.
pub trait Resource {
    /// Name the selectors are matched against.
    fn name(&self) -> &str;
}

/// A backup group: a name plus the directories that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryResource {
    pub name: String,
    pub directories: Vec<PathBuf>,
}

impl DirectoryResource {
    pub fn new(name: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directories,
        }
    }
}

impl Resource for DirectoryResource {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A deployable unit discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResource {
    pub name: String,
    /// Service kind, resolved to a concrete service by the deploy factory.
    pub kind: String,
    /// Directory holding the orchestration descriptor.
    pub directory: PathBuf,
}

impl ServiceResource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, directory: PathBuf) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            directory,
        }
    }
}

impl Resource for ServiceResource {
    fn name(&self) -> &str {
        &self.name
    }
}
