//! Resource providers.
//!
//! A provider enumerates every candidate resource of one kind and filters them
//! through a [`Selectors`] list. Resolution is sorted by name, so the order in
//! which resources were discovered never leaks into a pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::constants::{COMPOSE_KIND, DESCRIPTOR_FILES};
use crate::path::leaf_name;
use crate::resource::{DirectoryResource, Resource, ServiceResource};
use crate::selector::Selectors;

pub trait Provider {
    type Resource: Resource;

    /// Every candidate resource, in discovery order.
    fn resources(&self) -> Vec<Self::Resource>;

    /// Candidates selected by `selectors`, sorted by name ascending.
    fn resolve(&self, selectors: &Selectors) -> Vec<Self::Resource> {
        let mut matched: Vec<Self::Resource> = self
            .resources()
            .into_iter()
            .filter(|resource| selectors.matches(resource.name()))
            .collect();
        matched.sort_by(|a, b| a.name().cmp(b.name()));
        matched
    }
}

/// Statically declared backup groups.
#[derive(Debug, Clone, Default)]
pub struct DirectoryGroupProvider {
    groups: Vec<DirectoryResource>,
}

impl DirectoryGroupProvider {
    pub fn new(groups: Vec<DirectoryResource>) -> Self {
        Self { groups }
    }
}

impl From<&BTreeMap<String, Vec<PathBuf>>> for DirectoryGroupProvider {
    fn from(groups: &BTreeMap<String, Vec<PathBuf>>) -> Self {
        Self::new(
            groups
                .iter()
                .map(|(name, dirs)| DirectoryResource::new(name.clone(), dirs.clone()))
                .collect(),
        )
    }
}

impl Provider for DirectoryGroupProvider {
    type Resource = DirectoryResource;

    fn resources(&self) -> Vec<DirectoryResource> {
        self.groups.clone()
    }
}

/// Discovers compose stacks below a set of root directories.
///
/// A directory is a stack once it directly contains one of
/// [`DESCRIPTOR_FILES`]; the walk does not descend into it any further. The
/// roots themselves are never stacks. Missing roots contribute nothing.
/// Directory symlinks are followed and the stack takes the link's name;
/// symlink loops are skipped.
#[derive(Debug, Clone, Default)]
pub struct ServiceProvider {
    roots: Vec<PathBuf>,
}

impl ServiceProvider {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn discover(root: &Path, found: &mut Vec<ServiceResource>) {
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if is_stack(entry.path()) {
                trace!(directory = %entry.path().display(), "found stack");
                found.push(ServiceResource::new(
                    leaf_name(entry.path()),
                    COMPOSE_KIND,
                    entry.path().to_path_buf(),
                ));
                walker.skip_current_dir();
            }
        }
    }
}

impl Provider for ServiceProvider {
    type Resource = ServiceResource;

    fn resources(&self) -> Vec<ServiceResource> {
        let mut found = Vec::new();
        for root in &self.roots {
            Self::discover(root, &mut found);
        }
        found
    }
}

/// Whether `dir` directly contains an orchestration descriptor.
pub fn is_stack(dir: &Path) -> bool {
    DESCRIPTOR_FILES
        .iter()
        .any(|descriptor| dir.join(descriptor).is_file())
}
