//! `backup`: resolve directory groups, archive every directory, optionally
//! upload the archives.
//!
//! Archives are written to
//! `<destination>/<group>/<leaf>/<leaf>_<YYYY-MM-DD_HHMM>[_NN].<ext>` and
//! uploaded under `<group>/<leaf>/<archive file name>`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::info;

use crate::archive::{ArchivalStatus, Archiver};
use crate::constants::ARCHIVE_TIMESTAMP_FORMAT;
use crate::path::leaf_name;
use crate::pipeline::{Action, Command, Entries, MapResources, Pipeline, Resolved};
use crate::provider::DirectoryGroupProvider;
use crate::resource::DirectoryResource;
use crate::selector::Selectors;
use crate::upload::{UploadProgress, UploadStatus, Uploader};

/// First path of the form `<destination>/<group>/<leaf>/<leaf>_<timestamp>[_NN].<extension>`
/// that does not exist yet. The counter starts empty, then `_01`, `_02`, ...
pub fn archive_path(
    destination: &Path,
    group: &str,
    folder: &Path,
    timestamp: &str,
    extension: &str,
) -> PathBuf {
    let leaf = leaf_name(folder);
    let directory = destination.join(group).join(&leaf);
    let mut counter = 0u32;
    loop {
        let suffix = if counter == 0 {
            String::new()
        } else {
            format!("_{counter:02}")
        };
        let candidate = directory.join(format!("{leaf}_{timestamp}{suffix}.{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Object key for `archive`, taken from `folder` in `group`.
pub fn upload_key(group: &str, folder: &Path, archive: &Path) -> String {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{group}/{}/{file_name}", leaf_name(folder))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedEntry {
    pub group: String,
    pub status: ArchivalStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Archived {
    pub entries: Vec<ArchivedEntry>,
}

impl Entries for Archived {
    /// Any archive succeeded.
    fn success(&self) -> bool {
        self.entries.iter().any(|entry| entry.status.success())
    }

    fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|ArchivedEntry { group, status }| {
                let outcome = match status.backend.failure() {
                    _ if status.success() => format!(
                        "{} bytes in {:.1}s ({}/s)",
                        status.size(),
                        status.elapsed().as_secs_f64(),
                        human_bytes(status.speed().unwrap_or_default()),
                    ),
                    Some(reason) => format!("FAILED: {reason}"),
                    None => "FAILED: archive not found".to_string(),
                };
                format!(
                    "[{group}] {} -> {}: {outcome}",
                    status.folder.display(),
                    status.archive.display()
                )
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct ArchiveDirectories {
    destination: PathBuf,
    archiver: Archiver,
}

impl ArchiveDirectories {
    pub fn new(destination: PathBuf, archiver: Archiver) -> Self {
        Self {
            destination,
            archiver,
        }
    }
}

impl Action for ArchiveDirectories {
    type Input = Resolved<DirectoryResource>;
    type Output = Archived;

    fn name(&self) -> &str {
        "archive"
    }

    fn run(&self, resolved: &Resolved<DirectoryResource>) -> Archived {
        // One timestamp for the whole run, so a batch shares its name stem.
        let timestamp = Local::now().format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
        let mut archived = Archived::default();
        for group in &resolved.resources {
            for folder in &group.directories {
                let archive = archive_path(
                    &self.destination,
                    &group.name,
                    folder,
                    &timestamp,
                    self.archiver.extension(),
                );
                archived.entries.push(ArchivedEntry {
                    group: group.name.clone(),
                    status: self.archiver.archive(folder, &archive),
                });
            }
        }
        archived
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedEntry {
    pub group: String,
    pub status: UploadStatus,
    /// Throttled progress events, in emission order.
    pub progress: Vec<UploadProgress>,
}

#[derive(Debug, Clone, Default)]
pub struct Uploaded {
    pub entries: Vec<UploadedEntry>,
}

impl Entries for Uploaded {
    /// Any upload succeeded.
    fn success(&self) -> bool {
        self.entries.iter().any(|entry| entry.status.success())
    }

    fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|UploadedEntry { status, progress, .. }| {
                let last = progress.last().map_or(0, |event| event.progress);
                match (&status.exception, status.speed()) {
                    (_, Some(speed)) => format!(
                        "{} -> {}: {} bytes in {:.1}s ({}/s)",
                        status.filepath.display(),
                        status.key,
                        status.size.unwrap_or_default(),
                        status.elapsed().as_secs_f64(),
                        human_bytes(speed),
                    ),
                    (Some(exception), None) => format!(
                        "{} -> {}: FAILED at {last}%: {exception}",
                        status.filepath.display(),
                        status.key
                    ),
                    (None, None) => format!(
                        "{} -> {}: FAILED at {last}%",
                        status.filepath.display(),
                        status.key
                    ),
                }
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct UploadArchives {
    uploader: Box<dyn Uploader>,
}

impl UploadArchives {
    pub fn new(uploader: Box<dyn Uploader>) -> Self {
        Self { uploader }
    }
}

impl Action for UploadArchives {
    type Input = Archived;
    type Output = Uploaded;

    fn name(&self) -> &str {
        "upload"
    }

    fn run(&self, archived: &Archived) -> Uploaded {
        let mut uploaded = Uploaded::default();
        for ArchivedEntry { group, status } in &archived.entries {
            if !status.success() {
                continue;
            }
            let key = upload_key(group, &status.folder, &status.archive);
            let events = Mutex::new(Vec::new());
            let on_progress = |event: UploadProgress| {
                info!(
                    key = %key,
                    progress = event.progress,
                    elapsed_s = event.elapsed.as_secs(),
                    speed = %human_bytes(event.speed),
                    "upload progress"
                );
                match events.lock() {
                    Ok(mut guard) => guard.push(event),
                    Err(poisoned) => poisoned.into_inner().push(event),
                }
            };
            let result = self
                .uploader
                .upload(&status.archive, &key, Some(&on_progress));
            let progress = match events.into_inner() {
                Ok(events) => events,
                Err(poisoned) => poisoned.into_inner(),
            };
            uploaded.entries.push(UploadedEntry {
                group: group.clone(),
                status: result,
                progress,
            });
        }
        uploaded
    }
}

/// Builds the `backup` command. The upload stage is only added when an
/// uploader is configured.
pub fn command(
    destination: PathBuf,
    groups: DirectoryGroupProvider,
    archiver: Archiver,
    uploader: Option<Box<dyn Uploader>>,
) -> Command<Selectors> {
    let mut config = vec![
        ("destination", destination.display().to_string()),
        ("archiver", archiver.kind().to_string()),
    ];
    if let Some(uploader) = &uploader {
        config.push(("uploader", uploader.provider().to_string()));
    }
    let pipeline = Pipeline::start(MapResources::new("map_directories", groups))
        .then(ArchiveDirectories::new(destination, archiver));
    let command = match uploader {
        Some(uploader) => Command::new("backup", pipeline.then(UploadArchives::new(uploader))),
        None => Command::new("backup", pipeline),
    };
    config
        .into_iter()
        .fold(command, |command, (key, value)| command.with_config(key, value))
}

/// `bytes` scaled to the largest binary unit that keeps it at or above one.
pub fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
