//! Archive backends.
//!
//! All backends share one contract, [`Archiver::archive`], which turns a
//! directory into an archive file and reports the outcome as an
//! [`ArchivalStatus`]. `rar` shells out through a [`ProcessRunner`]; `tar`,
//! `zip` and `7z` are written in-process.
//!
//! [`ProcessRunner`]: crate::process::ProcessRunner

mod rar;
mod sevenz;
mod tar;
mod zip;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::logging::{Outcome, traced};
use crate::process::CompletedProcess;

pub use self::rar::RarArchiver;
pub use self::sevenz::SevenZArchiver;
pub use self::tar::{TarArchiver, TarCompression};
pub use self::zip::{ZipArchiver, ZipCompression};

/// Compression level, mapped onto each codec's own scale.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fastest,
    Faster,
    #[default]
    Default,
    Better,
    Best,
}

impl Level {
    /// Picks the value for this level out of `[fastest, faster, default, better, best]`.
    pub fn scale(self, levels: [u32; 5]) -> u32 {
        match self {
            Level::Fastest => levels[0],
            Level::Faster => levels[1],
            Level::Default => levels[2],
            Level::Better => levels[3],
            Level::Best => levels[4],
        }
    }
}

/// How an archive was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveBackend {
    /// By an external tool.
    Process(CompletedProcess),
    /// In-process. `error` holds the failure chain, if any.
    Builtin { error: Option<String> },
}

impl ArchiveBackend {
    pub fn success(&self) -> bool {
        match self {
            ArchiveBackend::Process(process) => process.success(),
            ArchiveBackend::Builtin { error } => error.is_none(),
        }
    }

    /// Human-readable failure reason, if the backend failed.
    pub fn failure(&self) -> Option<String> {
        match self {
            ArchiveBackend::Process(process) if !process.success() => {
                Some(match &process.exception {
                    Some(exception) => exception.clone(),
                    None => {
                        let stderr = process.stderr.trim();
                        match process.exitcode {
                            Some(code) if stderr.is_empty() => format!("exit code {code}"),
                            Some(code) => format!("exit code {code}: {stderr}"),
                            None => "not run".to_string(),
                        }
                    }
                })
            }
            ArchiveBackend::Builtin { error } => error.clone(),
            ArchiveBackend::Process(_) => None,
        }
    }
}

/// Outcome of archiving one folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivalStatus {
    pub folder: PathBuf,
    pub archive: PathBuf,
    pub started: Option<DateTime<Local>>,
    pub completed: Option<DateTime<Local>>,
    pub backend: ArchiveBackend,
}

impl ArchivalStatus {
    /// The backend reported success and the archive file exists.
    pub fn success(&self) -> bool {
        self.started.is_some()
            && self.completed.is_some()
            && self.backend.success()
            && self.archive.is_file()
    }

    pub fn elapsed(&self) -> Duration {
        match (self.started, self.completed) {
            (Some(started), Some(completed)) => (completed - started).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Archive size in bytes, `0` unless successful.
    pub fn size(&self) -> u64 {
        if !self.success() {
            return 0;
        }
        fs::metadata(&self.archive).map(|meta| meta.len()).unwrap_or(0)
    }

    /// Bytes per second, `None` unless successful. Elapsed time is floored to one second.
    pub fn speed(&self) -> Option<f64> {
        if !self.success() {
            return None;
        }
        let seconds = self.elapsed().max(Duration::from_secs(1)).as_secs_f64();
        Some(self.size() as f64 / seconds)
    }
}

impl Outcome for ArchivalStatus {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

/// A configured archive backend.
#[derive(Debug, Clone)]
pub enum Archiver {
    Rar(RarArchiver),
    Tar(TarArchiver),
    Zip(ZipArchiver),
    SevenZ(SevenZArchiver),
}

impl Archiver {
    /// Backend name as used in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Archiver::Rar(_) => "rar",
            Archiver::Tar(_) => "tar",
            Archiver::Zip(_) => "zip",
            Archiver::SevenZ(_) => "7z",
        }
    }

    /// File extension (without leading dot) of the archives this backend writes.
    pub fn extension(&self) -> &'static str {
        match self {
            Archiver::Rar(_) => "rar",
            Archiver::Tar(tar) => tar.extension(),
            Archiver::Zip(_) => "zip",
            Archiver::SevenZ(_) => "7z",
        }
    }

    /// Archives `folder` into `archive`, creating the archive's parent directory.
    pub fn archive(&self, folder: &Path, archive: &Path) -> ArchivalStatus {
        traced("archiver", self.kind(), &folder.display(), || match self {
            Archiver::Rar(rar) => rar.archive(folder, archive),
            Archiver::Tar(tar) => builtin(folder, archive, || tar.write(folder, archive)),
            Archiver::Zip(zip) => builtin(folder, archive, || zip.write(folder, archive)),
            Archiver::SevenZ(sevenz) => builtin(folder, archive, || sevenz.write(folder, archive)),
        })
    }
}

/// Creates the parent directory of `archive`.
fn prepare(archive: &Path) -> anyhow::Result<()> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Runs an in-process backend and stamps the status around it.
fn builtin<F>(folder: &Path, archive: &Path, write: F) -> ArchivalStatus
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let started = Some(Local::now());
    let result = if folder.is_dir() {
        prepare(archive).and_then(|()| write())
    } else {
        Err(anyhow::anyhow!("{} is not a directory", folder.display()))
    };
    ArchivalStatus {
        folder: folder.to_path_buf(),
        archive: archive.to_path_buf(),
        started,
        completed: Some(Local::now()),
        backend: ArchiveBackend::Builtin {
            error: result.err().map(|err| format!("{err:#}")),
        },
    }
}
