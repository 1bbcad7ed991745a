use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use walkdir::WalkDir;
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipWriter};

use super::Level;

/// Compression method for zip entries.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ZipCompression {
    Stored,
    #[default]
    Deflated,
}

/// Walks a directory and writes every entry into a zip file.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver {
    compression: ZipCompression,
    level: Level,
}

impl ZipArchiver {
    pub fn new(compression: ZipCompression, level: Level) -> Self {
        Self { compression, level }
    }

    pub(super) fn write(&self, folder: &Path, archive: &Path) -> anyhow::Result<()> {
        let file = File::create(archive)
            .with_context(|| format!("cannot create {}", archive.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = match self.compression {
            ZipCompression::Stored => {
                FileOptions::<()>::default().compression_method(CompressionMethod::Stored)
            }
            ZipCompression::Deflated => FileOptions::<()>::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(self.level.scale([1, 3, 6, 8, 9])))),
        };

        // Entries are stored under the folder's own name.
        let prefix = folder.parent().unwrap_or_else(|| Path::new(""));
        for entry in WalkDir::new(folder).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if path == archive {
                continue;
            }
            let name = path
                .strip_prefix(prefix)?
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                zip.start_file(name, options)?;
                let mut source = File::open(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                io::copy(&mut source, &mut zip)?;
            }
        }
        zip.finish()?;
        Ok(())
    }
}
