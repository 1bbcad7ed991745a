use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use super::Level;
use crate::path::leaf_name;

/// Compression filter applied to a tar stream.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TarCompression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Lz4,
}

/// Streams a directory into a (optionally compressed) tar file.
#[derive(Debug, Clone, Default)]
pub struct TarArchiver {
    compression: TarCompression,
    level: Level,
}

impl TarArchiver {
    pub fn new(compression: TarCompression, level: Level) -> Self {
        Self { compression, level }
    }

    pub fn extension(&self) -> &'static str {
        match self.compression {
            TarCompression::None => "tar",
            TarCompression::Gzip => "tar.gz",
            TarCompression::Bzip2 => "tar.bz2",
            TarCompression::Xz => "tar.xz",
            TarCompression::Zstd => "tar.zst",
            TarCompression::Lz4 => "tar.lz4",
        }
    }

    pub(super) fn write(&self, folder: &Path, archive: &Path) -> anyhow::Result<()> {
        let file = File::create(archive)
            .with_context(|| format!("cannot create {}", archive.display()))?;
        let file = BufWriter::new(file);
        let root = leaf_name(folder);
        let level = self.level;

        let mut file = match self.compression {
            TarCompression::None => append(file, &root, folder)?,
            TarCompression::Gzip => {
                let compression = flate2::Compression::new(level.scale([1, 3, 6, 8, 9]));
                let encoder = flate2::write::GzEncoder::new(file, compression);
                append(encoder, &root, folder)?.finish()?
            }
            TarCompression::Bzip2 => {
                let compression = bzip2::Compression::new(level.scale([1, 3, 6, 8, 9]));
                let encoder = bzip2::write::BzEncoder::new(file, compression);
                append(encoder, &root, folder)?.finish()?
            }
            TarCompression::Xz => {
                let encoder = xz2::write::XzEncoder::new(file, level.scale([1, 3, 6, 8, 9]));
                append(encoder, &root, folder)?.finish()?
            }
            TarCompression::Zstd => {
                let zstd_level = i32::try_from(level.scale([1, 2, 3, 9, 19]))?;
                let encoder = zstd::stream::write::Encoder::new(file, zstd_level)?;
                append(encoder, &root, folder)?.finish()?
            }
            TarCompression::Lz4 => {
                let encoder = lz4::EncoderBuilder::new()
                    .level(level.scale([1, 3, 6, 9, 12]))
                    .build(file)?;
                let (file, result) = append(encoder, &root, folder)?.finish();
                result?;
                file
            }
        };
        file.flush()
            .with_context(|| format!("cannot write {}", archive.display()))?;
        Ok(())
    }
}

/// Appends `folder` under `root` and closes the tar stream, returning the writer.
fn append<W: Write>(writer: W, root: &str, folder: &Path) -> io::Result<W> {
    let mut builder = ::tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder.append_dir_all(root, folder)?;
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        let ext = |compression| TarArchiver::new(compression, Level::Default).extension();
        assert_eq!(ext(TarCompression::None), "tar");
        assert_eq!(ext(TarCompression::Gzip), "tar.gz");
        assert_eq!(ext(TarCompression::Zstd), "tar.zst");
    }

    #[test]
    fn test_compression_from_config_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            compression: TarCompression,
        }
        let parsed: Wrapper = toml::from_str("compression = \"bzip2\"").unwrap();
        assert_eq!(parsed.compression, TarCompression::Bzip2);
        assert!(toml::from_str::<Wrapper>("compression = \"rar\"").is_err());
    }
}
