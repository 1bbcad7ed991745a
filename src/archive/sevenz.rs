use std::path::Path;

/// Writes LZMA2-compressed 7z archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct SevenZArchiver;

impl SevenZArchiver {
    pub(super) fn write(&self, folder: &Path, archive: &Path) -> anyhow::Result<()> {
        sevenz_rust2::compress_to_path(folder, archive)
            .map_err(|err| anyhow::anyhow!("7z compression failed: {err}"))
    }
}
