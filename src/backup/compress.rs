// docbackup/src/backup/compress.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Gzips `source` into `<source>.gz` and removes `source`.
///
/// # Returns
/// Path to the compressed file.
pub fn gzip_file(source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(anyhow::anyhow!(
            "File to compress does not exist: {}",
            source.display()
        ));
    }

    let mut dest_name = source.as_os_str().to_owned();
    dest_name.push(".gz");
    let dest = PathBuf::from(dest_name);

    log::debug!(target: "backup::compress", "Compressing {} to {}", source.display(), dest.display());

    let input = File::open(source)
        .with_context(|| format!("Failed to open {} for compression", source.display()))?;
    let output = File::create(&dest)
        .with_context(|| format!("Failed to create compressed file: {}", dest.display()))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut reader, &mut encoder)
        .with_context(|| format!("Failed to compress {}", source.display()))?;
    let mut writer = encoder.finish().with_context(|| {
        format!("Failed to finish Gzip encoding for: {}", dest.display())
    })?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush compressed file: {}", dest.display()))?;

    fs::remove_file(source)
        .with_context(|| format!("Failed to remove uncompressed file: {}", source.display()))?;

    log::info!(target: "backup::compress", "Compressed dump written to {}", dest.display());
    Ok(dest)
}
