use std::fs;
use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::model::OutcomeStatus;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub status: OutcomeStatus,
    pub checksum: String,
}

/// Hex SHA-256.
pub fn checksum(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = checksum(&fs::read(path)?);
    if actual != expected {
        return Err(ScrapeError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Atomic, checksum-verified write. Never leaves a partial file at `path`.
pub fn commit(content: &str, path: &Path, overwrite: bool) -> CommitResult {
    let sum = checksum(content.as_bytes());
    let status = match try_commit(content, &sum, path, overwrite) {
        Ok(status) => status,
        Err(e) => {
            warn!("Write failed for {}: {}", path.display(), e);
            OutcomeStatus::Failed
        }
    };
    CommitResult { status, checksum: sum }
}

fn try_commit(content: &str, sum: &str, path: &Path, overwrite: bool) -> Result<OutcomeStatus> {
    if !paths::validate_path_safety(path) {
        return Err(ScrapeError::Validation(format!("unsafe output path {}", path.display())));
    }

    if path.exists() && !overwrite {
        match verify_checksum(path, sum) {
            Ok(()) => debug!("{} already up to date", path.display()),
            Err(ScrapeError::ChecksumMismatch { .. }) => {
                info!("{} exists with different content, keeping it", path.display())
            }
            Err(e) => return Err(e),
        }
        return Ok(OutcomeStatus::Skipped);
    }

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    // Dropping `tmp` on any early return removes it.
    verify_checksum(tmp.path(), sum)?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(OutcomeStatus::Processed)
}
