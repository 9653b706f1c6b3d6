//! Timestamped backups of the live configuration
//!
//! A backup of `nginx.conf` is a sibling named `nginx.conf.bak-<unixtime>`,
//! with a `-<n>` suffix when several are taken in the same second.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const BACKUP_INFIX: &str = ".bak-";

/// How many backups to keep, and for how long
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Newest backups kept; `None` keeps all
    pub keep: Option<usize>,
    /// Backups older than this are removed
    pub max_age: Option<Duration>,
}

/// One backup file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: i64,
    pub sequence: u32,
}

impl Backup {
    /// Recognise `file_name` as a backup of `target_name`
    fn parse(target_name: &str, file_name: &str) -> Option<(i64, u32)> {
        let suffix = file_name
            .strip_prefix(target_name)?
            .strip_prefix(BACKUP_INFIX)?;
        let (timestamp, sequence) = match suffix.split_once('-') {
            Some((ts, seq)) => (ts, seq.parse().ok()?),
            None => (suffix, 0),
        };
        Some((timestamp.parse().ok()?, sequence))
    }
}

fn file_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })
}

fn sibling(target: &Path, name: String) -> PathBuf {
    target.with_file_name(name)
}

/// Copy `target` to a fresh backup path
///
/// Returns `None` when the target does not exist, since there is nothing to
/// preserve.
pub async fn create_backup(target: &Path, now: DateTime<Utc>) -> io::Result<Option<PathBuf>> {
    if !fs::try_exists(target).await? {
        return Ok(None);
    }

    let name = file_name(target)?;
    let timestamp = now.timestamp();
    let mut path = sibling(target, format!("{}{}{}", name, BACKUP_INFIX, timestamp));
    let mut sequence = 0u32;
    while fs::try_exists(&path).await? {
        sequence += 1;
        path = sibling(
            target,
            format!("{}{}{}-{}", name, BACKUP_INFIX, timestamp, sequence),
        );
    }

    fs::copy(target, &path).await?;
    tracing::info!("Backed up {:?} to {:?}", target, path);
    Ok(Some(path))
}

/// Backups of `target`, newest first
pub async fn list_backups(target: &Path) -> io::Result<Vec<Backup>> {
    let name = file_name(target)?;
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut backups = Vec::new();
    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(backups),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if let Some((timestamp, sequence)) = Backup::parse(&name, &entry_name) {
            backups.push(Backup {
                path: entry.path(),
                timestamp,
                sequence,
            });
        }
    }

    backups.sort_by(|a, b| (b.timestamp, b.sequence).cmp(&(a.timestamp, a.sequence)));
    Ok(backups)
}

/// Remove backups of `target` the policy no longer keeps, returning their paths
///
/// Individual removal failures are logged and skipped.
pub async fn prune_backups(
    target: &Path,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> io::Result<Vec<PathBuf>> {
    let backups = list_backups(target).await?;
    let cutoff = policy
        .max_age
        .and_then(|age| chrono::Duration::from_std(age).ok())
        .map(|age| (now - age).timestamp());

    let mut removed = Vec::new();
    for (index, backup) in backups.into_iter().enumerate() {
        let over_count = policy.keep.is_some_and(|keep| index >= keep);
        let too_old = cutoff.is_some_and(|cutoff| backup.timestamp < cutoff);
        if !(over_count || too_old) {
            continue;
        }

        match fs::remove_file(&backup.path).await {
            Ok(()) => {
                tracing::debug!("Removed old backup {:?}", backup.path);
                removed.push(backup.path);
            }
            Err(e) => tracing::warn!("Failed to remove backup {:?}: {}", backup.path, e),
        }
    }
    Ok(removed)
}
