//! Cross-process lock for read-modify-write sequences on the shared store.
//!
//! Processes never share memory, so the lock is a directory: `create_dir` is
//! atomic, and exactly one caller wins.
//!
//! # Lock Directory Structure
//!
//! ```text
//! {group}.lock/
//! ├── pid          # Plain text: holder process ID
//! └── meta.json    # { pid, owner, created }
//! ```
//!
//! `owner` is a ULID unique to each acquisition, so two threads of the same
//! process contend like two processes do, and a holder never removes a lock
//! that was taken over from it.
//!
//! # Staleness
//!
//! Extension processes can be killed by the host at any moment. A lock is stale
//! when its PID is dead or it is older than [`STALE_LOCK_MS`]; stale locks are
//! taken over: the stale directory is renamed to a unique tombstone and then
//! deleted, so the live lock path is never removed out from under a new
//! holder. Holders keep the lock for milliseconds while the stale threshold
//! is seconds.

use fs_err as fs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{HoldfastError, Result};

/// Locks older than this are considered abandoned.
pub const STALE_LOCK_MS: u64 = 10_000;

const RETRY_MIN_MS: u64 = 1;
const RETRY_MAX_MS: u64 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockMeta {
    pid: u32,
    owner: String,
    created: u64,
}

/// A held lock. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    dir: PathBuf,
    owner: String,
}

impl StoreLock {
    /// Blocks until the lock is held or `timeout` elapses.
    pub fn acquire(lock_dir: &Path, timeout: Duration) -> Result<StoreLock> {
        let started = Instant::now();
        let owner = ulid::Ulid::new().to_string();
        let mut rng = rand::thread_rng();

        if let Some(parent) = lock_dir.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HoldfastError::io("Failed to create lock parent directory", e))?;
        }

        loop {
            match try_create(lock_dir, &owner) {
                Ok(true) => {
                    return Ok(StoreLock {
                        dir: lock_dir.to_path_buf(),
                        owner,
                    })
                }
                Ok(false) => {
                    if is_stale(lock_dir) {
                        clear_stale(lock_dir, &owner);
                        continue;
                    }
                }
                Err(e) => return Err(HoldfastError::io("Failed to create store lock", e)),
            }

            if started.elapsed() >= timeout {
                return Err(HoldfastError::LockTimeout {
                    path: lock_dir.to_path_buf(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            thread::sleep(Duration::from_millis(
                rng.gen_range(RETRY_MIN_MS..=RETRY_MAX_MS),
            ));
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Only remove the directory if we still own it.
        match read_meta(&self.dir) {
            Some(meta) if meta.owner == self.owner => {
                if let Err(e) = fs::remove_dir_all(&self.dir) {
                    tracing::warn!(error = %e, "Failed to release store lock");
                }
            }
            _ => {
                tracing::warn!(
                    path = %self.dir.display(),
                    "Store lock was taken over before release"
                );
            }
        }
    }
}

/// Returns Ok(false) if another holder already owns the directory.
fn try_create(lock_dir: &Path, owner: &str) -> std::io::Result<bool> {
    match std::fs::create_dir(lock_dir) {
        Ok(()) => {
            if let Err(e) = write_meta(lock_dir, owner) {
                let _ = fs::remove_dir_all(lock_dir);
                return Err(e);
            }
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Moves a stale lock aside before deleting it, so a lock created by a
/// faster waiter in the meantime is never removed in place.
fn clear_stale(lock_dir: &Path, owner: &str) {
    let tombstone = tombstone_path(lock_dir, owner);
    if std::fs::rename(lock_dir, &tombstone).is_err() {
        // Another waiter already moved it.
        return;
    }
    if !is_stale(&tombstone) {
        // Lost a race with a fresh holder; hand its lock back.
        tracing::warn!(path = %lock_dir.display(), "Stale lock was replaced before takeover");
        if std::fs::rename(&tombstone, lock_dir).is_ok() {
            return;
        }
    }
    tracing::debug!(path = %lock_dir.display(), "Taking over stale store lock");
    if let Err(e) = fs::remove_dir_all(&tombstone) {
        tracing::warn!(error = %e, "Failed to remove stale store lock");
    }
}

fn tombstone_path(lock_dir: &Path, owner: &str) -> PathBuf {
    let name = lock_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    lock_dir.with_file_name(format!("{}.stale-{}", name, owner))
}

fn write_meta(lock_dir: &Path, owner: &str) -> std::io::Result<()> {
    let pid = std::process::id();
    fs::write(lock_dir.join("pid"), pid.to_string())?;

    let meta = LockMeta {
        pid,
        owner: owner.to_string(),
        created: now_ms(),
    };
    let content = serde_json::to_string(&meta).map_err(std::io::Error::other)?;
    fs::write(lock_dir.join("meta.json"), content)
}

fn read_meta(lock_dir: &Path) -> Option<LockMeta> {
    let content = std::fs::read_to_string(lock_dir.join("meta.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn is_stale(lock_dir: &Path) -> bool {
    let now = now_ms();
    match read_meta(lock_dir) {
        Some(meta) => {
            !is_pid_alive(meta.pid) || now.saturating_sub(meta.created) > STALE_LOCK_MS
        }
        // Metadata not written yet (creator is between mkdir and write) or
        // the creator died mid-write. Fall back to the directory mtime.
        None => dir_age_ms(lock_dir, now).is_some_and(|age| age > STALE_LOCK_MS),
    }
}

fn dir_age_ms(dir: &Path, now: u64) -> Option<u64> {
    let modified = std::fs::metadata(dir).ok()?.modified().ok()?;
    let mtime = modified.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64;
    Some(now.saturating_sub(mtime))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: kill with signal 0 only performs the existence/permission check.
        #[allow(unsafe_code)]
        let result = unsafe { libc::kill(pid as i32, 0) };
        result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        {
            let lock = StoreLock::acquire(&lock_dir, Duration::from_secs(1)).unwrap();
            assert!(lock.path().is_dir());
            assert!(lock_dir.join("meta.json").exists());
        }
        assert!(!lock_dir.exists());
    }

    #[test]
    fn test_second_acquire_times_out_while_held() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        let _held = StoreLock::acquire(&lock_dir, Duration::from_secs(1)).unwrap();

        let err = StoreLock::acquire(&lock_dir, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, HoldfastError::LockTimeout { .. }));
    }

    #[test]
    fn test_lock_with_dead_pid_is_taken_over() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        std::fs::create_dir_all(&lock_dir).unwrap();
        std::fs::write(
            lock_dir.join("meta.json"),
            format!(
                r#"{{"pid": 99999999, "owner": "gone", "created": {}}}"#,
                now_ms()
            ),
        )
        .unwrap();

        let lock = StoreLock::acquire(&lock_dir, Duration::from_millis(200)).unwrap();
        assert!(lock.path().is_dir());
    }

    #[test]
    fn test_old_lock_is_taken_over() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        std::fs::create_dir_all(&lock_dir).unwrap();
        std::fs::write(
            lock_dir.join("meta.json"),
            format!(
                r#"{{"pid": {}, "owner": "old", "created": {}}}"#,
                std::process::id(),
                now_ms() - STALE_LOCK_MS - 1_000
            ),
        )
        .unwrap();

        assert!(StoreLock::acquire(&lock_dir, Duration::from_millis(200)).is_ok());
    }

    #[test]
    fn test_stale_takeover_leaves_no_tombstone() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        std::fs::create_dir_all(&lock_dir).unwrap();
        std::fs::write(
            lock_dir.join("meta.json"),
            format!(
                r#"{{"pid": 99999999, "owner": "gone", "created": {}}}"#,
                now_ms()
            ),
        )
        .unwrap();

        let lock = StoreLock::acquire(&lock_dir, Duration::from_millis(200)).unwrap();
        assert_ne!(read_meta(&lock_dir).unwrap().owner, "gone");
        drop(lock);

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "unexpected entries: {:?}", leftovers);
    }

    #[test]
    fn test_fresh_lock_is_restored_after_lost_takeover_race() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        let held = StoreLock::acquire(&lock_dir, Duration::from_secs(1)).unwrap();

        clear_stale(&lock_dir, "late-waiter");
        assert!(lock_dir.join("meta.json").exists());
        assert!(!tombstone_path(&lock_dir, "late-waiter").exists());
        drop(held);
        assert!(!lock_dir.exists());
    }

    #[test]
    fn test_release_does_not_remove_foreign_lock() {
        let temp = tempdir().unwrap();
        let lock_dir = temp.path().join("group.lock");
        let lock = StoreLock::acquire(&lock_dir, Duration::from_secs(1)).unwrap();

        // Simulate a takeover by another holder.
        write_meta(&lock_dir, "someone-else").unwrap();
        drop(lock);
        assert!(lock_dir.exists());
    }

    #[test]
    fn test_threads_are_mutually_excluded() {
        let temp = tempdir().unwrap();
        let lock_dir = Arc::new(temp.path().join("group.lock"));
        let inside = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock_dir = Arc::clone(&lock_dir);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let _lock = StoreLock::acquire(&lock_dir, Duration::from_secs(5)).unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
