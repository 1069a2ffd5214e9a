use super::error::{create_dir_error, StateError};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_RETRY: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retry_interval: DEFAULT_LOCK_RETRY,
        }
    }
}

// The lock file exists exactly as long as this value.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.file.take().is_none() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove lock file"
                );
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

pub fn acquire(lock_path: &Path, options: LockOptions) -> Result<FileLock, StateError> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|source| create_dir_error(parent, source))?;
    }

    let start = Instant::now();
    let mut contended = false;
    loop {
        match fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let recorded = file
                    .write_all(std::process::id().to_string().as_bytes())
                    .and_then(|()| file.sync_all());
                if let Err(source) = recorded {
                    drop(file);
                    let _ = fs::remove_file(lock_path);
                    return Err(StateError::Lock {
                        path: lock_path.display().to_string(),
                        source,
                    });
                }
                if contended {
                    tracing::debug!(
                        path = %lock_path.display(),
                        waited_ms = start.elapsed().as_millis() as u64,
                        "acquired contended lock"
                    );
                }
                return Ok(FileLock {
                    path: lock_path.to_path_buf(),
                    file: Some(file),
                });
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                contended = true;
                if clear_dead_holder(lock_path) {
                    continue;
                }
                let elapsed = start.elapsed();
                if elapsed >= options.timeout {
                    return Err(StateError::LockTimeout {
                        path: lock_path.display().to_string(),
                        waited_ms: elapsed.as_millis() as u64,
                    });
                }
                let remaining = options.timeout - elapsed;
                thread::sleep(options.retry_interval.min(remaining));
            }
            Err(source) => {
                return Err(StateError::Lock {
                    path: lock_path.display().to_string(),
                    source,
                })
            }
        }
    }
}

// A holder that died without releasing leaves its pid behind. An empty or
// unreadable file may belong to a holder that has not written its pid yet.
fn clear_dead_holder(lock_path: &Path) -> bool {
    let Some(pid) = read_lock_pid(lock_path) else {
        return false;
    };
    if pid == std::process::id() || is_process_alive(pid) {
        return false;
    }
    match fs::remove_file(lock_path) {
        Ok(()) => {
            tracing::warn!(path = %lock_path.display(), pid, "removed lock left by dead process");
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!(
                path = %lock_path.display(),
                pid,
                error = %err,
                "failed to remove stale lock"
            );
            false
        }
    }
}

fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    fs::read_to_string(lock_path)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid != 0)
}

pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use std::process::{Command, Stdio};
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(true)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

pub fn with_lock<T, E>(
    lock_path: &Path,
    options: LockOptions,
    body: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StateError>,
{
    let lock = acquire(lock_path, options)?;
    let result = body();
    lock.release();
    result
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("state");
    target.with_file_name(format!("{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_a_lock_removes_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("threads.json.lock");
        {
            let _lock = acquire(&path, LockOptions::default()).expect("acquire");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn release_tolerates_lock_file_already_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.lock");
        let lock = acquire(&path, LockOptions::default()).expect("acquire");
        fs::remove_file(&path).expect("remove");
        lock.release();
    }

    #[test]
    fn lock_path_sits_next_to_target() {
        assert_eq!(
            lock_path_for(Path::new("/r/state/threads.json")),
            PathBuf::from("/r/state/threads.json.lock")
        );
    }
}
