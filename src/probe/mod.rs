//! Liveness reporting.
//!
//! A [`Probe`] holds the latest known availability of a service. A
//! [`FileController`] publishes it for external health checks by keeping a
//! file fresh while the service is available, and removing the file when
//! it is not. [`check_file`] is the other side: it tells whether such a
//! file was updated recently enough.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::{Duration, SystemTime},
};

use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::commons::{error::IoError, util::file};

//------------ ProbeStatus ---------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ProbeStatus {
    /// Nothing was reported yet.
    #[default]
    Unknown,
    Available,
    Unavailable(String),
}

impl ProbeStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeStatus::Available)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeStatus::Unknown => write!(f, "unknown"),
            ProbeStatus::Available => write!(f, "available"),
            ProbeStatus::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

//------------ Probe ---------------------------------------------------------

#[derive(Debug, Default)]
pub struct Probe {
    status: RwLock<ProbeStatus>,
}

impl Probe {
    pub fn new() -> Self {
        Probe::default()
    }

    /// Reports the outcome of the latest check.
    pub fn set_available(&self, res: Result<(), String>) {
        let status = match res {
            Ok(()) => ProbeStatus::Available,
            Err(reason) => ProbeStatus::Unavailable(reason),
        };

        match self.status.write() {
            Ok(mut current) => {
                if *current != status {
                    debug!("Liveness changed from {} to {}", current, status);
                }
                *current = status;
            }
            Err(mut poisoned) => **poisoned.get_mut() = status,
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status().is_available()
    }
}

//------------ ProbeOptions --------------------------------------------------

/// Where and how often the liveness file is updated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeOptions {
    pub path: PathBuf,
    pub update_interval: Duration,
}

impl ProbeOptions {
    pub fn is_valid(&self) -> bool {
        !self.path.as_os_str().is_empty() && !self.update_interval.is_zero()
    }
}

//------------ FileController ------------------------------------------------

#[derive(Debug)]
pub struct FileController {
    options: ProbeOptions,
    probe: Arc<Probe>,
}

impl FileController {
    pub fn new(options: ProbeOptions, probe: Arc<Probe>) -> Self {
        FileController { options, probe }
    }

    /// Brings the file in line with the current probe status.
    pub fn on_update(&self) -> Result<(), IoError> {
        if self.probe.is_available() {
            let now = chrono::Utc::now().to_rfc3339();
            file::save(now.as_bytes(), &self.options.path)
        } else {
            file::delete_file(&self.options.path)
        }
    }

    /// Spawns a task that runs `check` every `check_interval` and updates
    /// the file every update interval of the options.
    ///
    /// The task runs until aborted. The file is removed when it stops.
    pub fn spawn<F>(self, check_interval: Duration, check: F) -> JoinHandle<()>
    where
        F: Fn() + Send + 'static,
    {
        tokio::spawn(async move {
            let _cleanup = RemoveOnDrop(self.options.path.clone());

            let mut check_tick = tokio::time::interval(check_interval);
            let mut update_tick = tokio::time::interval(self.options.update_interval);
            loop {
                tokio::select! {
                    _ = check_tick.tick() => check(),
                    _ = update_tick.tick() => {
                        if let Err(e) = self.on_update() {
                            warn!("Could not update liveness file: {}", e);
                        }
                    }
                }
            }
        })
    }
}

struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(e) = file::delete_file(&self.0) {
            warn!("Could not remove liveness file: {}", e);
        }
    }
}

//------------ check_file ----------------------------------------------------

/// Checks that the liveness file exists and was updated within the
/// update interval.
pub fn check_file(path: &Path, update_interval: Duration) -> Result<(), ProbeError> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::Missing(path.to_path_buf())
            } else {
                ProbeError::IoError(IoError::new(
                    format!("Could not check: {}", path.to_string_lossy()),
                    e,
                ))
            }
        })?;

    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    if age > update_interval {
        Err(ProbeError::Stale {
            path: path.to_path_buf(),
            age,
        })
    } else {
        Ok(())
    }
}

//------------ ProbeError ----------------------------------------------------

#[derive(Debug)]
pub enum ProbeError {
    Missing(PathBuf),
    Stale { path: PathBuf, age: Duration },
    IoError(IoError),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeError::Missing(path) => {
                write!(f, "liveness file '{}' does not exist", path.to_string_lossy())
            }
            ProbeError::Stale { path, age } => write!(
                f,
                "liveness file '{}' was last updated {}s ago",
                path.to_string_lossy(),
                age.as_secs()
            ),
            ProbeError::IoError(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ProbeError {}

//------------ Tests ---------------------------------------------------------
