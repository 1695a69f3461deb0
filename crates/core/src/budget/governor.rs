//! Disk budget governor implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

use super::config::DiskBudgetConfig;

/// Outcome of an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The estimated bytes are reserved; the caller may start writing.
    Admitted,
    /// Not enough budget. The caller must not start and should re-poll
    /// after other work completes or cleanup frees space.
    Deferred {
        /// Bytes that were requested.
        requested: u64,
        /// Bytes currently available under the ceiling.
        available: u64,
    },
}

impl Admission {
    /// Returns true if the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

struct Inner {
    /// Sum of estimates for admitted, not-yet-committed operations.
    reserved: u64,
    /// Bytes on disk under the working directory, per the last walk
    /// plus commit/reclaim bookkeeping since.
    measured: u64,
    last_refresh: Option<Instant>,
}

/// Tracks consumed local storage and gates disk-consuming work.
///
/// Process-wide, one instance per run. All decisions are serialized
/// behind a mutex; the periodic re-measurement walks the working
/// directory so bookkeeping drift self-corrects.
pub struct DiskBudget {
    config: DiskBudgetConfig,
    work_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl DiskBudget {
    /// Creates a governor over `work_dir` with the given config.
    pub fn new(config: DiskBudgetConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            inner: Mutex::new(Inner {
                reserved: 0,
                measured: 0,
                last_refresh: None,
            }),
        }
    }

    /// Requests admission for an operation expected to write
    /// `estimated_bytes`. Full-or-nothing: either the whole estimate is
    /// reserved or the request is deferred.
    pub fn admit(&self, estimated_bytes: u64) -> Admission {
        let mut inner = self.inner.lock().unwrap();

        let stale = match inner.last_refresh {
            None => true,
            Some(at) => at.elapsed().as_millis() as u64 >= self.config.refresh_interval_ms,
        };
        if stale {
            inner.measured = measure_usage(&self.work_dir);
            inner.last_refresh = Some(Instant::now());
            debug!(measured_bytes = inner.measured, "disk usage re-measured");
        }

        let Some(ceiling) = self.config.ceiling_bytes else {
            inner.reserved = inner.reserved.saturating_add(estimated_bytes);
            return Admission::Admitted;
        };

        let consumed = inner.measured.saturating_add(inner.reserved);
        let available = ceiling.saturating_sub(consumed);
        if estimated_bytes <= available {
            inner.reserved = inner.reserved.saturating_add(estimated_bytes);
            Admission::Admitted
        } else {
            debug!(
                requested = estimated_bytes,
                available, "admission deferred: over disk budget"
            );
            Admission::Deferred {
                requested: estimated_bytes,
                available,
            }
        }
    }

    /// Converts a reservation into measured usage once the operation has
    /// finished writing: `estimated_bytes` must match the admitted
    /// estimate, `actual_bytes` is what landed on disk.
    pub fn commit(&self, estimated_bytes: u64, actual_bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.reserved = inner.reserved.saturating_sub(estimated_bytes);
        inner.measured = inner.measured.saturating_add(actual_bytes);
    }

    /// Releases a reservation for an operation that wrote nothing
    /// (deferred start, failed before first byte).
    pub fn release(&self, estimated_bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.reserved = inner.reserved.saturating_sub(estimated_bytes);
    }

    /// Subtracts bytes removed by cleanup from the measured figure.
    pub fn reclaim(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.measured = inner.measured.saturating_sub(bytes);
    }

    /// Forces a re-measurement of the working directory.
    pub fn refresh(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.measured = measure_usage(&self.work_dir);
        inner.last_refresh = Some(Instant::now());
    }

    /// Bytes currently available under the ceiling, `u64::MAX` when
    /// unlimited. Recomputed from the current bookkeeping, not re-walked.
    pub fn available(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        match self.config.ceiling_bytes {
            None => u64::MAX,
            Some(ceiling) => ceiling.saturating_sub(inner.measured.saturating_add(inner.reserved)),
        }
    }

    /// Sum of estimates for admitted, not-yet-committed operations.
    pub fn reserved(&self) -> u64 {
        self.inner.lock().unwrap().reserved
    }
}

/// Walks `root` and sums regular file sizes. Unreadable entries are
/// skipped with a warning rather than failing the admission path.
fn measure_usage(root: &Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if dir != root {
                    warn!(path = %dir.display(), "skipping unreadable directory: {}", e);
                }
                continue;
            }
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Ok(meta) = entry.metadata() {
                    total = total.saturating_add(meta.len());
                }
            }
        }
    }
    total
}
