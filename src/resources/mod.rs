//! Process-wide resource accounting and cleanup.
//!
//! The resource manager owns the heap/fd watermarks, a priority-ordered
//! set of cleanup tasks, and the registry of temporary artifacts. Caches
//! and stores register cleanup tasks at boot; the manager runs them when
//! a watermark trips or on the periodic GC interval.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::ResourceConfig;
use crate::error::{Error, Result};

/// Memory pressure classification against the configured heap budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStatus {
    Normal,
    Warning,
    Critical,
}

/// A cleanup action returning the approximate bytes it freed.
type CleanupFn = Box<dyn Fn() -> Result<usize> + Send + Sync>;

struct CleanupTask {
    name: String,
    /// Higher runs first.
    priority: u8,
    /// A failing critical task aborts the rest of the chain.
    critical: bool,
    action: CleanupFn,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupOutcome {
    pub tasks_run: usize,
    pub bytes_freed: usize,
    /// Name of the critical task that aborted the chain, if any.
    pub aborted_by: Option<String>,
}

/// Process-wide resource manager.
pub struct ResourceManager {
    config: ResourceConfig,
    tracked_bytes: AtomicUsize,
    tracked_fds: AtomicUsize,
    tasks: Mutex<Vec<CleanupTask>>,
    temp_artifacts: Mutex<Vec<PathBuf>>,
}

impl ResourceManager {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            tracked_bytes: AtomicUsize::new(0),
            tracked_fds: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
            temp_artifacts: Mutex::new(Vec::new()),
        }
    }

    // ==================== Accounting ====================

    /// Record an allocation against the heap budget.
    pub fn register_usage(&self, bytes: usize) {
        self.tracked_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn release_usage(&self, bytes: usize) {
        let mut current = self.tracked_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.tracked_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn register_fd(&self) {
        self.tracked_fds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release_fd(&self) {
        let _ = self
            .tracked_fds
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn tracked_bytes(&self) -> usize {
        self.tracked_bytes.load(Ordering::Relaxed)
    }

    /// Classify current usage against the watermarks.
    pub fn memory_status(&self) -> MemoryStatus {
        let used = self.tracked_bytes.load(Ordering::Relaxed) as f64;
        let budget = self.config.max_heap_bytes as f64;
        let pct = if budget > 0.0 {
            used / budget * 100.0
        } else {
            0.0
        };

        if pct >= self.config.memory_critical_pct as f64 {
            MemoryStatus::Critical
        } else if pct >= self.config.memory_warning_pct as f64 {
            MemoryStatus::Warning
        } else {
            MemoryStatus::Normal
        }
    }

    pub fn fd_headroom(&self) -> bool {
        self.tracked_fds.load(Ordering::Relaxed) < self.config.max_file_descriptors
    }

    // ==================== Cleanup chain ====================

    /// Register a cleanup task. Higher priority runs first; a failing
    /// critical task aborts the remaining chain.
    pub fn register_cleanup_task(
        &self,
        name: impl Into<String>,
        priority: u8,
        critical: bool,
        action: impl Fn() -> Result<usize> + Send + Sync + 'static,
    ) {
        let mut tasks = self.tasks.lock().expect("cleanup task lock poisoned");
        tasks.push(CleanupTask {
            name: name.into(),
            priority,
            critical,
            action: Box::new(action),
        });
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Run the full cleanup chain and release temp artifacts.
    pub fn run_cleanup(&self) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        let tasks = self.tasks.lock().expect("cleanup task lock poisoned");
        for task in tasks.iter() {
            match (task.action)() {
                Ok(freed) => {
                    outcome.tasks_run += 1;
                    outcome.bytes_freed += freed;
                    debug!("Cleanup task '{}' freed ~{} bytes", task.name, freed);
                }
                Err(e) if task.critical => {
                    warn!("Critical cleanup task '{}' failed: {e}; aborting chain", task.name);
                    outcome.aborted_by = Some(task.name.clone());
                    break;
                }
                Err(e) => {
                    warn!("Cleanup task '{}' failed: {e}", task.name);
                }
            }
        }
        drop(tasks);

        outcome.bytes_freed += self.release_temp_artifacts();
        self.release_usage(outcome.bytes_freed);
        outcome
    }

    /// Run cleanup if memory is critical; error if still critical after.
    pub fn check_and_reclaim(&self) -> Result<()> {
        if self.memory_status() != MemoryStatus::Critical {
            return Ok(());
        }

        info!("Memory critical; running cleanup chain");
        let outcome = self.run_cleanup();

        if self.memory_status() == MemoryStatus::Critical {
            return Err(Error::ResourceExhausted(format!(
                "heap still critical after cleanup freed {} bytes",
                outcome.bytes_freed
            )));
        }
        Ok(())
    }

    // ==================== Temp artifacts ====================

    /// Track a temporary file for guaranteed release.
    pub fn register_temp_artifact(&self, path: impl AsRef<Path>) {
        self.temp_artifacts
            .lock()
            .expect("temp artifact lock poisoned")
            .push(path.as_ref().to_path_buf());
    }

    /// Delete all tracked artifacts; returns bytes reclaimed.
    pub fn release_temp_artifacts(&self) -> usize {
        let mut artifacts = self
            .temp_artifacts
            .lock()
            .expect("temp artifact lock poisoned");
        let mut freed = 0;
        for path in artifacts.drain(..) {
            if let Ok(meta) = std::fs::metadata(&path) {
                freed += meta.len() as usize;
            }
            if let Err(e) = std::fs::remove_file(&path) {
                if path.exists() {
                    warn!("Failed to remove temp artifact {}: {e}", path.display());
                }
            }
        }
        freed
    }

    /// Spawn the periodic GC loop. Returns the task handle so the owner
    /// can abort it at shutdown.
    pub fn spawn_gc(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.enable_auto_gc {
            return None;
        }
        let manager = Arc::clone(self);
        let interval = std::time::Duration::from_millis(self.config.gc_interval_ms.max(1_000));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if manager.memory_status() != MemoryStatus::Normal {
                    manager.run_cleanup();
                }
            }
        }))
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.release_temp_artifacts();
    }
}
