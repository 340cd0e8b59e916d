//! File-backed cache of the JSON documents the Unity Editor exports.
//!
//! The Editor writes a fixed set of files into the data directory. Each file
//! is parsed and cached under a key derived from its name. Change events are
//! debounced per filename so a multi-step write is read once, after it
//! settles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigDocument;
use crate::error::{ErrorCode, McpError, MessageKey};

pub const COMPILE_STATUS_FILE: &str = "compile-status.json";

/// Files the Editor exports. Anything else in the directory is ignored.
pub const DATA_FILES: &[&str] = &[
    "project-info.json",
    "scene-info.json",
    "gameobjects.json",
    "assets-info.json",
    "build-info.json",
    "editor-state.json",
    "console-logs.json",
    COMPILE_STATUS_FILE,
];

/// Quiet window before a changed file is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cache key for a data file: extension stripped, separators normalized.
///
/// `project-info.json` → `project_info`.
pub fn cache_key(file_name: &str) -> String {
    file_name
        .strip_suffix(".json")
        .unwrap_or(file_name)
        .replace(['-', '.', ' '], "_")
}

/// File name backing `key`, if it is one of [`DATA_FILES`].
pub fn file_for_key(key: &str) -> Option<&'static str> {
    DATA_FILES.iter().copied().find(|f| cache_key(f) == key)
}

/// `*suffix` matches by suffix, anything else by exact name.
pub fn matches_pattern(pattern: &str, file_name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => file_name.ends_with(suffix),
        None => file_name == pattern,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingReload {
    generation: u64,
    handle: JoinHandle<()>,
}

struct WatchHandle {
    _watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
}

struct Inner {
    directory: PathBuf,
    debounce: Duration,
    pattern: String,
    cache: RwLock<Arc<HashMap<String, Value>>>,
    timers: Mutex<HashMap<String, PendingReload>>,
    next_generation: AtomicU64,
    reloads: AtomicU64,
    watch: Mutex<Option<WatchHandle>>,
}

/// Cloneable handle to the cache and its debounce timers.
///
/// The cache has a single writer (the reload path) and any number of
/// readers.
#[derive(Clone)]
pub struct DataMonitor {
    inner: Arc<Inner>,
}

impl DataMonitor {
    pub fn new(
        directory: impl Into<PathBuf>,
        debounce: Duration,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory: directory.into(),
                debounce,
                pattern: pattern.into(),
                cache: RwLock::new(Arc::new(HashMap::new())),
                timers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                reloads: AtomicU64::new(0),
                watch: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &ConfigDocument) -> Self {
        Self::new(config.data_dir(), DEFAULT_DEBOUNCE, config.unity.watch_pattern.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Read every known file. Missing files are skipped (and evicted if they
    /// were cached before); unparseable files keep their previous value.
    /// Returns how many files were loaded.
    pub async fn load_all(&self) -> usize {
        let mut loaded = 0;
        for name in DATA_FILES {
            if self.inner.reload_file(name).await {
                loaded += 1;
            }
        }
        debug!("loaded {loaded} data file(s) from {}", self.inner.directory.display());
        loaded
    }

    /// Current cache contents. The snapshot is shared, not copied.
    pub fn get_all(&self) -> Arc<HashMap<String, Value>> {
        self.inner.cache.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_all().get(key).cloned()
    }

    /// Wait until `key` is cached, reading its file directly while waiting.
    pub async fn wait_for(&self, key: &str, timeout: Duration) -> Result<Value, McpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let file = file_for_key(key);

        loop {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }
            if let Some(file) = file {
                if self.inner.reload_file(file).await {
                    continue;
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(McpError::new(ErrorCode::Timeout, MessageKey::DataNotAvailable)
                    .with_param("key", key)
                    .with_param("path", self.inner.directory.display())
                    .with_context(json!({ "timeoutMs": timeout.as_millis() as u64 })));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    pub fn clear(&self) {
        let mut cache = self.inner.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Arc::new(HashMap::new());
    }

    /// Start watching the data directory (non-recursive), creating it if
    /// absent. Calling it again while already watching is a no-op.
    pub fn watch(&self) -> Result<(), McpError> {
        let mut slot = lock(&self.inner.watch);
        if slot.is_some() {
            return Ok(());
        }

        let dir = &self.inner.directory;
        std::fs::create_dir_all(dir).map_err(|e| watch_error(dir, e))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!("data directory watcher error: {e}"),
        })
        .map_err(|e| watch_error(dir, e))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(dir, e))?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let monitor = DataMonitor { inner };
                for name in relevant_files(&event, &monitor.inner.pattern) {
                    monitor.schedule_reload(&name);
                }
            }
        });

        info!("watching {} for Unity data changes", dir.display());
        *slot = Some(WatchHandle { _watcher: watcher, pump });
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.inner.watch).is_some()
    }

    /// (Re)start the quiet-window timer for `file_name`.
    ///
    /// Repeated calls within the window collapse into one reload.
    pub fn schedule_reload(&self, file_name: &str) {
        let mut timers = lock(&self.inner.timers);

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let name = file_name.to_string();
        let delay = self.inner.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(&name, generation).await;
            }
        });

        let pending = PendingReload { generation, handle };
        if let Some(previous) = timers.insert(file_name.to_string(), pending) {
            previous.handle.abort();
        }
    }

    /// Number of debounced reloads that have run.
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::Relaxed)
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.inner.timers).len()
    }

    /// Cancel every pending debounce timer.
    pub fn clear_timers(&self) {
        let mut timers = lock(&self.inner.timers);
        for (_, pending) in timers.drain() {
            pending.handle.abort();
        }
    }

    /// Stop watching and cancel pending timers.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.inner.watch).take() {
            handle.pump.abort();
        }
        self.clear_timers();
    }
}

impl Inner {
    async fn fire(&self, name: &str, generation: u64) {
        {
            let mut timers = lock(&self.timers);
            match timers.get(name) {
                Some(pending) if pending.generation == generation => {
                    timers.remove(name);
                }
                _ => return,
            }
        }

        self.reloads.fetch_add(1, Ordering::Relaxed);
        self.reload_file(name).await;
    }

    /// Re-read one data file into the cache. Returns whether a value was
    /// stored.
    async fn reload_file(&self, name: &str) -> bool {
        if !DATA_FILES.contains(&name) {
            debug!("ignoring untracked file {name}");
            return false;
        }

        let path = self.directory.join(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.evict(name);
                return false;
            }
            Err(e) => {
                warn!("cannot read {}: {e}", path.display());
                return false;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => {
                let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
                Arc::make_mut(&mut cache).insert(cache_key(name), value);
                debug!("reloaded {name}");
                true
            }
            Err(e) => {
                warn!("invalid JSON in {}, keeping previous value: {e}", path.display());
                false
            }
        }
    }

    /// Drop the cached value of a file that no longer exists.
    fn evict(&self, name: &str) {
        let key = cache_key(name);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.contains_key(&key) {
            Arc::make_mut(&mut cache).remove(&key);
            debug!("{name} removed, evicted {key}");
        }
    }
}

fn relevant_files(event: &Event, pattern: &str) -> Vec<String> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return Vec::new(),
    }

    event
        .paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter(|name| name.ends_with(".json") && matches_pattern(pattern, name))
        .map(str::to_string)
        .collect()
}

fn watch_error(dir: &Path, err: impl ToString) -> McpError {
    McpError::new(ErrorCode::ConnectionFailed, MessageKey::DataDirUnavailable)
        .with_param("path", dir.display())
        .with_param("reason", err)
}
