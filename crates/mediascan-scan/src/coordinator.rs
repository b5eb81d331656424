//! Scan coordinator: walkers feed a bounded queue drained by probe workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::GlobSet;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

use mediascan_core::{
    FileInfo, MountPoint, ScanError, ScanEvent, ScanOptions, ScanReport, ScanState, ScanWarning,
};
use mediascan_probe::{MediaProbe, Prober};

use crate::mount::{SystemVolumes, VolumeResolver};
use crate::progress::{ScanCounters, Tally};
use crate::volumes::{PathTracker, VolumeTracker};
use crate::walker::{Walker, compile_ignore_patterns};

/// Dispatch queue slots per probe worker.
pub const DISPATCH_SLOTS_PER_WORKER: usize = 4;

/// Entry point for media scans.
///
/// A scanner is cheap to clone and can start any number of independent
/// jobs; all per-job state lives in the job.
#[derive(Clone)]
pub struct MediaScanner {
    resolver: Arc<dyn VolumeResolver>,
    prober: Arc<dyn MediaProbe>,
}

impl std::fmt::Debug for MediaScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaScanner").finish_non_exhaustive()
    }
}

impl Default for MediaScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaScanner {
    /// Create a scanner that queries the operating system for volumes.
    pub fn new() -> Self {
        Self::with_resolver(SystemVolumes)
    }

    /// Create a scanner with a custom volume resolver.
    pub fn with_resolver(resolver: impl VolumeResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            prober: Arc::new(Prober::default()),
        }
    }

    /// Replace the prober used by workers.
    pub fn with_prober(mut self, prober: impl MediaProbe + 'static) -> Self {
        self.prober = Arc::new(prober);
        self
    }

    /// Start a scan job over `roots`.
    ///
    /// Returns once the job is running; results arrive through the
    /// returned handle. Must be called from within a Tokio runtime.
    ///
    /// Fails when the options are invalid or none of the roots exists.
    /// Roots that do not exist while others do are reported as warnings at
    /// the start of the stream.
    pub fn scan<I, P>(&self, roots: I, options: &ScanOptions) -> Result<ScanHandle, ScanError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        options.validate()?;
        let queue_slots = options
            .max_concurrency
            .checked_mul(DISPATCH_SLOTS_PER_WORKER)
            .ok_or_else(|| ScanError::invalid_config("max_concurrency is too large"))?;
        let ignore = compile_ignore_patterns(&options.ignore_patterns)?;

        let mut attempted = 0;
        let mut valid: Vec<PathBuf> = Vec::new();
        let mut missing = Vec::new();
        for root in roots {
            attempted += 1;
            let root = root.as_ref();
            match root.canonicalize() {
                Ok(canonical) if !valid.contains(&canonical) => valid.push(canonical),
                Ok(_) => {}
                Err(e) => missing.push(ScanWarning::from_io(root, &e)),
            }
        }
        if valid.is_empty() {
            return Err(ScanError::NoValidRoots { attempted });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ScanError::NoRuntime)?;

        let (event_tx, event_rx) = mpsc::channel(options.event_buffer);
        let (state_tx, state_rx) = watch::channel(ScanState::Running);
        let cancel = CancellationToken::new();

        let ctx = Arc::new(ScanContext {
            options: options.clone(),
            prober: Arc::clone(&self.prober),
            resolver: Arc::clone(&self.resolver),
            volumes: VolumeTracker::new(),
            paths: PathTracker::new(),
            counters: ScanCounters::new(),
            events: event_tx,
            cancel: cancel.clone(),
        });

        tracing::info!(roots = valid.len(), workers = options.max_concurrency, "scan started");
        runtime.spawn(run_job(ctx, valid, ignore, missing, queue_slots, state_tx));

        Ok(ScanHandle {
            events: event_rx,
            cancel,
            state: state_rx,
        })
    }
}

/// Handle to a running scan job.
///
/// Dropping the handle cancels the job.
#[derive(Debug)]
pub struct ScanHandle {
    events: mpsc::Receiver<ScanEvent>,
    cancel: CancellationToken,
    state: watch::Receiver<ScanState>,
}

impl ScanHandle {
    /// Next event, or `None` after the terminal event.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Request cancellation. A `Cancelled` event follows once every walker
    /// and worker has stopped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this job, for wiring to signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Drain every remaining event into a report.
    pub async fn collect(mut self) -> ScanReport {
        let mut report = ScanReport::default();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            report.record(event);
            if terminal {
                break;
            }
        }
        report
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by one scan job and shared by its walkers and workers.
struct ScanContext {
    options: ScanOptions,
    prober: Arc<dyn MediaProbe>,
    resolver: Arc<dyn VolumeResolver>,
    volumes: VolumeTracker,
    paths: PathTracker,
    counters: ScanCounters,
    events: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
}

impl ScanContext {
    /// Send an event unless the job is cancelled. Returns whether it was
    /// delivered.
    async fn emit(&self, event: ScanEvent) -> bool {
        let tally = Tally::of(&event);
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            result = self.events.send(event) => result.is_ok(),
        };

        if sent {
            self.counters.record(tally);
        } else if !self.cancel.is_cancelled() {
            tracing::debug!("event consumer went away, cancelling scan");
            self.cancel.cancel();
        }
        sent
    }

    async fn warn(&self, warning: ScanWarning) -> bool {
        tracing::debug!(
            path = %warning.path.display(),
            kind = %warning.kind,
            "{}",
            warning.message
        );
        self.emit(ScanEvent::Warning { warning }).await
    }
}

async fn run_job(
    ctx: Arc<ScanContext>,
    roots: Vec<PathBuf>,
    ignore: Option<GlobSet>,
    missing: Vec<ScanWarning>,
    queue_slots: usize,
    state_tx: watch::Sender<ScanState>,
) {
    for warning in missing {
        ctx.warn(warning).await;
    }

    let workers = ctx.options.max_concurrency;
    let (path_tx, path_rx) = mpsc::channel::<PathBuf>(queue_slots);

    let walkers: Vec<_> = roots
        .into_iter()
        .map(|root| {
            let walker = Walker::with_ignore(root, &ctx.options, ignore.clone());
            let ctx = Arc::clone(&ctx);
            let path_tx = path_tx.clone();
            let runtime = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || walk_root(walker, &ctx, &path_tx, &runtime))
        })
        .collect();
    drop(path_tx);

    // Workers own the only receiver handles; once they all stop, walkers
    // blocked on a full queue are released.
    let queue = Arc::new(Mutex::new(path_rx));
    let pool: Vec<_> = (0..workers)
        .map(|_| tokio::spawn(worker(Arc::clone(&ctx), Arc::clone(&queue))))
        .collect();
    drop(queue);

    for task in pool {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "probe worker failed");
        }
    }
    for task in walkers {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "walker failed");
        }
    }

    let state = if ctx.cancel.is_cancelled() {
        ScanState::Cancelled
    } else {
        ScanState::Completed
    };
    let summary = ctx.counters.summary(state);
    tracing::info!(
        files = summary.files,
        mounts = summary.mounts,
        warnings = summary.warnings,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        ?state,
        "scan finished"
    );

    let _ = state_tx.send(state);
    let terminal = match state {
        ScanState::Cancelled => ScanEvent::Cancelled { summary },
        _ => ScanEvent::Done { summary },
    };
    // Nothing else can be sent after this; a departed consumer is fine
    let _ = ctx.events.send(terminal).await;
}

/// Feed one root's files into the dispatch queue. Runs on a blocking thread.
fn walk_root(
    walker: Walker,
    ctx: &ScanContext,
    queue: &mpsc::Sender<PathBuf>,
    runtime: &tokio::runtime::Handle,
) {
    let root = walker.root().to_path_buf();
    tracing::debug!(root = %root.display(), "walking");

    for item in walker {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let delivered = match item {
            Ok(path) => queue.blocking_send(path).is_ok(),
            Err(warning) => runtime.block_on(ctx.warn(warning)),
        };
        if !delivered {
            break;
        }
    }

    tracing::debug!(root = %root.display(), "walk finished");
}

async fn worker(ctx: Arc<ScanContext>, queue: Arc<Mutex<mpsc::Receiver<PathBuf>>>) {
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            path = async { queue.lock().await.recv().await } => path,
        };
        let Some(path) = next else {
            break;
        };

        if !ctx.paths.claim(&path) {
            tracing::trace!(path = %path.display(), "already claimed");
            continue;
        }

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = process(&ctx, path) => {}
        }
    }
}

/// Outcome of probing one file that did not yield a full record.
struct ProbeFailure {
    warning: ScanWarning,
    partial: Option<FileInfo>,
}

/// Probe, attribute and report a single file.
async fn process(ctx: &ScanContext, path: PathBuf) {
    let file = match probe(ctx, path).await {
        Ok(file) => file,
        Err(failure) => {
            ctx.warn(failure.warning).await;
            match failure.partial {
                Some(partial) => partial,
                None => return,
            }
        }
    };

    let volume = attribute(ctx, &file.path).await;
    ctx.emit(ScanEvent::FileInfoReady { file, volume }).await;
}

async fn probe(ctx: &ScanContext, path: PathBuf) -> Result<FileInfo, ProbeFailure> {
    let prober = Arc::clone(&ctx.prober);
    let target = path.clone();
    let task = tokio::task::spawn_blocking(move || prober.probe(&target));

    let joined = match ctx.options.probe_timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                let reason = format!("probe timed out after {limit:?}");
                return Err(ProbeFailure {
                    warning: ScanWarning::unreadable(&path, reason),
                    partial: None,
                });
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(file)) => Ok(file),
        Ok(Err(e)) => Err(ProbeFailure {
            warning: e.to_warning(),
            partial: e.into_partial(),
        }),
        Err(e) => Err(ProbeFailure {
            warning: ScanWarning::unreadable(&path, format!("probe task failed: {e}")),
            partial: None,
        }),
    }
}

/// Resolve the volume holding `path`, emitting `MountPointReady` the first
/// time a volume is seen. Returns the volume root.
async fn attribute(ctx: &ScanContext, path: &Path) -> PathBuf {
    let resolver = Arc::clone(&ctx.resolver);
    let lookup = path.to_path_buf();
    let root = tokio::task::spawn_blocking(move || resolver.volume_root(&lookup)).await;

    let (key, failure) = match root {
        Ok(Ok(root)) => (root, None),
        Ok(Err(e)) => (fallback_root(path), Some(e.to_string())),
        Err(e) => (fallback_root(path), Some(format!("volume lookup failed: {e}"))),
    };

    let mount = ctx
        .volumes
        .get_or_resolve(&key, || async {
            let mount = match failure {
                Some(reason) => unavailable(ctx, &key, reason).await,
                None => {
                    let resolver = Arc::clone(&ctx.resolver);
                    let root = key.clone();
                    match tokio::task::spawn_blocking(move || resolver.capacity(&root)).await {
                        Ok(Ok(mount)) => mount,
                        Ok(Err(e)) => unavailable(ctx, &key, e).await,
                        Err(e) => unavailable(ctx, &key, e).await,
                    }
                }
            };
            ctx.emit(ScanEvent::MountPointReady {
                mount: mount.clone(),
            })
            .await;
            mount
        })
        .await;

    mount.path
}

async fn unavailable(ctx: &ScanContext, root: &Path, reason: impl std::fmt::Display) -> MountPoint {
    ctx.warn(ScanWarning::volume_unavailable(root, reason)).await;
    MountPoint::unavailable(root)
}

/// Key for a file whose volume could not be found: its directory.
fn fallback_root(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .to_path_buf()
}
