//! Scan session state machine and worker pool.

use super::{
    CancellationToken, ScanRequest, ScanTarget, SessionCounters, SessionLogger, SessionReport,
    TargetSummary, ThroughputMeter,
};
use crate::core::catalog::{
    CatalogStore, Category, Component, DirectoryRecord, FileRecord, PerformanceMetrics,
    ScanSession, SessionStatus,
};
use crate::core::metadata::ExtractorChain;
use crate::core::scanner::{ExclusionFilter, PhotoFormat, TreeWalker, WalkEntry};
use crate::error::{ErrorDetail, ScanError, SessionError, StoreError};
use crate::events::{
    null_sender, Event, EventSender, ScanEvent, ScanProgress, SessionEvent, SessionPhase,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Failure cause recorded when the cancellation token fires
pub const INTERRUPTED: &str = "interrupted";

/// Builder for [`ScanOrchestrator`]
pub struct ScanOrchestratorBuilder {
    store: Arc<dyn CatalogStore>,
    chain: ExtractorChain,
    token: CancellationToken,
}

impl ScanOrchestratorBuilder {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            chain: ExtractorChain::standard(),
            token: CancellationToken::new(),
        }
    }

    /// Set the metadata extractor chain
    pub fn extractor(mut self, chain: ExtractorChain) -> Self {
        self.chain = chain;
        self
    }

    /// Share an interrupt flag with the caller
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn build(self) -> ScanOrchestrator {
        ScanOrchestrator {
            store: self.store,
            chain: self.chain,
            token: self.token,
        }
    }
}

/// Drives scan sessions against one catalog
pub struct ScanOrchestrator {
    store: Arc<dyn CatalogStore>,
    chain: ExtractorChain,
    token: CancellationToken,
}

impl ScanOrchestrator {
    pub fn builder(store: Arc<dyn CatalogStore>) -> ScanOrchestratorBuilder {
        ScanOrchestratorBuilder::new(store)
    }

    /// Token that interrupts running sessions when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run a session without events
    pub fn run(&self, request: &ScanRequest) -> Result<SessionReport, SessionError> {
        self.run_with_events(request, &null_sender())
    }

    /// Run a session with event reporting.
    ///
    /// Returns `Ok` for every session that reached a terminal state on its
    /// own terms, including an interrupted one (status `failed`, cause
    /// `interrupted`). Returns `Err` when the session could not be
    /// established, the request was invalid, or the catalog became
    /// unreachable mid-scan.
    pub fn run_with_events(
        &self,
        request: &ScanRequest,
        events: &EventSender,
    ) -> Result<SessionReport, SessionError> {
        events.send(Event::Session(SessionEvent::StateChanged {
            state: SessionPhase::Initializing,
        }));

        self.store.ping().map_err(SessionError::Establish)?;

        let session_id = Uuid::new_v4().to_string();
        let mut session = ScanSession::new(
            &session_id,
            &request.scan_type,
            request.targets.iter().map(|t| t.path.clone()).collect(),
        );
        self.store
            .create_session(&session)
            .map_err(SessionError::Establish)?;

        let logger = SessionLogger::new(Arc::clone(&self.store), &session_id);
        events.send(Event::Session(SessionEvent::Started {
            session_id: session_id.clone(),
            targets: session.targets.clone(),
        }));

        let (filter, pool) = match prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => {
                logger.error(
                    Component::ScanOrchestrator,
                    format!("Session rejected: {}", e),
                    ErrorDetail::new("invalid_request", e.to_string()),
                );
                session.status = SessionStatus::Failed;
                session.failure_cause = Some(e.to_string());
                session.ended_at = Some(Utc::now());
                if let Err(store_err) = self.store.update_session(&session) {
                    warn!(session_id = %session_id, error = %store_err, "Could not record rejected session");
                }
                events.send(Event::Session(SessionEvent::Failed {
                    summary: SessionReport {
                        session,
                        targets: Vec::new(),
                    }
                    .summary(),
                    cause: e.to_string(),
                }));
                return Err(e);
            }
        };

        events.send(Event::Session(SessionEvent::StateChanged {
            state: SessionPhase::Running,
        }));
        logger.info(
            Component::ScanOrchestrator,
            format!(
                "Scanning {} target(s) with {} worker(s)",
                request.targets.len(),
                request.concurrency
            ),
        );

        let chain = match request.extraction_timeout {
            Some(timeout) => self.chain.clone().with_timeout(Some(timeout)),
            None => self.chain.clone(),
        };
        let run = ScanRun {
            session_id: session_id.clone(),
            store: self.store.as_ref(),
            chain,
            logger,
            counters: SessionCounters::new(),
            meter: ThroughputMeter::new(request.sample_every),
            concurrency: request.concurrency,
            checkpoint: Mutex::new(session.clone()),
            arena: Mutex::new(BTreeMap::new()),
            fatal: OnceLock::new(),
            token: &self.token,
            events,
        };

        let mut summaries = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            if run.should_stop() {
                break;
            }
            summaries.push(run.walk_target(target, request.recursive, &filter, &pool));
        }

        // Second pass: parents are inserted before their children
        if run.fatal_cause().is_none() {
            run.persist_directories();
        }

        events.send(Event::Session(SessionEvent::StateChanged {
            state: SessionPhase::Finalizing,
        }));

        session.counts = run.counters.snapshot();
        session.metrics = run.metrics();
        session.ended_at = Some(Utc::now());

        let fatal = run.fatal_cause();
        let cause = fatal
            .clone()
            .or_else(|| self.token.is_cancelled().then(|| INTERRUPTED.to_string()));

        match &cause {
            Some(cause) => {
                session.status = SessionStatus::Failed;
                session.failure_cause = Some(cause.clone());
                let kind = if fatal.is_some() {
                    "store_unavailable"
                } else {
                    INTERRUPTED
                };
                run.logger.error(
                    Component::ScanOrchestrator,
                    format!(
                        "Session failed after {} files: {}",
                        session.counts.files_processed, cause
                    ),
                    ErrorDetail::new(kind, cause.clone()),
                );
            }
            None => {
                session.status = SessionStatus::Completed;
                run.logger.info(
                    Component::ScanOrchestrator,
                    format!(
                        "Session completed: {} processed, {} succeeded, {} failed, {} directories",
                        session.counts.files_processed,
                        session.counts.files_succeeded,
                        session.counts.files_failed,
                        session.counts.directories_processed
                    ),
                );
            }
        }

        let persisted = self.store.update_session(&session);
        let report = SessionReport {
            session,
            targets: summaries,
        };
        let summary = report.summary();

        let fatal = match (fatal, persisted) {
            (Some(cause), persisted) => {
                if let Err(e) = persisted {
                    error!(session_id = %session_id, error = %e, "Could not persist failed session state");
                }
                Some(cause)
            }
            (None, Err(e)) => Some(e.to_string()),
            (None, Ok(())) => None,
        };

        if let Some(cause) = fatal {
            events.send(Event::Session(SessionEvent::Failed {
                summary,
                cause: cause.clone(),
            }));
            events.send(Event::Session(SessionEvent::StateChanged {
                state: SessionPhase::Failed,
            }));
            return Err(SessionError::Fatal { session_id, cause });
        }

        if report.is_completed() {
            events.send(Event::Session(SessionEvent::Completed { summary }));
            events.send(Event::Session(SessionEvent::StateChanged {
                state: SessionPhase::Completed,
            }));
        } else {
            events.send(Event::Session(SessionEvent::Failed {
                summary,
                cause: INTERRUPTED.to_string(),
            }));
            events.send(Event::Session(SessionEvent::StateChanged {
                state: SessionPhase::Failed,
            }));
        }

        Ok(report)
    }
}

/// Check the request and build the exclusion filter and worker pool
fn prepare(request: &ScanRequest) -> Result<(ExclusionFilter, ThreadPool), SessionError> {
    if request.targets.is_empty() {
        return Err(SessionError::NoTargets);
    }
    if request.concurrency == 0 {
        return Err(SessionError::InvalidSettings(
            "concurrency must be at least 1".to_string(),
        ));
    }

    let filter = ExclusionFilter::new(&request.exclude_patterns)
        .map_err(|e| SessionError::InvalidSettings(e.to_string()))?;

    for target in &request.targets {
        let reason = if !target.path.exists() {
            Some("does not exist")
        } else if !target.path.is_dir() {
            Some("is not a directory")
        } else if filter.is_excluded(&target.path) {
            Some("matches an exclusion pattern")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(SessionError::InvalidTarget {
                path: target.path.clone(),
                reason: reason.to_string(),
            });
        }
    }

    // A nested target would walk its files twice in one session
    for (i, target) in request.targets.iter().enumerate() {
        let path = normalize(&target.path);
        let enclosing = request
            .targets
            .iter()
            .enumerate()
            .find(|(j, other)| *j != i && path.starts_with(normalize(&other.path)));
        if let Some((_, other)) = enclosing {
            return Err(SessionError::InvalidTarget {
                path: target.path.clone(),
                reason: format!("overlaps target {}", other.path.display()),
            });
        }
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(request.concurrency)
        .thread_name(|i| format!("scan-worker-{}", i))
        .build()
        .map_err(|e| SessionError::InvalidSettings(e.to_string()))?;

    Ok((filter, pool))
}

/// `a/./b/` and `a/b` share one arena slot
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Directory seen during the walk, persisted after it
#[derive(Debug, Clone, Copy)]
struct PendingDirectory {
    depth: usize,
    category: Option<Category>,
}

/// State shared by the workers of one session
struct ScanRun<'a> {
    session_id: String,
    store: &'a dyn CatalogStore,
    chain: ExtractorChain,
    logger: SessionLogger,
    counters: SessionCounters,
    meter: ThroughputMeter,
    concurrency: usize,
    /// Running copy of the session row, rewritten on every throughput sample
    checkpoint: Mutex<ScanSession>,
    arena: Mutex<BTreeMap<PathBuf, PendingDirectory>>,
    /// First connection-level store fault
    fatal: OnceLock<String>,
    token: &'a CancellationToken,
    events: &'a EventSender,
}

impl ScanRun<'_> {
    fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.fatal.get().is_some()
    }

    fn fatal_cause(&self) -> Option<String> {
        self.fatal.get().cloned()
    }

    fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            duration_ms: self.meter.elapsed_ms(),
            files_per_second: self.meter.overall(self.counters.files_processed()),
            peak_files_per_second: self.meter.peak(),
            throughput_samples: self.meter.samples(),
            concurrency: self.concurrency,
            extraction_fallbacks: self.counters.extraction_fallbacks(),
            extraction_failures: self.counters.extraction_failures(),
        }
    }

    /// Flush the counters so far into the still-running session row
    fn save_checkpoint(&self) {
        let mut session = self.checkpoint.lock().unwrap_or_else(|e| e.into_inner());
        session.counts = self.counters.snapshot();
        session.metrics = self.metrics();

        if let Err(e) = self.store.update_session(&session) {
            if e.is_fatal() {
                self.record_fatal(&e);
            } else {
                warn!(session_id = %self.session_id, error = %e, "Could not checkpoint session");
            }
        }
    }

    fn record_fatal(&self, err: &StoreError) {
        if self.fatal.set(err.to_string()).is_ok() {
            error!(session_id = %self.session_id, error = %err, "Catalog unreachable, stopping scan");
        }
    }

    fn walk_target(
        &self,
        target: &ScanTarget,
        recursive: bool,
        filter: &ExclusionFilter,
        pool: &ThreadPool,
    ) -> TargetSummary {
        self.events.send(Event::Scan(ScanEvent::TargetStarted {
            path: target.path.clone(),
            group: target.group.clone(),
        }));

        let files_before = self.counters.files_processed();
        let failed_before = self.counters.files_failed();
        let directories_before = self.counters.directories_seen();

        let walker = TreeWalker::new(&target.path, recursive, filter.clone());
        pool.install(|| {
            walker
                .walk()
                .take_while(|_| !self.should_stop())
                .par_bridge()
                .for_each(|item| match item {
                    Ok(entry) if entry.is_dir => self.discover_directory(&entry, target),
                    Ok(entry) => self.process_file(entry, target),
                    Err(e) => self.enumeration_failed(e),
                });
        });

        let files = self.counters.files_processed() - files_before;
        self.logger.info(
            Component::TreeWalker,
            format!("Finished {} ({}): {} files", target.path.display(), target.group, files),
        );
        self.events.send(Event::Scan(ScanEvent::TargetCompleted {
            path: target.path.clone(),
            files,
        }));

        TargetSummary {
            path: target.path.clone(),
            group: target.group.clone(),
            files_processed: files,
            files_failed: self.counters.files_failed() - failed_before,
            directories: self.counters.directories_seen() - directories_before,
        }
    }

    fn discover_directory(&self, entry: &WalkEntry, target: &ScanTarget) {
        let mut arena = self.arena.lock().unwrap_or_else(|e| e.into_inner());
        if let Entry::Vacant(slot) = arena.entry(normalize(&entry.path)) {
            slot.insert(PendingDirectory {
                depth: entry.depth,
                category: target.category,
            });
            self.counters.directory_seen();
        }
    }

    fn enumeration_failed(&self, err: ScanError) {
        self.counters.enumeration_error();
        let detail = ErrorDetail::from(&err);

        self.events.send(Event::Scan(ScanEvent::EntryFailed {
            path: detail.path.clone().unwrap_or_default(),
            message: err.to_string(),
        }));
        self.logger.warning(
            Component::TreeWalker,
            format!("Skipped unreadable entry: {}", err),
            detail,
        );
    }

    fn process_file(&self, entry: WalkEntry, target: &ScanTarget) {
        let format = PhotoFormat::from_path(&entry.path);
        if !format.is_supported() {
            self.counters.file_skipped();
            self.logger.debug(
                Component::TreeWalker,
                "Skipped unsupported file",
                &entry.path,
            );
            return;
        }
        if self.should_stop() {
            return;
        }

        let path = normalize(&entry.path);
        let attributes = match fs::metadata(&path) {
            Ok(attributes) => attributes,
            Err(e) => {
                let err = ScanError::ReadEntry {
                    path: path.clone(),
                    source: e,
                };
                self.logger.warning(
                    Component::TreeWalker,
                    format!("Could not read file attributes: {}", err),
                    ErrorDetail::from(&err),
                );
                self.file_failed(&path, err.to_string());
                return;
            }
        };

        let extraction = self.chain.extract(&path, format);
        if extraction.is_empty() {
            self.counters.extraction_failure();
            let tried = extraction
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.extractor, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            let detail = extraction
                .failures
                .last()
                .map(|f| ErrorDetail::from(&f.error))
                .unwrap_or_else(|| {
                    ErrorDetail::new("no_metadata", "no extractor configured").with_path(&path)
                });
            self.logger.warning(
                Component::MetadataExtractor,
                format!("Catalogued without metadata ({})", tried),
                detail,
            );
        } else if extraction.used_fallback() {
            self.counters.extraction_fallback();
            debug!(
                path = %path.display(),
                source = extraction.source.unwrap_or_default(),
                "Metadata from fallback tier"
            );
        }

        let record = FileRecord {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            format,
            size: attributes.len(),
            created: attributes.created().ok().map(DateTime::<Utc>::from),
            modified: attributes.modified().ok().map(DateTime::<Utc>::from),
            metadata: extraction.metadata,
            metadata_source: extraction.source.map(str::to_string),
            category: target.category,
            session_id: self.session_id.clone(),
            path,
        };

        match self.store.insert_file(&record) {
            Ok(_) => {
                let processed = self.counters.file_succeeded(record.size);
                self.sample(processed, &record.path);
            }
            Err(e) => {
                if e.is_fatal() {
                    self.record_fatal(&e);
                }
                self.logger.error(
                    Component::CatalogStore,
                    format!("Could not record file: {}", e),
                    ErrorDetail::from(&e).with_path(&record.path),
                );
                self.file_failed(&record.path, e.to_string());
            }
        }
    }

    fn file_failed(&self, path: &Path, message: String) {
        let processed = self.counters.file_failed();
        self.events.send(Event::Scan(ScanEvent::FileFailed {
            path: path.to_path_buf(),
            message,
        }));
        self.sample(processed, path);
    }

    fn sample(&self, processed: u64, path: &Path) {
        if let Some(rate) = self.meter.record(processed) {
            self.save_checkpoint();
            self.events.send(Event::Scan(ScanEvent::Progress(ScanProgress {
                files_processed: processed,
                files_failed: self.counters.files_failed(),
                directories_seen: self.counters.directories_seen(),
                files_per_second: rate,
                current_path: path.to_path_buf(),
            })));
        }
    }

    /// Insert every discovered directory, shallowest first, linking each to
    /// the record of its parent when the parent was seen in this session
    fn persist_directories(&self) {
        let pending = std::mem::take(&mut *self.arena.lock().unwrap_or_else(|e| e.into_inner()));
        let mut ordered: Vec<_> = pending.into_iter().collect();
        ordered.sort_by_key(|(path, _)| path.components().count());

        let mut ids: HashMap<PathBuf, i64> = HashMap::with_capacity(ordered.len());
        for (path, pending) in ordered {
            if self.fatal.get().is_some() {
                break;
            }

            let record = DirectoryRecord {
                id: None,
                parent_id: path.parent().and_then(|p| ids.get(p)).copied(),
                path,
                depth: pending.depth,
                category: pending.category,
                session_id: self.session_id.clone(),
            };

            match self.store.insert_directory(&record) {
                Ok(id) => {
                    self.counters.directory_succeeded();
                    ids.insert(record.path, id);
                }
                Err(e) => {
                    self.counters.directory_failed();
                    if e.is_fatal() {
                        self.record_fatal(&e);
                    }
                    self.logger.error(
                        Component::CatalogStore,
                        format!("Could not record directory: {}", e),
                        ErrorDetail::from(&e).with_path(&record.path),
                    );
                }
            }
        }
    }
}
