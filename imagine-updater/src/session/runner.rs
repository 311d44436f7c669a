//! The end-to-end update run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{FailurePolicy, SessionConfig};
use super::error::{SessionError, SessionResult};
use super::events::{EventCallback, SessionEvent, SessionStage};
use super::report::{FileError, FileFailure, SessionReport};
use crate::catalog::HashCatalog;
use crate::diff::{self, ActionKind, Plan, PlanError, PlannedAction};
use crate::download::{
    resource_url, DownloadEvent, Downloader, HttpTransport, ReqwestTransport, TransportError,
};
use crate::manifest::{self, Manifest};
use crate::patch::PatchApplier;

/// Drives one update: manifest download, parse, plan, then apply.
///
/// # Example
///
/// ```ignore
/// let session = UpdateSession::with_reqwest(SessionConfig::new("/games/imagine"))?;
/// let report = session.run("http://patch.example.com/VersionData.txt", "Live")?;
/// println!("{} files updated", report.fetched.len());
/// ```
pub struct UpdateSession {
    config: SessionConfig,
    downloader: Downloader,
    cancel: CancellationToken,
    on_event: Option<EventCallback>,
}

/// Shared state of one apply stage.
struct ApplyContext<'a> {
    actions: &'a [PlannedAction],
    server: &'a str,
    applier: &'a PatchApplier,
    downloader: Downloader,
    /// Fires on user cancel, or on the first failure under fail-fast.
    halt: CancellationToken,
    cursor: AtomicUsize,
    processed: AtomicUsize,
    outcomes: Mutex<Vec<ActionOutcome>>,
}

struct ActionOutcome {
    index: usize,
    action: ActionKind,
    path: String,
    result: Result<u64, FileError>,
}

impl UpdateSession {
    pub fn new(config: SessionConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let cancel = CancellationToken::new();
        Self {
            config,
            downloader: Downloader::new(transport).with_cancellation(cancel.clone()),
            cancel,
            on_event: None,
        }
    }

    /// Create a session using the reqwest transport with the configured timeout.
    pub fn with_reqwest(config: SessionConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::with_timeout(config.timeout)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Use an externally owned cancel signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.downloader = self.downloader.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bring the install directory in line with `tag` of the manifest at
    /// `manifest_url`.
    ///
    /// Returns the report when every planned action succeeded. Failed files
    /// and cancellation are returned as errors that still carry the report.
    pub fn run(&self, manifest_url: &str, tag: &str) -> SessionResult<SessionReport> {
        let result = self.run_inner(manifest_url, tag);
        match &result {
            Ok(report) => {
                info!(
                    tag,
                    fetched = report.fetched.len(),
                    deleted = report.deleted.len(),
                    skipped = report.skipped.len(),
                    bytes = report.bytes_downloaded,
                    "Update finished"
                );
                self.emit(SessionEvent::SessionFinished {
                    fetched: report.fetched.len(),
                    deleted: report.deleted.len(),
                    skipped: report.skipped.len(),
                    bytes: report.bytes_downloaded,
                });
            }
            Err(e) => self.report_failure(e),
        }
        result
    }

    /// Download, parse and plan without touching the install directory.
    ///
    /// A full check is not performed. The hash list is only read: a torn
    /// final record is ignored without truncating it, and an unusable hash
    /// list is treated as empty when resets are enabled but is not rewritten.
    pub fn check(&self, manifest_url: &str, tag: &str) -> SessionResult<Plan> {
        let result = self.check_inner(manifest_url, tag);
        if let Err(e) = &result {
            self.report_failure(e);
        }
        result
    }

    /// Download and parse the manifest.
    pub fn fetch_manifest(&self, url: &str) -> SessionResult<Manifest> {
        self.enter(SessionStage::FetchingManifest);
        self.emit(SessionEvent::ManifestDownloadStarted {
            url: url.to_string(),
        });

        let mut body: Vec<u8> = Vec::new();
        let observer = |event: &DownloadEvent| {
            self.emit(SessionEvent::Download {
                path: None,
                event: event.clone(),
            })
        };
        let download = self
            .downloader
            .fetch(url, &mut body, &self.config.download_options(), &observer)
            .map_err(SessionError::ManifestDownload)?;
        self.emit(SessionEvent::ManifestDownloadFinished {
            url: url.to_string(),
            bytes: download.bytes,
        });

        self.enter(SessionStage::Parsing);
        let text = String::from_utf8(body).map_err(|e| SessionError::ManifestEncoding {
            valid_up_to: e.utf8_error().valid_up_to(),
        })?;
        let manifest = manifest::parse(&text)?;
        debug!(tags = manifest.tags().len(), "Parsed manifest");
        Ok(manifest)
    }

    fn check_inner(&self, manifest_url: &str, tag: &str) -> SessionResult<Plan> {
        let manifest = self.fetch_manifest(manifest_url)?;
        self.enter(SessionStage::Planning);
        let catalog = self.load_catalog(false)?;
        Ok(diff::plan(&manifest, tag, &catalog)?)
    }

    fn run_inner(&self, manifest_url: &str, tag: &str) -> SessionResult<SessionReport> {
        info!(
            url = manifest_url,
            tag,
            install_dir = %self.config.install_dir.display(),
            policy = %self.config.policy,
            "Starting update"
        );
        let manifest = self.fetch_manifest(manifest_url)?;

        self.enter(SessionStage::Planning);
        let server = manifest
            .tag(tag)
            .ok_or_else(|| PlanError::UnknownTag(tag.to_string()))?
            .server
            .clone();
        let mut catalog = self.load_catalog(true)?;
        let rechecked = if self.config.full_check {
            catalog.retain_present(&self.config.install_dir)?
        } else {
            Vec::new()
        };
        let plan = diff::plan(&manifest, tag, &catalog)?;

        info!(
            tag,
            fetch = plan.count(ActionKind::Fetch),
            delete = plan.count(ActionKind::Delete),
            skip = plan.count(ActionKind::Skip),
            bytes = plan.fetch_bytes(),
            "Update plan ready"
        );
        self.emit(SessionEvent::PlanReady {
            tag: tag.to_string(),
            fetch: plan.count(ActionKind::Fetch),
            delete: plan.count(ActionKind::Delete),
            skip: plan.count(ActionKind::Skip),
            fetch_bytes: plan.fetch_bytes(),
        });

        let catalog = Arc::new(Mutex::new(catalog));
        let applier = PatchApplier::new(&self.config.install_dir, Arc::clone(&catalog))
            .with_verify_digests(self.config.verify_digests);

        let mut report = SessionReport::new(tag, plan.len());
        report.rechecked = rechecked;
        report.staging_removed = applier.sweep_staging(plan.paths(ActionKind::Fetch));

        self.apply(&plan, &server, &applier, &mut report);
        compact_catalog(&catalog);

        if self.cancel.is_cancelled() && !report.is_complete() {
            return Err(SessionError::Cancelled {
                report: Box::new(report),
            });
        }
        if !report.failures.is_empty() {
            return Err(SessionError::FilesFailed {
                report: Box::new(report),
            });
        }

        self.enter(SessionStage::Finished);
        Ok(report)
    }

    /// Load the hash list. With `writable` unset nothing on disk is touched.
    fn load_catalog(&self, writable: bool) -> SessionResult<HashCatalog> {
        let dir = self.config.catalog_dir();
        let loaded = if writable {
            HashCatalog::load(dir)
        } else {
            HashCatalog::snapshot(dir)
        };
        match loaded {
            Ok(catalog) => {
                debug!(entries = catalog.len(), dir = %dir.display(), "Loaded hash list");
                Ok(catalog)
            }
            Err(e) if e.is_corrupt() && self.config.reset_corrupt_catalog => {
                warn!(error = %e, "Hash list is unusable, starting from an empty one");
                if writable {
                    Ok(HashCatalog::reset(dir)?)
                } else {
                    Ok(HashCatalog::in_memory())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply(
        &self,
        plan: &Plan,
        server: &str,
        applier: &PatchApplier,
        report: &mut SessionReport,
    ) {
        let total = plan.len();
        let halt = self.cancel.child_token();
        let ctx = ApplyContext {
            actions: plan.actions(),
            server,
            applier,
            downloader: self.downloader.clone().with_cancellation(halt.clone()),
            halt,
            cursor: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::with_capacity(total)),
        };

        self.enter(SessionStage::Applying { done: 0, total });
        let workers = self.config.workers.clamp(1, total.max(1));
        if workers == 1 {
            self.work(&ctx);
        } else {
            debug!(workers, "Applying plan on worker threads");
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| self.work(&ctx));
                }
            });
        }

        let mut outcomes = ctx.outcomes.into_inner();
        outcomes.sort_by_key(|outcome| outcome.index);
        for outcome in outcomes {
            match outcome.result {
                Ok(bytes) => match outcome.action {
                    ActionKind::Fetch => {
                        report.bytes_downloaded += bytes;
                        report.fetched.push(outcome.path);
                    }
                    ActionKind::Delete => report.deleted.push(outcome.path),
                    ActionKind::Skip => report.skipped.push(outcome.path),
                },
                Err(error) => report.failures.push(FileFailure {
                    index: outcome.index,
                    path: outcome.path,
                    action: outcome.action,
                    error,
                }),
            }
        }
    }

    /// Pull actions off the shared cursor until the plan is exhausted or
    /// the apply stage is halted.
    fn work(&self, ctx: &ApplyContext<'_>) {
        let total = ctx.actions.len();
        loop {
            if ctx.halt.is_cancelled() {
                break;
            }
            let index = ctx.cursor.fetch_add(1, Ordering::SeqCst);
            let Some(action) = ctx.actions.get(index) else {
                break;
            };

            let result = match action.kind {
                ActionKind::Skip => Ok(0),
                kind => {
                    self.emit(SessionEvent::FileStarted {
                        index,
                        total,
                        path: action.path.clone(),
                        action: kind,
                    });
                    self.apply_action(ctx, action)
                }
            };

            match &result {
                Err(FileError::Download(e)) if e.is_cancelled() && ctx.halt.is_cancelled() => {
                    debug!(path = %action.path, "Aborted in-flight action");
                    break;
                }
                Ok(_) if action.kind == ActionKind::Skip => {}
                Ok(bytes) => {
                    info!(path = %action.path, action = %action.kind, bytes, "Updated file");
                    self.emit(SessionEvent::FileFinished {
                        index,
                        total,
                        path: action.path.clone(),
                        action: action.kind,
                        bytes: *bytes,
                    });
                }
                Err(e) => {
                    error!(path = %action.path, action = %action.kind, error = %e, "Failed to update file");
                    self.emit(SessionEvent::FileFailed {
                        index,
                        path: action.path.clone(),
                        action: action.kind,
                        error: e.to_string(),
                    });
                    if self.config.policy == FailurePolicy::FailFast {
                        ctx.halt.cancel();
                    }
                }
            }

            ctx.outcomes.lock().push(ActionOutcome {
                index,
                action: action.kind,
                path: action.path.clone(),
                result,
            });
            let done = ctx.processed.fetch_add(1, Ordering::SeqCst) + 1;
            self.emit(SessionEvent::StageChanged(SessionStage::Applying { done, total }));
        }
    }

    fn apply_action(&self, ctx: &ApplyContext<'_>, action: &PlannedAction) -> Result<u64, FileError> {
        match action.kind {
            ActionKind::Fetch => {
                let url = resource_url(ctx.server, &action.path)?;
                let mut staged = ctx.applier.stage(&action.path)?;
                let options = self
                    .config
                    .download_options()
                    .with_allow_empty_body(action.expected_size == Some(0));
                let observer = |event: &DownloadEvent| {
                    self.emit(SessionEvent::Download {
                        path: Some(action.path.clone()),
                        event: event.clone(),
                    })
                };
                ctx.downloader.fetch(&url, &mut staged, &options, &observer)?;
                Ok(ctx
                    .applier
                    .commit(staged, &action.expected_hash, action.expected_size)?)
            }
            ActionKind::Delete => {
                ctx.applier.delete(&action.path)?;
                Ok(0)
            }
            ActionKind::Skip => Ok(0),
        }
    }

    fn enter(&self, stage: SessionStage) {
        debug!(stage = %stage, "Session stage");
        self.emit(SessionEvent::StageChanged(stage));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }

    fn report_failure(&self, error: &SessionError) {
        if error.is_cancelled() {
            warn!(stage = %error.stage(), "Update cancelled");
        } else {
            error!(stage = %error.stage(), error = %error, "Update failed");
        }
        self.emit(SessionEvent::SessionFailed {
            stage: error.stage(),
            error: error.to_string(),
        });
    }
}

fn compact_catalog(catalog: &Mutex<HashCatalog>) {
    let mut catalog = catalog.lock();
    if catalog.needs_compaction() {
        if let Err(e) = catalog.compact() {
            warn!(error = %e, "Failed to compact hash list");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HASHLIST_FILE, HASHLIST_VERSION_FILE};
    use crate::download::HttpResponse;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = "[versions]\ntitle=Live\nserver=http://cdn.test/live\ntag=Live\n\n[Live]\na.dat=h1,3\n";

    /// Serves fixed bodies by URL and 404 for anything else.
    struct MapTransport(HashMap<String, Vec<u8>>);

    impl HttpTransport for MapTransport {
        fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
            Ok(match self.0.get(url) {
                Some(body) => HttpResponse::from_bytes(200, "OK", body.clone()),
                None => HttpResponse::from_bytes(404, "Not Found", b"missing".to_vec()),
            })
        }
    }

    fn session(install: &TempDir, manifest: &[u8]) -> UpdateSession {
        let mut files = HashMap::new();
        files.insert("http://cdn.test/VersionData.txt".to_string(), manifest.to_vec());
        files.insert("http://cdn.test/live/a.dat".to_string(), b"AAA".to_vec());
        UpdateSession::new(
            SessionConfig::new(install.path()),
            Arc::new(MapTransport(files)),
        )
    }

    #[test]
    fn test_check_plans_without_writing() {
        let install = TempDir::new().unwrap();
        let plan = session(&install, MANIFEST.as_bytes())
            .check("http://cdn.test/VersionData.txt", "Live")
            .unwrap();

        assert_eq!(plan.paths(ActionKind::Fetch), vec!["a.dat"]);
        assert!(!install.path().join("a.dat").exists());
        assert!(!install.path().join(HASHLIST_FILE).exists());
    }

    #[test]
    fn test_check_leaves_torn_hash_list_untouched() {
        let install = TempDir::new().unwrap();
        {
            let mut catalog = HashCatalog::load(install.path()).unwrap();
            catalog.put("a.dat", "h1", 3).unwrap();
        }
        let data = install.path().join(HASHLIST_FILE);
        let mut torn = fs::read(&data).unwrap();
        torn.extend_from_slice(b"put\t9\tpart");
        fs::write(&data, &torn).unwrap();

        let plan = session(&install, MANIFEST.as_bytes())
            .check("http://cdn.test/VersionData.txt", "Live")
            .unwrap();

        assert_eq!(plan.paths(ActionKind::Skip), vec!["a.dat"]);
        assert_eq!(fs::read(&data).unwrap(), torn);
    }

    #[test]
    fn test_unknown_tag_fails_in_planning() {
        let install = TempDir::new().unwrap();
        let err = session(&install, MANIFEST.as_bytes())
            .run("http://cdn.test/VersionData.txt", "Beta")
            .unwrap_err();

        assert!(matches!(err, SessionError::Plan(PlanError::UnknownTag(ref t)) if t == "Beta"));
        assert_eq!(err.stage(), SessionStage::Planning);
    }

    #[test]
    fn test_missing_manifest_fails_in_fetch_stage() {
        let install = TempDir::new().unwrap();
        let err = session(&install, MANIFEST.as_bytes())
            .run("http://cdn.test/other/VersionData.txt", "Live")
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::ManifestDownload(crate::download::DownloadError::HttpStatus { code: 404, .. })
        ));
        assert_eq!(err.stage(), SessionStage::FetchingManifest);
    }

    #[test]
    fn test_non_utf8_manifest() {
        let install = TempDir::new().unwrap();
        let err = session(&install, b"[versions]\n\xff\xfe")
            .run("http://cdn.test/VersionData.txt", "Live")
            .unwrap_err();

        assert!(matches!(err, SessionError::ManifestEncoding { valid_up_to: 11 }));
        assert_eq!(err.stage(), SessionStage::Parsing);
    }

    #[test]
    fn test_corrupt_catalog_requires_opt_in() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join(HASHLIST_VERSION_FILE), "imagine-hashlist 1\n").unwrap();
        fs::write(install.path().join(HASHLIST_FILE), "not a record\n").unwrap();

        let err = session(&install, MANIFEST.as_bytes())
            .run("http://cdn.test/VersionData.txt", "Live")
            .unwrap_err();
        assert!(matches!(err, SessionError::Catalog(ref e) if e.is_corrupt()));

        let mut files = HashMap::new();
        files.insert("http://cdn.test/VersionData.txt".to_string(), MANIFEST.as_bytes().to_vec());
        files.insert("http://cdn.test/live/a.dat".to_string(), b"AAA".to_vec());
        let session = UpdateSession::new(
            SessionConfig::new(install.path()).with_reset_corrupt_catalog(true),
            Arc::new(MapTransport(files)),
        );
        let report = session.run("http://cdn.test/VersionData.txt", "Live").unwrap();
        assert_eq!(report.fetched, vec!["a.dat"]);
        assert_eq!(fs::read(install.path().join("a.dat")).unwrap(), b"AAA");
    }

    #[test]
    fn test_events_cover_stages() {
        let install = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let session = session(&install, MANIFEST.as_bytes()).with_event_callback(Arc::new(
            move |event: &SessionEvent| sink.lock().push(event.clone()),
        ));

        session.run("http://cdn.test/VersionData.txt", "Live").unwrap();

        let events = events.lock();
        assert!(events.contains(&SessionEvent::ManifestDownloadStarted {
            url: "http://cdn.test/VersionData.txt".into()
        }));
        assert!(events.contains(&SessionEvent::StageChanged(SessionStage::Planning)));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::FileFinished { path, bytes: 3, .. } if path == "a.dat"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Download { path: Some(p), event: DownloadEvent::Completed { .. } } if p == "a.dat"
        )));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionFinished { fetched: 1, .. })
        ));
    }
}
