//! Copy engine: preflight, strategy dispatch, verification and finalize

use crate::context::RunContext;
use crate::finalize::{Artifacts, Stage};
use crate::selector::{needs_hasher, select_strategy, select_verification};
use crate::settings::EngineSettings;
use crate::status::TracingStatusSink;
use crate::{direct_large, direct_small, staged};
use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vericp_config::Config;
use vericp_device::{available_space, same_volume, VolumeClassifier};
use vericp_io::{is_sparse, select_algorithm, ContentDigest, FileTimeAccessor};
use vericp_types::{
    Cancellable, CancellationToken, CopyFailure, CopyOperationResult, CopyOutcome, CopyRequest,
    CopyStrategy, DigestAlgorithm, FailureKind, LocationClass, LocationClassifier,
    PerformanceSummary, ProgressReporter, Result, StatusRecord, StatusSink, StrategyDecision,
    TimestampAccessor, VerificationMode,
};

static SPARSE_WARNING: Once = Once::new();

/// Test hook run between COPYING and VERIFYING with the temp file path
type AfterCopy<'a> = Option<&'a dyn Fn(&Path)>;

/// Everything decided about one request before the filesystem is touched
struct Plan {
    decision: StrategyDecision,
    /// Destination after symlink resolution
    target: PathBuf,
    algorithm: Option<DigestAlgorithm>,
    source_metadata: Metadata,
}

/// What the copy phases report back to the result builder
struct Tally {
    strategy: Option<CopyStrategy>,
    verification_mode: VerificationMode,
    bytes_total: u64,
    bytes_transferred: u64,
}

impl Tally {
    const fn unplanned() -> Self {
        Self {
            strategy: None,
            verification_mode: VerificationMode::None,
            bytes_total: 0,
            bytes_transferred: 0,
        }
    }

    fn planned(plan: &Plan) -> Self {
        Self {
            strategy: Some(plan.decision.strategy),
            verification_mode: plan.decision.verification_mode,
            bytes_total: plan.decision.length,
            bytes_transferred: 0,
        }
    }
}

/// Verified single-file copy engine.
///
/// Cheap to clone; every clone shares the same settings and collaborators.
#[derive(Clone)]
pub struct CopyEngine {
    settings: Arc<EngineSettings>,
    classifier: Arc<dyn LocationClassifier>,
    timestamps: Arc<dyn TimestampAccessor>,
    status: Arc<dyn StatusSink>,
}

impl fmt::Debug for CopyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CopyEngine {
    /// Create an engine with the default collaborators
    pub fn new(settings: EngineSettings) -> Self {
        Self::builder().with_settings(settings).build()
    }

    /// Create an engine from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(EngineSettings::from_config(config)?))
    }

    /// Start building an engine with custom collaborators
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Settings in effect
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Classify both endpoints and select strategy and verification without
    /// touching the filesystem. Unresolvable endpoints are rejected here just
    /// as they would be by a copy.
    pub fn plan(&self, request: &CopyRequest) -> std::result::Result<StrategyDecision, CopyFailure> {
        let plan = self.prepare(request)?;
        reject_unresolvable(&plan.decision)?;
        Ok(plan.decision)
    }

    /// Copy one file, blocking the calling thread until the request reaches a
    /// terminal state
    pub fn execute(
        &self,
        request: &CopyRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> CopyOperationResult {
        self.run_with(request, progress, cancel, None)
    }

    /// Copy one file on the blocking thread pool
    pub async fn execute_async(
        &self,
        request: CopyRequest,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> CopyOperationResult {
        let engine = self.clone();
        let started = Instant::now();
        let identity = request.clone();

        match tokio::task::spawn_blocking(move || {
            engine.execute(&request, progress.as_ref(), &cancel)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Copy worker for {} failed: {}", identity.source.display(), e);
                self.conclude(
                    &identity,
                    started,
                    &Tally::unplanned(),
                    Err(CopyFailure::write(format!("copy worker failed: {}", e))),
                )
            }
        }
    }

    /// Copy many files, at most `max_concurrent_files` at a time.
    ///
    /// Results are returned in request order. A request whose destination was
    /// already claimed by an earlier request in the same batch is rejected.
    pub async fn execute_batch(
        &self,
        requests: Vec<CopyRequest>,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Vec<CopyOperationResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_files));
        let mut claimed = HashSet::new();
        info!(
            "Starting batch of {} files ({} concurrent)",
            requests.len(),
            self.settings.max_concurrent_files
        );

        let tasks = requests.into_iter().map(|request| {
            let duplicate = !claimed.insert(destination_key(&request.destination));
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let cancel = cancel.clone();

            async move {
                if duplicate {
                    let failure = CopyFailure::preflight(format!(
                        "{} is already a destination in this batch",
                        request.destination.display()
                    ));
                    return self.conclude(&request, Instant::now(), &Tally::unplanned(), Err(failure));
                }
                let _permit = semaphore.acquire_owned().await.ok();
                self.execute_async(request, progress, cancel).await
            }
        });

        let results = join_all(tasks.collect::<Vec<_>>()).await;
        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!("Batch finished: {} ok, {} not ok", results.len() - failed, failed);
        results
    }

    pub(crate) fn run_with(
        &self,
        request: &CopyRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        after_copy: AfterCopy<'_>,
    ) -> CopyOperationResult {
        let started = Instant::now();
        debug!("Executing copy request: {:?}", request);

        let plan = match self.prepare(request) {
            Ok(plan) => plan,
            Err(failure) => {
                return self.conclude(request, started, &Tally::unplanned(), Err(failure))
            }
        };

        self.status
            .record(&StatusRecord::Decision(plan.decision.clone()));

        let mut tally = Tally::planned(&plan);
        if let Err(failure) = self.preflight(&plan) {
            return self.conclude(request, started, &tally, Err(failure));
        }
        if cancel.is_cancelled() {
            let failure = CopyFailure::cancelled("preflight");
            return self.conclude(request, started, &tally, Err(failure));
        }

        let outcome = self.stage_and_copy(&plan, request, progress, cancel, after_copy, &mut tally);
        self.conclude(request, started, &tally, outcome)
    }

    /// Resolve, classify and select
    fn prepare(&self, request: &CopyRequest) -> std::result::Result<Plan, CopyFailure> {
        let source = &request.source;
        let source_metadata = fs::metadata(source).map_err(|e| {
            CopyFailure::preflight(format!("cannot read {}: {}", source.display(), e))
        })?;
        if !source_metadata.is_file() {
            return Err(CopyFailure::preflight(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let target = resolve_destination(&request.destination)?;
        if let Ok(metadata) = fs::metadata(&target) {
            if metadata.is_dir() {
                return Err(CopyFailure::preflight(format!(
                    "{} is a directory",
                    target.display()
                )));
            }
            if let (Ok(a), Ok(b)) = (fs::canonicalize(source), fs::canonicalize(&target)) {
                if a == b {
                    return Err(CopyFailure::preflight(format!(
                        "{} and {} are the same file",
                        source.display(),
                        target.display()
                    )));
                }
            }
        }

        let source_class = self.classifier.classify(source);
        let destination_class = self.classifier.classify(&target);
        let length = source_metadata.len();
        let selection = select_strategy(
            source_class,
            destination_class,
            length,
            &self.settings.thresholds,
        );
        let verification_mode =
            select_verification(selection.strategy, self.settings.policy, length);
        let algorithm = needs_hasher(selection.strategy, verification_mode)
            .then(|| select_algorithm(self.settings.digest));

        let decision = StrategyDecision {
            operation_id: request.operation_id,
            source: source.clone(),
            destination: target.clone(),
            source_class,
            destination_class,
            length,
            strategy: selection.strategy,
            rule: selection.rule,
            unit_size: self.settings.unit_size(selection.strategy),
            verification_mode,
            policy: self.settings.policy,
            digest: algorithm,
        };

        Ok(Plan {
            decision,
            target,
            algorithm,
            source_metadata,
        })
    }

    /// Checks that reject a request before anything on disk changes
    fn preflight(&self, plan: &Plan) -> std::result::Result<(), CopyFailure> {
        let decision = &plan.decision;
        reject_unresolvable(decision)?;

        if decision.length > self.settings.max_file_size {
            return Err(CopyFailure::preflight(format!(
                "{} is {} bytes, above the {} byte limit",
                decision.source.display(),
                decision.length,
                self.settings.max_file_size
            )));
        }

        let directory = parent_dir(&plan.target);
        if !directory.is_dir() {
            return Err(CopyFailure::preflight(format!(
                "destination directory {} does not exist",
                directory.display()
            )));
        }

        let artifacts = Artifacts::for_destination(&plan.target);
        let existing = [&artifacts.destination, &artifacts.backup]
            .iter()
            .find_map(|path| fs::metadata(path).ok())
            .map_or(0, |metadata| metadata.len());
        let required = decision
            .length
            .saturating_add(existing)
            .saturating_add(self.settings.free_space_margin);
        let network = decision.destination_class == LocationClass::NetworkMapped;

        match available_space(directory) {
            Ok(available) if available < required => {
                return Err(CopyFailure::preflight(format!(
                    "{} bytes free on the volume of {}, {} required",
                    available,
                    directory.display(),
                    required
                )));
            }
            Ok(_) => {}
            Err(e) if network => warn!(
                "Free space check unavailable for {}: {}; continuing",
                directory.display(),
                e
            ),
            Err(e) => {
                return Err(CopyFailure::preflight(format!(
                    "free space check failed for {}: {}",
                    directory.display(),
                    e
                )))
            }
        }

        if artifacts.destination.exists() {
            match same_volume(directory, &artifacts.destination) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(CopyFailure::preflight(format!(
                        "{} is not on the volume of {}; the temp file could not be renamed onto it",
                        artifacts.destination.display(),
                        directory.display()
                    )))
                }
                Err(e) => warn!("Volume check unavailable for {}: {}", directory.display(), e),
            }
        }
        Ok(())
    }

    /// PREFLIGHT mutations, then COPYING, VERIFYING and FINALIZING
    fn stage_and_copy(
        &self,
        plan: &Plan,
        request: &CopyRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        after_copy: AfterCopy<'_>,
        tally: &mut Tally,
    ) -> std::result::Result<Option<bool>, CopyFailure> {
        let source = &request.source;
        let source_times = self.timestamps.get_times(source).map_err(|e| {
            CopyFailure::preflight(format!("cannot read times of {}: {}", source.display(), e))
        })?;

        let artifacts = Artifacts::for_destination(&plan.target);
        artifacts.recover_stale()?;

        if is_sparse(&plan.source_metadata) {
            SPARSE_WARNING.call_once(|| {
                warn!(
                    "{} is sparse; copies are written fully allocated",
                    source.display()
                );
            });
        }

        let stage = Stage::begin(&artifacts, self.timestamps.as_ref())?;

        let ctx = RunContext::new(
            request.operation_id,
            &self.settings,
            plan.decision.length,
            progress,
            cancel,
        );
        let result = copy_and_verify(plan, &ctx, source, &artifacts.temp, after_copy);
        tally.bytes_transferred = ctx.transferred();

        match result {
            Ok(passed) => {
                stage.finalize(&source_times)?;
                Ok(passed)
            }
            Err(failure) => Err(stage.rollback(failure)),
        }
    }

    /// Build the terminal result and emit its performance record
    fn conclude(
        &self,
        request: &CopyRequest,
        started: Instant,
        tally: &Tally,
        outcome: std::result::Result<Option<bool>, CopyFailure>,
    ) -> CopyOperationResult {
        let verifying = tally.verification_mode != VerificationMode::None;
        let (outcome, verification_passed, failure) = match outcome {
            Ok(passed) => (CopyOutcome::Ok, passed, None),
            Err(failure) => {
                let passed = (verifying && failure.kind == FailureKind::VerificationMismatch)
                    .then_some(false);
                let outcome = if failure.kind == FailureKind::Cancelled {
                    CopyOutcome::Cancelled
                } else {
                    CopyOutcome::Error
                };
                (outcome, passed, Some(failure))
            }
        };

        let result = CopyOperationResult {
            operation_id: request.operation_id,
            source: request.source.clone(),
            destination: request.destination.clone(),
            outcome,
            strategy: tally.strategy,
            verification_mode: tally.verification_mode,
            verification_passed,
            bytes_total: tally.bytes_total,
            bytes_transferred: tally.bytes_transferred,
            elapsed: started.elapsed(),
            failure,
        };

        match &result.failure {
            None => info!(
                "Copied {} -> {} ({} bytes in {:?})",
                result.source.display(),
                result.destination.display(),
                result.bytes_transferred,
                result.elapsed
            ),
            Some(failure) if failure.kind == FailureKind::Cancelled => {
                info!("Copy of {} cancelled", result.source.display());
            }
            Some(failure) => warn!("Copy of {} failed: {}", result.source.display(), failure),
        }

        self.status
            .record(&StatusRecord::Performance(PerformanceSummary::from(&result)));
        result
    }
}

fn copy_and_verify(
    plan: &Plan,
    ctx: &RunContext<'_>,
    source: &Path,
    temp: &Path,
    after_copy: AfterCopy<'_>,
) -> std::result::Result<Option<bool>, CopyFailure> {
    let strategy = plan.decision.strategy;
    let mode = plan.decision.verification_mode;
    debug!(
        "Copying {} -> {} with {} ({})",
        source.display(),
        temp.display(),
        strategy,
        mode
    );

    let digest: Option<ContentDigest> = match strategy {
        CopyStrategy::DirectSmall => {
            direct_small::copy(ctx, source, temp)?;
            None
        }
        CopyStrategy::DirectLarge => direct_large::copy(ctx, source, temp, plan.algorithm)?,
        CopyStrategy::Staged => staged::copy(ctx, source, temp, plan.algorithm)?,
    };

    if let Some(hook) = after_copy {
        hook(temp);
    }
    guard_source(ctx, source)?;

    match (mode, strategy, digest) {
        (VerificationMode::None, _, _) => Ok(None),
        (VerificationMode::WindowCompare, _, _) => {
            direct_small::verify(ctx, source, temp)?;
            Ok(Some(true))
        }
        (VerificationMode::DigestCompare, CopyStrategy::DirectLarge, Some(digest)) => {
            direct_large::verify(ctx, temp, &digest)?;
            Ok(Some(true))
        }
        (VerificationMode::DigestCompare, CopyStrategy::Staged, Some(digest)) => {
            staged::verify(ctx, temp, &digest)?;
            Ok(Some(true))
        }
        (VerificationMode::DigestCompare, _, _) => Err(CopyFailure::mismatch(format!(
            "no copy-time digest for {} verification",
            strategy
        ))),
    }
}

/// Fail if the source changed length or was not copied in full
fn guard_source(ctx: &RunContext<'_>, source: &Path) -> std::result::Result<(), CopyFailure> {
    let current = fs::metadata(source)
        .map_err(|e| CopyFailure::mismatch(format!("cannot stat {}: {}", source.display(), e)))?
        .len();
    if current != ctx.length {
        return Err(CopyFailure::mismatch(format!(
            "source {} changed size during copy ({} -> {} bytes)",
            source.display(),
            ctx.length,
            current
        )));
    }
    if ctx.transferred() != ctx.length {
        return Err(CopyFailure::mismatch(format!(
            "copied {} of {} bytes from {}",
            ctx.transferred(),
            ctx.length,
            source.display()
        )));
    }
    Ok(())
}

/// Directory holding `path`, `.` for a bare file name
/// Unmapped shares and unresolvable paths are never copied to or from
fn reject_unresolvable(decision: &StrategyDecision) -> std::result::Result<(), CopyFailure> {
    for (path, class) in [
        (&decision.source, decision.source_class),
        (&decision.destination, decision.destination_class),
    ] {
        if class == LocationClass::Unresolvable {
            return Err(CopyFailure::preflight(format!(
                "{} is an unmapped share or an unresolvable path; map a drive first",
                path.display()
            )));
        }
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Follow a destination symlink to the file it names, even if that file does
/// not exist yet
fn resolve_destination(destination: &Path) -> std::result::Result<PathBuf, CopyFailure> {
    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            if let Ok(target) = fs::canonicalize(destination) {
                return Ok(target);
            }
            let link = fs::read_link(destination).map_err(|e| {
                CopyFailure::preflight(format!("cannot read link {}: {}", destination.display(), e))
            })?;
            Ok(if link.is_absolute() {
                link
            } else {
                parent_dir(destination).join(link)
            })
        }
        _ => Ok(destination.to_path_buf()),
    }
}

/// Key identifying a destination within one batch
fn destination_key(destination: &Path) -> PathBuf {
    let resolved = resolve_destination(destination).unwrap_or_else(|_| destination.to_path_buf());
    match (fs::canonicalize(parent_dir(&resolved)), resolved.file_name()) {
        (Ok(directory), Some(name)) => directory.join(name),
        _ => resolved,
    }
}

/// Builder for [`CopyEngine`]
#[derive(Default)]
pub struct EngineBuilder {
    settings: Option<EngineSettings>,
    classifier: Option<Arc<dyn LocationClassifier>>,
    timestamps: Option<Arc<dyn TimestampAccessor>>,
    status: Option<Arc<dyn StatusSink>>,
}

impl EngineBuilder {
    /// Use these settings instead of the defaults
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replace the location classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn LocationClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Replace the timestamp accessor
    pub fn with_timestamps(mut self, timestamps: Arc<dyn TimestampAccessor>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    /// Replace the status sink
    pub fn with_status_sink(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    /// Build the engine
    pub fn build(self) -> CopyEngine {
        CopyEngine {
            settings: Arc::new(self.settings.unwrap_or_default()),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(VolumeClassifier::new())),
            timestamps: self
                .timestamps
                .unwrap_or_else(|| Arc::new(FileTimeAccessor::new())),
            status: self.status.unwrap_or_else(|| Arc::new(TracingStatusSink)),
        }
    }
}
