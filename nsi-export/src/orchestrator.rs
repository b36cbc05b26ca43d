//! Background export jobs.
//!
//! [`ExportOrchestrator::submit`] records a job as `Initialized`, spawns a
//! worker and returns the job token immediately. The worker marks the job
//! `Processing`, copies the source query into a GeoPackage artifact and then
//! always writes a terminal status, including when the copy fails, panics or
//! is cancelled by shutdown.

use crate::error::{ExportError, Result};
use crate::gis::{narrow_to_point, OutputDriver, SourceDriver};
use crate::job::{ExportSpec, JobToken};
use crate::progress::ProgressReporter;
use crate::status::{JobStatus, StatusStore};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Default number of exports allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
/// Default progress cadence, in features.
pub const DEFAULT_REPORT_EVERY: u64 = 10_000;

/// Export worker settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory receiving `<token>.gpkg` artifacts.
    pub output_dir: PathBuf,
    pub max_concurrent: usize,
    pub report_every: u64,
    /// Persist `Failed` instead of `Completed` when a job does not produce
    /// its artifact.
    pub track_failures: bool,
}

impl ExportConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            report_every: DEFAULT_REPORT_EVERY,
            track_failures: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ExportError::InvalidInput(
                "export concurrency must be at least 1".into(),
            ));
        }
        if self.report_every == 0 {
            return Err(ExportError::InvalidInput(
                "export report interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

struct Inner {
    config: ExportConfig,
    status: Arc<dyn StatusStore>,
    source: Arc<dyn SourceDriver>,
    output: Arc<dyn OutputDriver>,
    reporter: Arc<dyn ProgressReporter>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// Accepts export jobs and runs them in the background.
#[derive(Clone)]
pub struct ExportOrchestrator {
    inner: Arc<Inner>,
}

impl ExportOrchestrator {
    pub fn new(
        config: ExportConfig,
        status: Arc<dyn StatusStore>,
        source: Arc<dyn SourceDriver>,
        output: Arc<dyn OutputDriver>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                status,
                source,
                output,
                reporter,
                permits,
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Start an export and return its token.
    ///
    /// Fails with [`ExportError::AtCapacity`] when every worker slot is busy;
    /// the [`ExportSpec`] and its geometry filter are dropped in that case.
    pub async fn submit(&self, spec: ExportSpec) -> Result<JobToken> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(ExportError::ShuttingDown);
        }
        let permit = inner
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| ExportError::AtCapacity {
                limit: inner.config.max_concurrent,
            })?;

        let token = JobToken::new();
        inner
            .status
            .put(&token.to_string(), JobStatus::Initialized)
            .await?;
        tracing::info!(
            job = %token,
            filtered = spec.geometry_filter.is_some(),
            params = spec.params.len(),
            "export submitted"
        );

        tokio::spawn(run_job(self.inner.clone(), token, spec, permit));
        Ok(token)
    }

    /// Current status of a job.
    pub async fn status(&self, token: &JobToken) -> Result<JobStatus> {
        self.inner
            .status
            .get(&token.to_string())
            .await?
            .ok_or_else(|| ExportError::NotFound(format!("export {token}")))
    }

    /// Where the job's artifact is (or will be) written.
    pub fn artifact_path(&self, token: &JobToken) -> PathBuf {
        self.inner.config.output_dir.join(token.artifact_name())
    }

    /// Path of a finished artifact; `NotFound` until the job completed and
    /// while the file is absent.
    pub async fn artifact(&self, token: &JobToken) -> Result<PathBuf> {
        if self.status(token).await? != JobStatus::Completed {
            return Err(ExportError::NotFound(format!("export {token} not ready")));
        }
        let path = self.artifact_path(token);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ExportError::NotFound(format!("export {token} artifact"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExportError::NotFound(format!("export {token} artifact")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Jobs currently holding a worker slot.
    pub fn running_jobs(&self) -> usize {
        self.inner.config.max_concurrent - self.inner.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent
    }

    /// Cancel running jobs and wait up to `grace` for their workers to record
    /// a terminal status. Returns whether every worker finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let inner = &self.inner;
        inner.cancel.cancel();
        let all = u32::try_from(inner.config.max_concurrent).unwrap_or(u32::MAX);
        match tokio::time::timeout(grace, inner.permits.acquire_many(all)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) => true,
            Err(_) => {
                tracing::warn!(
                    running = self.running_jobs(),
                    "export workers still running after shutdown grace period"
                );
                false
            }
        }
    }
}

async fn run_job(
    inner: Arc<Inner>,
    token: JobToken,
    spec: ExportSpec,
    _permit: OwnedSemaphorePermit,
) {
    let key = token.to_string();
    if let Err(e) = inner.status.put(&key, JobStatus::Processing).await {
        tracing::warn!(job = %token, error = %e, "failed to record export status");
    }

    let path = inner.config.output_dir.join(token.artifact_name());
    let work = AssertUnwindSafe(copy(&inner, &token, &spec, &path)).catch_unwind();
    let outcome = tokio::select! {
        biased;
        _ = inner.cancel.cancelled() => Err(ExportError::ShuttingDown),
        result = work => result.unwrap_or_else(|panic| {
            Err(ExportError::Panicked(panic_message(panic.as_ref())))
        }),
    };
    drop(spec);

    let terminal = match outcome {
        Ok(rows) => {
            inner.reporter.message(&token, "export complete", Some(rows));
            JobStatus::Completed
        }
        Err(e) => {
            tracing::error!(job = %token, error = %e, "export failed");
            inner
                .reporter
                .message(&token, &format!("export failed: {e}"), None);
            remove_partial(&path).await;
            if inner.config.track_failures {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            }
        }
    };
    if let Err(e) = inner.status.put(&key, terminal).await {
        tracing::error!(job = %token, error = %e, "failed to record final export status");
    }
}

async fn copy(inner: &Inner, token: &JobToken, spec: &ExportSpec, path: &Path) -> Result<u64> {
    let reporter = inner.reporter.as_ref();

    let source = inner.source.open().await?;
    reporter.message(token, "opened source", None);
    let mut output = inner.output.create(path).await?;
    reporter.message(
        token,
        &format!("created {} output at {}", inner.output.name(), path.display()),
        None,
    );

    let mut layer = source
        .execute_sql(&spec.sql, &spec.params, spec.geometry_filter.as_ref())
        .await?;
    output
        .create_layer(&spec.layer_name, layer.srid, &layer.fields)
        .await?;
    reporter.message(
        token,
        &format!("created layer {} with {} fields", spec.layer_name, layer.fields.len()),
        None,
    );

    let mut rows = 0u64;
    let mut dropped_geometries = 0u64;
    while let Some(feature) = layer.features.next().await {
        let feature = feature?;
        let point = narrow_to_point(feature.geometry.as_ref());
        if point.is_none() && feature.geometry.is_some() {
            dropped_geometries += 1;
        }
        output.write_feature(point.as_ref(), &feature.values).await?;
        rows += 1;
        if rows % inner.config.report_every == 0 {
            reporter.message(token, "features written", Some(rows));
        }
    }
    if dropped_geometries > 0 {
        tracing::warn!(
            job = %token,
            count = dropped_geometries,
            "non-point geometries written without geometry"
        );
    }

    output.finish().await?;
    Ok(rows)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial artifact")
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::{
        DataSource, FieldData, FieldDefinition, FieldType, ResultLayer, SourceFeature,
    };
    use crate::gpkg::GeoPackageDriver;
    use crate::job::GeometryFilter;
    use crate::status::MemoryStatusStore;
    use async_trait::async_trait;
    use nsi_geo::{Geometry, LineString, Point};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behavior {
        Rows(usize),
        /// Yields rows with a pause before each one.
        SlowRows(usize, Duration),
        FailOpen,
        PanicOpen,
        /// Never yields; used to exercise capacity and cancellation.
        Hang,
    }

    struct FakeSource(Behavior);

    #[async_trait]
    impl SourceDriver for FakeSource {
        async fn open(&self) -> Result<Box<dyn DataSource>> {
            match self.0 {
                Behavior::FailOpen => Err(ExportError::InvalidInput("connection refused".into())),
                Behavior::PanicOpen => panic!("driver fault"),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                Behavior::Rows(n) => Ok(Box::new(FakeData(n, Duration::ZERO))),
                Behavior::SlowRows(n, pause) => Ok(Box::new(FakeData(n, pause))),
            }
        }
    }

    struct FakeData(usize, Duration);

    #[async_trait]
    impl DataSource for FakeData {
        async fn execute_sql(
            self: Box<Self>,
            _sql: &str,
            _params: &[String],
            _filter: Option<&GeometryFilter>,
        ) -> Result<ResultLayer> {
            let features = (0..self.0).map(|i| {
                let geometry = if i == 1 {
                    Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]))
                } else {
                    Geometry::Point(Point::new(-90.0 + i as f64, 38.0))
                };
                Ok(SourceFeature {
                    geometry: Some(geometry),
                    values: vec![FieldData::Integer(i as i64), FieldData::String("RES1".into())],
                })
            });
            Ok(ResultLayer {
                srid: 4326,
                fields: vec![
                    FieldDefinition::new("fd_id", FieldType::Integer),
                    FieldDefinition::new("occtype", FieldType::String),
                ],
                features: if self.1.is_zero() {
                    futures::stream::iter(features.collect::<Vec<_>>()).boxed()
                } else {
                    let pause = self.1;
                    futures::stream::iter(features.collect::<Vec<_>>())
                        .then(move |f| async move {
                            tokio::time::sleep(pause).await;
                            f
                        })
                        .boxed()
                },
            })
        }
    }

    #[derive(Default)]
    struct RecordingReporter(Mutex<Vec<(String, Option<u64>)>>);

    impl ProgressReporter for RecordingReporter {
        fn message(&self, _job: &JobToken, msg: &str, count: Option<u64>) {
            self.0.lock().unwrap().push((msg.to_string(), count));
        }
    }

    struct Harness {
        orchestrator: ExportOrchestrator,
        status: Arc<MemoryStatusStore>,
        reporter: Arc<RecordingReporter>,
        _dir: tempfile::TempDir,
    }

    fn harness(behavior: Behavior, configure: impl FnOnce(&mut ExportConfig)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfig::new(dir.path());
        config.report_every = 2;
        configure(&mut config);
        let status = Arc::new(MemoryStatusStore::new());
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = ExportOrchestrator::new(
            config,
            status.clone(),
            Arc::new(FakeSource(behavior)),
            Arc::new(GeoPackageDriver),
            reporter.clone(),
        )
        .unwrap();
        Harness {
            orchestrator,
            status,
            reporter,
            _dir: dir,
        }
    }

    async fn wait_terminal(orchestrator: &ExportOrchestrator, token: &JobToken) -> JobStatus {
        for _ in 0..500 {
            let status = orchestrator.status(token).await.unwrap();
            if status.is_terminal() {
                // Let the worker release its slot.
                tokio::time::sleep(Duration::from_millis(10)).await;
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {token} did not finish");
    }

    async fn submit(h: &Harness) -> JobToken {
        h.orchestrator
            .submit(ExportSpec::new("select 1", vec![]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_export() {
        let h = harness(Behavior::Rows(5), |_| {});
        let token = h
            .orchestrator
            .submit(ExportSpec::new("select * from nsi", vec![]))
            .await
            .unwrap();

        assert_eq!(wait_terminal(&h.orchestrator, &token).await, JobStatus::Completed);
        assert_eq!(
            h.status.history(&token.to_string()).await,
            vec![JobStatus::Initialized, JobStatus::Processing, JobStatus::Completed]
        );
        let path = h.orchestrator.artifact(&token).await.unwrap();
        assert!(path.ends_with(token.artifact_name()));

        let messages = h.reporter.0.lock().unwrap().clone();
        assert!(messages.contains(&("features written".to_string(), Some(2))));
        assert!(messages.contains(&("features written".to_string(), Some(4))));
        assert_eq!(messages.last(), Some(&("export complete".to_string(), Some(5))));
        assert_eq!(h.orchestrator.running_jobs(), 0);
    }

    #[tokio::test]
    async fn test_polled_status_never_moves_backwards() {
        fn rank(status: JobStatus) -> u8 {
            match status {
                JobStatus::Initialized => 0,
                JobStatus::Processing => 1,
                JobStatus::Completed | JobStatus::Failed => 2,
            }
        }

        let h = harness(
            Behavior::SlowRows(20, Duration::from_millis(5)),
            |_| {},
        );
        let token = submit(&h).await;

        let mut observed = Vec::new();
        for _ in 0..5000 {
            let status = h.orchestrator.status(&token).await.unwrap();
            if observed.last() != Some(&status) {
                observed.push(status);
            }
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(observed.windows(2).all(|w| rank(w[0]) < rank(w[1])), "{observed:?}");
        assert!(observed.contains(&JobStatus::Processing), "{observed:?}");
        assert_eq!(observed.last(), Some(&JobStatus::Completed));

        // The finished job cannot be pushed back into Processing.
        assert!(h
            .status
            .put(&token.to_string(), JobStatus::Processing)
            .await
            .is_err());
        assert_eq!(h.orchestrator.status(&token).await.unwrap(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_open_still_completes() {
        let h = harness(Behavior::FailOpen, |_| {});
        let token = submit(&h).await;

        assert_eq!(wait_terminal(&h.orchestrator, &token).await, JobStatus::Completed);
        assert!(matches!(
            h.orchestrator.artifact(&token).await,
            Err(ExportError::NotFound(_))
        ));
        let messages = h.reporter.0.lock().unwrap().clone();
        assert!(messages.iter().any(|(m, _)| m.starts_with("export failed")));
    }

    #[tokio::test]
    async fn test_failure_tracking() {
        let h = harness(Behavior::FailOpen, |c| c.track_failures = true);
        let token = submit(&h).await;
        assert_eq!(wait_terminal(&h.orchestrator, &token).await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let h = harness(Behavior::PanicOpen, |_| {});
        let token = submit(&h).await;
        assert_eq!(wait_terminal(&h.orchestrator, &token).await, JobStatus::Completed);
        let messages = h.reporter.0.lock().unwrap().clone();
        assert!(messages.iter().any(|(m, _)| m.contains("driver fault")));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let h = harness(Behavior::Hang, |c| c.max_concurrent = 1);
        submit(&h).await;
        let err = h
            .orchestrator
            .submit(ExportSpec::new("select 1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::AtCapacity { limit: 1 }));
        assert_eq!(h.orchestrator.running_jobs(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_jobs() {
        let h = harness(Behavior::Hang, |_| {});
        let token = submit(&h).await;
        assert!(h.orchestrator.shutdown(Duration::from_secs(5)).await);
        assert_eq!(h.orchestrator.status(&token).await.unwrap(), JobStatus::Completed);
        assert!(matches!(
            h.orchestrator.submit(ExportSpec::new("select 1", vec![])).await,
            Err(ExportError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let h = harness(Behavior::Rows(0), |_| {});
        assert!(matches!(
            h.orchestrator.status(&JobToken::new()).await,
            Err(ExportError::NotFound(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ExportConfig::new("/tmp");
        assert!(config.validate().is_ok());
        config.report_every = 0;
        assert!(config.validate().is_err());
        config.report_every = 1;
        config.max_concurrent = 0;
        assert!(config.validate().is_err());
    }
}
