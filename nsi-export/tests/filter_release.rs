//! Geometry filters are released exactly once whichever way a job ends.
//!
//! Runs as its own test binary so the process-wide filter gauge is not
//! shared with unrelated tests.

use async_trait::async_trait;
use futures::StreamExt;
use nsi_export::gis::{DataSource, FieldDefinition, FieldType, ResultLayer, SourceDriver};
use nsi_export::{
    geometry_filters_in_use, ExportConfig, ExportError, ExportOrchestrator, ExportSpec,
    GeoPackageDriver, GeometryFilter, JobStatus, MemoryStatusStore, Result, TracingReporter,
};
use nsi_geo::{Geometry, Point};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Panic,
}

struct Source(Outcome);

#[async_trait]
impl SourceDriver for Source {
    async fn open(&self) -> Result<Box<dyn DataSource>> {
        match self.0 {
            Outcome::Succeed => Ok(Box::new(Data)),
            Outcome::Fail => Err(ExportError::InvalidInput("boom".into())),
            Outcome::Panic => panic!("source exploded"),
        }
    }
}

struct Data;

#[async_trait]
impl DataSource for Data {
    async fn execute_sql(
        self: Box<Self>,
        _sql: &str,
        _params: &[String],
        filter: Option<&GeometryFilter>,
    ) -> Result<ResultLayer> {
        assert!(filter.is_some());
        Ok(ResultLayer {
            srid: 4326,
            fields: vec![FieldDefinition::new("fd_id", FieldType::Integer)],
            features: futures::stream::empty().boxed(),
        })
    }
}

async fn run(outcome: Outcome) {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = ExportOrchestrator::new(
        ExportConfig::new(dir.path()),
        Arc::new(MemoryStatusStore::new()),
        Arc::new(Source(outcome)),
        Arc::new(GeoPackageDriver),
        Arc::new(TracingReporter),
    )
    .unwrap();

    let filter = GeometryFilter::new(Geometry::Point(Point::new(-90.0, 38.0))).unwrap();
    assert_eq!(geometry_filters_in_use(), 1);
    let spec = ExportSpec::new("select * from nsi", vec![]).with_geometry_filter(filter);
    let token = orchestrator.submit(spec).await.unwrap();

    for _ in 0..500 {
        if orchestrator.status(&token).await.unwrap() == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        orchestrator.status(&token).await.unwrap(),
        JobStatus::Completed
    );
    assert_eq!(geometry_filters_in_use(), 0);
}

#[tokio::test]
async fn test_filter_released_on_every_exit_path() {
    run(Outcome::Succeed).await;
    run(Outcome::Fail).await;
    run(Outcome::Panic).await;
}
