//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use elohim_competency::{
    ActionInput, Category, CompetencyConfig, CompetencyError, CompetencyScores, CompetencyService,
    CompetencySnapshot, ErrorSink, ImpactLevel, MemoryPersistence, SubjectId,
};

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Error sink that records every report
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(SubjectId, CompetencyError)>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<(SubjectId, CompetencyError)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, subject: &SubjectId, error: &CompetencyError) {
        self.reports.lock().unwrap().push((subject.clone(), error.clone()));
    }
}

pub struct Harness {
    pub store: Arc<MemoryPersistence>,
    pub sink: Arc<RecordingSink>,
    pub service: CompetencyService,
}

pub fn harness_with(store: MemoryPersistence, config: CompetencyConfig) -> Harness {
    init_tracing();
    let store = Arc::new(store);
    let sink = Arc::new(RecordingSink::default());
    let service = CompetencyService::with_error_sink(config, store.clone(), sink.clone()).unwrap();
    Harness { store, sink, service }
}

pub fn harness() -> Harness {
    harness_with(MemoryPersistence::new(), CompetencyConfig::default())
}

pub fn seeded(subject: &str, scores: CompetencyScores) -> CompetencySnapshot {
    CompetencySnapshot::new(subject, scores)
}

pub fn meeting() -> ActionInput {
    ActionInput::new(
        "customer_meeting",
        Category::SalesStrategy,
        "Discovery call with procurement",
        ImpactLevel::Medium,
    )
}
