//! Shared fixtures for sw-ingest integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sw_common::config::{TomlConfig, DEFAULT_WORKFLOW_STATES};
use sw_common::events::EventBus;
use sw_common::log_buffer::LogBuffer;
use sw_ingest::services::{
    Classifier, ClassifierError, MemoryDatasetStore, NoMetadata, Prediction,
};
use sw_ingest::AppState;

/// Small solid-colour PNG; different shades give different hashes
pub fn png_bytes(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 6, Rgb([shade, 128, 255 - shade]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

pub fn default_states() -> Vec<String> {
    DEFAULT_WORKFLOW_STATES.iter().map(|s| s.to_string()).collect()
}

/// Returns scripted rankings, one per call in order
pub struct StubClassifier {
    rankings: Vec<Vec<String>>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    delay: Option<Duration>,
}

impl StubClassifier {
    pub fn new(rankings: &[&[&str]]) -> Self {
        Self {
            rankings: rankings
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            delay: None,
        }
    }

    /// Fail the `n`th call (0-based)
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_call == Some(n) {
            return Err(ClassifierError::Api {
                status: 503,
                body: "model loading".to_string(),
            });
        }
        let ranking = &self.rankings[n % self.rankings.len()];
        Ok(ranking
            .iter()
            .enumerate()
            .map(|(i, label)| Prediction {
                label: label.clone(),
                score: 1.0 / (i as f64 + 1.0),
            })
            .collect())
    }
}

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.classifier.timeout_secs = 2;
    config.dataset.timeout_secs = 2;
    config
}

/// App wired to a stub classifier and an in-memory store
pub fn create_test_app_with(
    classifier: Arc<dyn Classifier>,
    store: Arc<MemoryDatasetStore>,
) -> (axum::Router, AppState) {
    let state = AppState::new(
        &test_config(),
        classifier,
        store,
        Arc::new(NoMetadata),
        EventBus::new(100),
        LogBuffer::new(40),
    );
    (sw_ingest::build_router(state.clone()), state)
}

pub fn create_test_app() -> (axum::Router, AppState, Arc<MemoryDatasetStore>) {
    let store = Arc::new(MemoryDatasetStore::new());
    let classifier = Arc::new(StubClassifier::new(&[
        &["beluga", "blue_whale", "orca"],
        &["orca", "beluga", "blue_whale"],
    ]));
    let (app, state) = create_test_app_with(classifier, store.clone());
    (app, state, store)
}
