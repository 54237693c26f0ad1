//! Session workflow scenarios, driven directly against ObservationSession

mod helpers;

use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;
use uuid::Uuid;

use helpers::{default_states, png_bytes, StubClassifier};
use sw_common::events::{EventBus, ObservationEvent};
use sw_ingest::models::UploadedImage;
use sw_ingest::services::{DatasetStore, MemoryDatasetStore, NoMetadata};
use sw_ingest::session::{FieldUpdate, ObservationSession, SessionError, UploadOutcome};
use sw_ingest::view::render;
use sw_ingest::workflow::{ViewMode, WorkflowStage};

const DATASET: &str = "Saving-Willy/temp_dataset";
const TIMEOUT: Duration = Duration::from_secs(2);

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 14)
        .unwrap()
        .and_hms_opt(16, 45, 3)
        .unwrap()
}

fn new_session(bus: &EventBus) -> ObservationSession {
    ObservationSession::new(Uuid::new_v4(), &default_states(), bus.clone()).unwrap()
}

fn located(lat: &str, lon: &str) -> FieldUpdate {
    FieldUpdate {
        latitude: Some(lat.to_string()),
        longitude: Some(lon.to_string()),
        ..Default::default()
    }
}

/// Two files with all inputs entered, validated and ready to classify
fn validated_session(bus: &EventBus) -> ObservationSession {
    let mut session = new_session(bus);
    session.set_author_email("super@whale.org").unwrap();
    session
        .replace_files(
            vec![
                UploadedImage::new("first.png", png_bytes(10)),
                UploadedImage::new("second.png", png_bytes(20)),
            ],
            &NoMetadata,
            now(),
        )
        .unwrap();
    let hashes: Vec<String> = session
        .observations()
        .image_hashes()
        .iter()
        .map(ToString::to_string)
        .collect();
    session.set_observation_fields(&hashes[0], located("44.5", "-63.1")).unwrap();
    assert_eq!(session.current_stage(), WorkflowStage::DoingDataEntry);
    session.set_observation_fields(&hashes[1], located("-33.9", "151.2")).unwrap();
    assert_eq!(session.current_stage(), WorkflowStage::DataEntryComplete);
    session.validate().unwrap();
    assert_eq!(session.view_mode(), ViewMode::ReadyToClassify);
    session
}

fn stub() -> StubClassifier {
    StubClassifier::new(&[
        &["beluga", "blue_whale", "orca"],
        &["orca", "beluga", "blue_whale"],
    ])
}

#[tokio::test]
async fn test_classification_batch() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);
    let index_before = session.fsm().current_state_index();

    let count = session.classify(&stub(), TIMEOUT).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(session.fsm().current_state_index(), index_before + 1);
    assert_eq!(session.view_mode(), ViewMode::ReviewingResults);

    let observations: Vec<_> = session.observations().iter().collect();
    assert_eq!(observations[0].selected_class(), Some("beluga"));
    assert_eq!(observations[1].selected_class(), Some("orca"));
    assert!(observations.iter().all(|o| !o.class_overriden()));
    assert_eq!(observations[1].top_predictions(), ["orca", "beluga", "blue_whale"]);
}

#[tokio::test]
async fn test_override_then_confirm() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);
    session.classify(&stub(), TIMEOUT).await.unwrap();

    let first = session.observations().image_hashes()[0].to_string();
    let second = session.observations().image_hashes()[1].to_string();
    session.select_class(&first, "blue_whale").unwrap();

    assert!(session.observations().get(&first).unwrap().class_overriden());
    assert!(!session.observations().get(&second).unwrap().class_overriden());

    // Review is never confirmed implicitly
    assert_eq!(session.current_stage(), WorkflowStage::MlClassificationCompleted);

    let index_before = session.fsm().current_state_index();
    let transition = session.confirm_review().unwrap();
    assert_eq!(transition.to, "manual_inspection_completed");
    assert_eq!(session.fsm().current_state_index(), index_before + 1);

    // Selection closes with the review
    assert!(matches!(
        session.select_class(&first, "beluga"),
        Err(SessionError::InvalidStage { .. })
    ));
}

#[tokio::test]
async fn test_select_unknown_species_rejected() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);
    session.classify(&stub(), TIMEOUT).await.unwrap();
    let first = session.observations().image_hashes()[0].to_string();

    assert!(matches!(
        session.select_class(&first, "kraken"),
        Err(SessionError::UnknownSpecies(_))
    ));
    // Offered by the classifier though not catalogued
    session.select_class(&first, "orca").unwrap();
    assert!(matches!(
        session.select_class("d1d2515e6f6ac4c5ca6dd739d5143cd4", "beluga"),
        Err(SessionError::UnknownObservation(_))
    ));
}

#[tokio::test]
async fn test_classification_failure_leaves_state_unchanged() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);

    let failing = stub().failing_on(1);
    let err = session.classify(&failing, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, SessionError::Classification { .. }));
    assert_eq!(session.current_stage(), WorkflowStage::DataEntryValidated);
    // First result was not applied either
    assert!(session
        .observations()
        .iter()
        .all(|o| o.top_predictions().is_empty() && o.selected_class().is_none()));

    // Retry succeeds
    session.classify(&stub(), TIMEOUT).await.unwrap();
    assert_eq!(session.current_stage(), WorkflowStage::MlClassificationCompleted);
}

#[tokio::test]
async fn test_classification_timeout() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);

    let slow = stub().with_delay(Duration::from_millis(200));
    let err = session
        .classify(&slow, Duration::from_millis(20))
        .await
        .unwrap_err();
    match err {
        SessionError::Classification { source, .. } => {
            assert!(source.to_string().contains("timed out"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.current_stage(), WorkflowStage::DataEntryValidated);
}

#[tokio::test]
async fn test_classify_before_validation_rejected() {
    let bus = EventBus::new(8);
    let mut session = new_session(&bus);
    let classifier = stub();
    assert!(matches!(
        session.classify(&classifier, TIMEOUT).await,
        Err(SessionError::InvalidStage {
            expected: WorkflowStage::DataEntryValidated,
            ..
        })
    ));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_upload_all_writes_each_observation() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);
    session.classify(&stub(), TIMEOUT).await.unwrap();
    session.confirm_review().unwrap();

    let store = MemoryDatasetStore::new();
    let report = session.upload_all(&store, DATASET, TIMEOUT).await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(session.view_mode(), ViewMode::Uploaded);

    for observation in session.observations().iter() {
        let path = format!("metadata/super@whale.org/{}.json", observation.image_md5());
        assert!(store.file_exists(DATASET, &path).await.unwrap());
        let stored: serde_json::Value =
            serde_json::from_slice(&store.get(DATASET, &path).unwrap()).unwrap();
        assert_eq!(stored["image_md5"], observation.image_md5().as_str());
        assert_eq!(stored["author_email"], "super@whale.org");
        assert_eq!(stored["date"], "2024-08-14");
        assert_eq!(stored["time"], "16:45:03");
    }
}

#[tokio::test]
async fn test_upload_failure_is_isolated() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut session = validated_session(&bus);
    session.classify(&stub(), TIMEOUT).await.unwrap();
    session.confirm_review().unwrap();

    let first = session.observations().image_hashes()[0].clone();
    let bad_path = format!("metadata/super@whale.org/{}.json", first);
    let store = MemoryDatasetStore::new();
    store.reject_path(bad_path.clone());

    let report = session.upload_all(&store, DATASET, TIMEOUT).await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.items[0].image_hash, first);
    assert!(matches!(
        &report.items[0].outcome,
        UploadOutcome::Failed { path, .. } if *path == bad_path
    ));
    assert!(report.items[1].outcome.is_success());
    assert_eq!(store.len(), 1);

    // Advances regardless
    assert_eq!(session.current_stage(), WorkflowStage::DataUploaded);
    assert!(session.upload_report().is_some());

    let mut failed_events = 0;
    while let Ok(event) = rx.try_recv() {
        if let ObservationEvent::UploadFailed { path, .. } = event {
            assert_eq!(path, bad_path);
            failed_events += 1;
        }
    }
    assert_eq!(failed_events, 1);
}

#[test]
fn test_identical_reupload_overwrites() {
    let bus = EventBus::new(8);
    let mut session = new_session(&bus);
    session
        .replace_files(
            vec![
                UploadedImage::new("whale.png", png_bytes(7)),
                UploadedImage::new("whale_copy.png", png_bytes(7)),
            ],
            &NoMetadata,
            now(),
        )
        .unwrap();
    assert_eq!(session.observations().len(), 1);
    let hash = session.observations().image_hashes()[0].to_string();
    session.set_observation_fields(&hash, located("1", "2")).unwrap();

    // Same bytes again with a new file: same key, entered values kept
    session
        .replace_files(
            vec![
                UploadedImage::new("whale.png", png_bytes(7)),
                UploadedImage::new("other.png", png_bytes(8)),
            ],
            &NoMetadata,
            now(),
        )
        .unwrap();
    assert_eq!(session.observations().len(), 2);
    assert_eq!(session.observations().image_hashes()[0].as_str(), hash);
    let kept = session.observations().get(&hash).unwrap();
    assert_eq!(kept.latitude(), Some("1"));
    assert_eq!(kept.uploaded_filename(), "whale.png");
}

#[test]
fn test_completeness_gate_on_empty_set() {
    let bus = EventBus::new(8);
    let mut session = new_session(&bus);
    assert!(!session.check_inputs_are_set(false));
    assert!(session.check_inputs_are_set(true));

    // Email alone never completes data entry
    session.set_author_email("super@whale.org").unwrap();
    assert_eq!(session.current_stage(), WorkflowStage::DoingDataEntry);
}

#[test]
fn test_sessions_do_not_share_state() {
    let bus = EventBus::new(8);
    let mut a = new_session(&bus);
    let b = new_session(&bus);
    a.set_author_email("a@whale.org").unwrap();
    a.replace_files(vec![UploadedImage::new("a.png", png_bytes(1))], &NoMetadata, now())
        .unwrap();
    assert!(b.observations().is_empty());
    assert_eq!(b.author_email(), "");
}

#[tokio::test]
async fn test_render_follows_stage() {
    let bus = EventBus::new(64);
    let mut session = validated_session(&bus);

    let view = render(&session);
    assert_eq!(view.view_mode, ViewMode::ReadyToClassify);
    assert!(view.actions.classify.is_enabled());
    assert!(view.observations.iter().all(|o| o.predictions.is_empty()));

    session.classify(&stub(), TIMEOUT).await.unwrap();
    let view = render(&session);
    assert_eq!(view.view_mode, ViewMode::ReviewingResults);
    assert_eq!(view.progress.index, 3);
    assert_eq!(view.observations[0].predictions[0].display_name, "Beluga");
    assert_eq!(view.observations[0].predictions.len(), 3);
    assert!(view.actions.confirm.is_enabled());
    assert!(!view.actions.upload.is_enabled());
}

#[test]
fn test_transition_events_published() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let _session = validated_session(&bus);

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ObservationEvent::StateChanged { from, to, .. } = event {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            ("doing_data_entry".to_string(), "data_entry_complete".to_string()),
            ("data_entry_complete".to_string(), "data_entry_validated".to_string()),
        ]
    );
}
