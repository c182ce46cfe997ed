#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;

use common::*;
use landmark_emotion::pipeline::face_mesh::{BASE_MESH_POINTS, REFINED_MESH_POINTS};
use landmark_emotion::pipeline::landmarks::LandmarkIndexSet;
use landmark_emotion::pipeline::{predict_emotion, PipelineResources, Prediction};

#[test]
fn test_face_image_predicts_argmax_label() {
    let resources = happy_resources();
    let prediction = resources.predict(&png_bytes(64, 64));

    assert_eq!(prediction, Prediction::Emotion { label: "happy".to_string(), confidence: 0.8 });
    let result = prediction.into_result();
    assert_eq!(result.emotion, "happy");
    assert!(result.error.is_none());
    let confidence = result.confidence.unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[test]
fn test_jpeg_input_is_accepted() {
    let resources = happy_resources();
    let prediction = resources.predict(&jpeg_bytes(32, 48));
    assert_eq!(prediction.label(), "happy");
}

#[test]
fn test_no_face_is_not_an_error() {
    let resources = resources_with(Box::new(StubDetector::no_face()), Box::new(happy_classifier()));
    let result = resources.predict(&png_bytes(16, 16)).into_result();
    assert_eq!(result.emotion, "No Face Detected");
    assert_eq!(result.confidence, None);
    assert_eq!(result.error, None);
}

#[test]
fn test_corrupt_bytes_are_decode_failures() {
    let detector = StubDetector::face(REFINED_MESH_POINTS);
    let calls = detector.calls.clone();
    let resources = resources_with(Box::new(detector), Box::new(happy_classifier()));

    for bytes in [&b""[..], &b"GIF89a but not really"[..], &[0xFF, 0xD8, 0xFF, 0x00][..]] {
        let result = resources.predict(bytes).into_result();
        assert_eq!(result.emotion, "Error");
        assert_eq!(result.confidence, None);
        assert_eq!(result.error.as_deref(), Some("Could not decode image."));
    }
    // Decoding fails before detection runs.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_base_mesh_reports_landmark_error() {
    let resources = resources_with(Box::new(StubDetector::face(BASE_MESH_POINTS)), Box::new(happy_classifier()));
    let result = resources.predict(&png_bytes(16, 16)).into_result();
    assert_eq!(result.emotion, "Landmark Error");
    assert_eq!(result.confidence, None);
    assert_eq!(
        result.error.as_deref(),
        Some("Landmark index 469 out of bounds (468 landmarks found).")
    );
}

#[test]
fn test_detector_failure_is_prediction_error() {
    let resources = resources_with(Box::new(FailingDetector), Box::new(happy_classifier()));
    let result = resources.predict(&png_bytes(16, 16)).into_result();
    assert_eq!(result.emotion, "Prediction Error");
    assert_eq!(result.confidence, None);
    assert!(result.error.unwrap().contains("detector session crashed"));
}

#[test]
fn test_classifier_panic_is_caught() {
    let resources = resources_with(Box::new(StubDetector::face(REFINED_MESH_POINTS)), Box::new(PanickingClassifier));
    let prediction = resources.predict(&png_bytes(16, 16));
    assert_eq!(prediction, Prediction::PredictionFailed("tensor shape exploded".to_string()));
    assert_eq!(prediction.label(), "Prediction Error");
}

#[test]
fn test_wrong_class_count_is_prediction_error() {
    let classifier = StubClassifier {
        probs: vec![0.5, 0.5],
        sequence_length: LandmarkIndexSet::emotion().len(),
    };
    let resources = resources_with(Box::new(StubDetector::face(REFINED_MESH_POINTS)), Box::new(classifier));
    let result = resources.predict(&png_bytes(16, 16)).into_result();
    assert_eq!(result.emotion, "Prediction Error");
    assert!(result.error.unwrap().contains("2 probabilities"));
}

#[test]
fn test_all_nan_output_is_prediction_error() {
    let classifier = StubClassifier {
        probs: vec![f32::NAN; 4],
        sequence_length: LandmarkIndexSet::emotion().len(),
    };
    let resources = resources_with(Box::new(StubDetector::face(REFINED_MESH_POINTS)), Box::new(classifier));
    let prediction = resources.predict(&png_bytes(16, 16));
    assert_eq!(prediction.label(), "Prediction Error");
}

#[test]
fn test_predict_is_idempotent() {
    let resources = happy_resources();
    let bytes = png_bytes(40, 30);
    let first = resources.predict(&bytes);
    let second = resources.predict(&bytes);
    assert_eq!(first, second);
}

#[test]
fn test_missing_resources_report_not_loaded() {
    let result = predict_emotion(None, &png_bytes(8, 8)).into_result();
    assert_eq!(result.emotion, "Error");
    assert_eq!(result.confidence, None);
    assert_eq!(result.error.as_deref(), Some("Model or resources not loaded."));
}

#[test]
fn test_custom_index_set_drives_sequence_length() {
    let index_set = LandmarkIndexSet::new([10, 0, 5]);
    let classifier = StubClassifier { probs: vec![0.1, 0.2, 0.6, 0.1], sequence_length: 3 };
    let resources = PipelineResources::new(
        index_set,
        Box::new(StubDetector::face(BASE_MESH_POINTS)),
        identity_normalizer(9),
        Box::new(classifier),
        labels(),
    )
    .unwrap();
    assert_eq!(resources.sequence_length(), 3);
    let prediction = predict_emotion(Some(&resources), &png_bytes(8, 8));
    assert_eq!(prediction, Prediction::Emotion { label: "neutral".to_string(), confidence: 0.6 });
}
