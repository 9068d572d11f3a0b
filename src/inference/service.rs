//! Prediction Service
//!
//! Orchestrates one classification: payload limit, preprocessing, model
//! prediction, argmax, and packaging of the result. Stateless across calls;
//! share it behind an `Arc`.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::preprocess::{ImagePreprocessor, ImageTensor};
use super::scores::ScoreVector;
use crate::config::{ClassifierVariant, ServiceConfig};
use crate::labels::ClassLabel;
use crate::model::ModelHandle;
use crate::utils::error::{LungScanError, Result};

/// Result of a single classification
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    /// Predicted label (argmax, ties to the lowest ordinal)
    pub label: ClassLabel,

    /// Probability of the predicted label
    pub confidence: f32,

    /// Full distribution keyed by label name
    pub scores: ScoreVector,

    /// Preprocessing + forward pass time in milliseconds
    pub inference_time_ms: f64,

    /// Classifier that produced the scores
    pub classifier: ClassifierVariant,
}

impl PredictionResult {
    pub fn new(scores: ScoreVector, elapsed: Duration, classifier: ClassifierVariant) -> Self {
        let (label, confidence) = scores.argmax();
        Self {
            label,
            confidence,
            scores,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
            classifier,
        }
    }

    /// Get a formatted string representation
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.label,
            self.label.index()
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));
        output.push_str(&format!("Classifier: {}\n", self.classifier));

        output.push_str("\nScores:\n");
        for (i, (label, prob)) in self.scores.ranked().iter().enumerate() {
            output.push_str(&format!("  {}. {} - {:.2}%\n", i + 1, label, prob * 100.0));
        }

        output
    }
}

pub struct PredictionService {
    handle: ModelHandle,
    preprocessor: ImagePreprocessor,
    max_payload_bytes: usize,
}

impl PredictionService {
    pub fn new(handle: ModelHandle, preprocessor: ImagePreprocessor, max_payload_bytes: usize) -> Self {
        Self {
            handle,
            preprocessor,
            max_payload_bytes,
        }
    }

    /// Build a service from configuration, loading the classifier
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let handle = ModelHandle::load(config)?;
        Ok(Self::new(
            handle,
            ImagePreprocessor::new(config.preprocess.clone()),
            config.max_upload_bytes,
        ))
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Classify an uploaded image
    ///
    /// Oversized payloads are rejected before decoding and undecodable ones
    /// never reach the model.
    pub fn classify(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let variant = self.handle.variant();

        if bytes.len() > self.max_payload_bytes {
            warn!(
                payload_bytes = bytes.len(),
                limit = self.max_payload_bytes,
                "Rejected oversized payload"
            );
            return Err(LungScanError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_payload_bytes,
            });
        }

        let start = Instant::now();

        let tensor = self.preprocessor.preprocess(bytes).map_err(|e| {
            warn!(payload_bytes = bytes.len(), error = %e, "Rejected image");
            e
        })?;

        let scores = self.predict_tensor(&tensor).map_err(|e| {
            warn!(payload_bytes = bytes.len(), classifier = %variant, error = %e, "Prediction failed");
            e
        })?;

        let result = PredictionResult::new(scores, start.elapsed(), variant);
        debug!(
            label = %result.label,
            confidence = result.confidence,
            inference_time_ms = result.inference_time_ms,
            classifier = %variant,
            "Classified image"
        );
        Ok(result)
    }

    /// Run the classifier on an already preprocessed tensor
    pub fn predict_tensor(&self, tensor: &ImageTensor) -> Result<ScoreVector> {
        self.handle.classifier().predict(tensor)
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("handle", &self.handle)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::tests::{encode, white_gray_png};
    use crate::model::{Classifier, MockClassifier};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns fixed scores and counts invocations
    struct FixedClassifier {
        scores: [f32; 3],
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(scores: [f32; 3]) -> Arc<Self> {
            Arc::new(Self {
                scores,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, _input: &ImageTensor) -> Result<ScoreVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ScoreVector::new(self.scores)
        }

        fn variant(&self) -> ClassifierVariant {
            ClassifierVariant::Real
        }
    }

    fn service_with(classifier: Arc<dyn Classifier>, limit: usize) -> PredictionService {
        PredictionService::new(ModelHandle::new(classifier), ImagePreprocessor::default(), limit)
    }

    fn mock_service() -> PredictionService {
        PredictionService::from_config(&ServiceConfig::mock()).unwrap()
    }

    #[test]
    fn test_white_grayscale_through_mock() {
        let service = mock_service();
        let result = service.classify(&white_gray_png(100, 100)).unwrap();

        let sum: f32 = result.scores.as_array().iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_eq!(result.classifier, ClassifierVariant::Mock);

        let (label, confidence) = result.scores.argmax();
        assert_eq!(result.label, label);
        assert_eq!(result.confidence, confidence);
    }

    #[test]
    fn test_classify_twice_gives_identical_scores() {
        let service = mock_service();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            image::Rgb([x as u8, y as u8, (x + y) as u8])
        }));
        let bytes = encode(&img, ImageFormat::Png);

        let first = service.classify(&bytes).unwrap();
        let second = service.classify(&bytes).unwrap();
        assert_eq!(first.scores, second.scores);
        assert_eq!(first.label, second.label);
    }

    #[test]
    fn test_empty_payload_never_reaches_model() {
        let classifier = FixedClassifier::new([0.2, 0.5, 0.3]);
        let service = service_with(classifier.clone(), 1024);

        let err = service.classify(&[]).unwrap_err();
        assert!(matches!(err, LungScanError::InvalidImage(_)));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_oversized_payload_rejected_before_decode() {
        let classifier = FixedClassifier::new([0.2, 0.5, 0.3]);
        let service = service_with(classifier.clone(), 16);

        // Garbage would be InvalidImage if it were decoded
        let err = service.classify(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, LungScanError::PayloadTooLarge { size: 17, limit: 16 }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_payload_at_limit_is_accepted() {
        let bytes = white_gray_png(10, 10);
        let classifier = FixedClassifier::new([0.2, 0.5, 0.3]);
        let service = service_with(classifier.clone(), bytes.len());

        let result = service.classify(&bytes).unwrap();
        assert_eq!(result.label, ClassLabel::Normal);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tied_scores_pick_lowest_ordinal() {
        let service = service_with(FixedClassifier::new([0.4, 0.4, 0.2]), 1 << 20);
        let result = service.classify(&white_gray_png(20, 20)).unwrap();
        assert_eq!(result.label, ClassLabel::LungOpacity);
        assert_eq!(result.label.index(), 0);
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = PredictionResult::new(
            ScoreVector::new([0.1, 0.7, 0.2]).unwrap(),
            Duration::from_millis(5),
            ClassifierVariant::Mock,
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["label"], "Normal");
        assert_eq!(json["classifier"], "mock");
        assert!(json["scores"]["Viral Pneumonia"].is_number());
        assert!((json["inference_time_ms"].as_f64().unwrap() - 5.0).abs() < 1e-9);
        assert!(result.display().contains("Normal"));
    }

    #[test]
    fn test_service_is_shareable_across_threads() {
        let service = Arc::new(service_with(Arc::new(MockClassifier::default()), 1 << 20));
        let bytes = Arc::new(white_gray_png(32, 32));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                let bytes = bytes.clone();
                std::thread::spawn(move || service.classify(&bytes).unwrap().scores)
            })
            .collect();

        let results: Vec<ScoreVector> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
