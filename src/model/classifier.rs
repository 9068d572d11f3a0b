//! Chest X-ray classifier: InceptionV3 backbone + SE attention head
//!
//! ```text
//! [B, 3, 224, 224]
//!   -> InceptionV3 (optionally frozen)        [B, 2048, 5, 5]
//!   -> SqueezeExcitation (ratio 16)           [B, 2048, 5, 5]
//!   -> GlobalAveragePool                      [B, 2048]
//!   -> Dense 512 ReLU -> BatchNorm -> Dropout 0.5
//!   -> Dense 256 ReLU -> BatchNorm -> Dropout 0.3
//!   -> Dense 3 -> softmax                     [B, 3]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor, TensorData},
};
use tracing::{debug, info};

use super::inception::{InceptionV3, FEATURE_CHANNELS};
use super::se_block::{SqueezeExcitation, SqueezeExcitationConfig};
use super::Classifier;
use crate::config::ClassifierVariant;
use crate::inference::preprocess::{ImageTensor, INPUT_CHANNELS, INPUT_SIZE};
use crate::inference::scores::ScoreVector;
use crate::labels::NUM_CLASSES;
use crate::utils::error::{self, LungScanError, ResultExt};

/// File name of the weight record inside an artifact directory
pub const WEIGHTS_FILE: &str = "model.mpk";

/// File name of the architecture config inside an artifact directory
pub const CONFIG_FILE: &str = "model_config.json";

/// Stack for threads that move a whole network by value (init, save, load)
const LARGE_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Configuration for the LungClassifier model
#[derive(Config, Debug)]
pub struct LungClassifierConfig {
    /// Number of output classes
    #[config(default = "3")]
    pub num_classes: usize,

    /// Squeeze-and-excitation reduction ratio
    #[config(default = "16")]
    pub se_ratio: usize,

    /// Units of the first dense layer
    #[config(default = "512")]
    pub hidden_units: usize,

    /// Units of the second dense layer
    #[config(default = "256")]
    pub hidden_units_2: usize,

    /// Dropout after the first dense layer
    #[config(default = "0.5")]
    pub dropout: f64,

    /// Dropout after the second dense layer
    #[config(default = "0.3")]
    pub dropout_2: f64,

    /// Stop gradients flowing into the pretrained backbone
    #[config(default = "true")]
    pub freeze_backbone: bool,
}

impl LungClassifierConfig {
    /// Validate the configuration
    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes != NUM_CLASSES {
            return Err(LungScanError::Config(format!(
                "num_classes must be {}, got {}",
                NUM_CLASSES, self.num_classes
            )));
        }
        if self.se_ratio == 0 || self.se_ratio > FEATURE_CHANNELS {
            return Err(LungScanError::Config(format!(
                "se_ratio must be in 1..={}",
                FEATURE_CHANNELS
            )));
        }
        if self.hidden_units == 0 || self.hidden_units_2 == 0 {
            return Err(LungScanError::Config(
                "dense layers must have at least one unit".to_string(),
            ));
        }
        for rate in [self.dropout, self.dropout_2] {
            if !(0.0..1.0).contains(&rate) {
                return Err(LungScanError::Config(
                    "dropout rates must be in range [0.0, 1.0)".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Create a randomly initialized model
    pub fn init<B: Backend>(&self, device: &B::Device) -> LungClassifier<B> {
        let backbone = InceptionV3::new(device);
        let backbone = if self.freeze_backbone {
            backbone.no_grad()
        } else {
            backbone
        };

        LungClassifier {
            backbone,
            head: ClassifierHead::new(self, device),
        }
    }

    /// Load the config stored beside a weight file, if any
    pub fn load_beside(weights_path: &Path) -> error::Result<Option<Self>> {
        let path = weights_path.with_file_name(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path)
            .map(Some)
            .model_load_context("Failed to read model config")
    }
}

/// Batch norm over `[B, C]` activations
fn batch_norm_1d<B: Backend>(bn: &BatchNorm<B, 1>, x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch_size, channels] = x.dims();
    bn.forward(x.reshape([batch_size, channels, 1]))
        .reshape([batch_size, channels])
}

/// Task-specific head on top of the backbone feature map
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub se: SqueezeExcitation<B>,
    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub bn1: BatchNorm<B, 1>,
    pub dropout1: Dropout,

    pub fc2: Linear<B>,
    pub bn2: BatchNorm<B, 1>,
    pub dropout2: Dropout,

    pub output: Linear<B>,
    pub relu: Relu,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(config: &LungClassifierConfig, device: &B::Device) -> Self {
        let bn = |units: usize| BatchNormConfig::new(units).with_epsilon(1e-3).init(device);

        Self {
            se: SqueezeExcitationConfig::new(FEATURE_CHANNELS)
                .with_ratio(config.se_ratio)
                .init(device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),

            fc1: LinearConfig::new(FEATURE_CHANNELS, config.hidden_units).init(device),
            bn1: bn(config.hidden_units),
            dropout1: DropoutConfig::new(config.dropout).init(),

            fc2: LinearConfig::new(config.hidden_units, config.hidden_units_2).init(device),
            bn2: bn(config.hidden_units_2),
            dropout2: DropoutConfig::new(config.dropout_2).init(),

            output: LinearConfig::new(config.hidden_units_2, config.num_classes).init(device),
            relu: Relu::new(),
        }
    }

    /// Feature map `[B, 2048, H, W]` -> logits `[B, num_classes]`
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.se.forward(features);

        let [batch_size, channels, _, _] = x.dims();
        let x = self.global_pool.forward(x).reshape([batch_size, channels]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = batch_norm_1d(&self.bn1, x);
        let x = self.dropout1.forward(x);

        let x = self.relu.forward(self.fc2.forward(x));
        let x = batch_norm_1d(&self.bn2, x);
        let x = self.dropout2.forward(x);

        self.output.forward(x)
    }
}

/// Complete lung disease classifier
#[derive(Module, Debug)]
pub struct LungClassifier<B: Backend> {
    pub backbone: InceptionV3<B>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> LungClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.head.forward(features)
    }
}

/// Run `f` on a scoped thread with [`LARGE_STACK_BYTES`] of stack
///
/// A panic inside `f` is resumed on the calling thread.
fn on_large_stack<T, F>(name: &str, f: F) -> error::Result<T>
where
    T: Send,
    F: FnOnce() -> error::Result<T> + Send,
{
    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .stack_size(LARGE_STACK_BYTES)
            .spawn_scoped(scope, f)?;
        worker
            .join()
            .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
    })
}

/// Write `model.mpk` and `model_config.json` into `dir`
pub fn save_artifact<B: Backend>(
    model: LungClassifier<B>,
    config: &LungClassifierConfig,
    dir: &Path,
) -> error::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let weights_path = dir.join(WEIGHTS_FILE);
    let target = weights_path.clone();
    on_large_stack("lungscan-model-save", move || {
        model
            .save_file(target, &CompactRecorder::new())
            .map_err(|e| LungScanError::Serialization(format!("Failed to save model: {:?}", e)))
    })?;

    config.save(dir.join(CONFIG_FILE))?;

    info!("Model artifact written to {:?}", dir);
    Ok(weights_path)
}

/// CompactRecorder always reads `<stem>.mpk`; find that file
fn resolve_weights_path(path: &Path) -> Option<PathBuf> {
    let candidate = path.with_extension("mpk");
    candidate.exists().then_some(candidate)
}

/// The network variant of [`Classifier`]
///
/// Burn modules are `Send` but not `Sync`, so the module sits behind a mutex
/// and every prediction runs on a clone. Cloning shares the reference-counted
/// weight tensors, so forward passes run concurrently. The module is boxed so
/// the handle stays small on the stacks it is moved across.
pub struct RealClassifier<B: Backend> {
    model: Mutex<Box<LungClassifier<B>>>,
    device: B::Device,
    num_params: usize,
}

impl<B: Backend> RealClassifier<B> {
    /// Wrap an in-memory model
    pub fn from_model(model: LungClassifier<B>, device: B::Device) -> Self {
        let num_params = model.num_params();
        Self {
            model: Mutex::new(Box::new(model)),
            device,
            num_params,
        }
    }

    /// Load a weight record for the given architecture
    ///
    /// Fails with [`LungScanError::ModelLoad`] when the file is missing,
    /// cannot be decoded, or holds a different number of parameters than
    /// the configured architecture. Loading runs on its own thread, so the
    /// caller's stack size does not matter.
    pub fn load(
        weights_path: &Path,
        config: &LungClassifierConfig,
        device: B::Device,
    ) -> error::Result<Self> {
        config
            .validate()
            .map_err(|e| LungScanError::ModelLoad(e.to_string()))?;

        let resolved = resolve_weights_path(weights_path).ok_or_else(|| {
            LungScanError::ModelLoad(format!("weights file not found: {:?}", weights_path))
        })?;

        on_large_stack("lungscan-model-load", move || {
            Self::load_resolved(&resolved, config, device)
        })
    }

    fn load_resolved(
        resolved: &Path,
        config: &LungClassifierConfig,
        device: B::Device,
    ) -> error::Result<Self> {
        info!("Loading model weights from {:?}", resolved);
        let model: LungClassifier<B> = config.init(&device);
        let expected = model.num_params();

        let model = model
            .load_file(resolved.to_path_buf(), &CompactRecorder::new(), &device)
            .model_load_context("Failed to load model")?;

        let loaded = model.num_params();
        if loaded != expected {
            return Err(LungScanError::ModelLoad(format!(
                "weights in {:?} hold {} parameters, architecture expects {}",
                resolved, loaded, expected
            )));
        }

        debug!(num_params = loaded, "Model weights loaded");
        Ok(Self::from_model(model, device))
    }

    /// Total trainable + frozen parameters
    pub fn num_params(&self) -> usize {
        self.num_params
    }
}

impl<B: Backend> Classifier for RealClassifier<B> {
    fn variant(&self) -> ClassifierVariant {
        ClassifierVariant::Real
    }

    fn predict(&self, input: &ImageTensor) -> error::Result<ScoreVector> {
        let model = self
            .model
            .lock()
            .map_err(|_| LungScanError::Inference("model lock poisoned".to_string()))?
            .clone();

        let data = TensorData::new(
            input.as_slice().to_vec(),
            [1, INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE],
        );
        let x = Tensor::<B, 4>::from_data(data, &self.device);

        let logits: Vec<f32> = model
            .forward(x)
            .into_data()
            .to_vec()
            .map_err(|e| LungScanError::Inference(format!("Failed to read output: {:?}", e)))?;

        let logits: [f32; NUM_CLASSES] = logits.try_into().map_err(|l: Vec<f32>| {
            LungScanError::Inference(format!("expected {} logits, got {}", NUM_CLASSES, l.len()))
        })?;
        ScoreVector::from_logits(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::TENSOR_LEN;
    use burn_ndarray::NdArray;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn small_config() -> LungClassifierConfig {
        LungClassifierConfig::new()
            .with_hidden_units(32)
            .with_hidden_units_2(16)
    }

    #[test]
    fn test_config_defaults_match_reference_head() {
        let config = LungClassifierConfig::new();
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.se_ratio, 16);
        assert_eq!(config.hidden_units, 512);
        assert_eq!(config.hidden_units_2, 256);
        assert!(config.freeze_backbone);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(LungClassifierConfig::new().with_num_classes(4).validate().is_err());
        assert!(LungClassifierConfig::new().with_se_ratio(0).validate().is_err());
        assert!(LungClassifierConfig::new().with_dropout(1.0).validate().is_err());
        assert!(LungClassifierConfig::new().with_hidden_units(0).validate().is_err());
    }

    #[test]
    fn test_head_output_shape() {
        let device = Default::default();
        let head = ClassifierHead::<TestBackend>::new(&LungClassifierConfig::new(), &device);

        let features = Tensor::<TestBackend, 4>::ones([2, FEATURE_CHANNELS, 5, 5], &device);
        let logits = head.forward(features);

        assert_eq!(logits.dims(), [2, NUM_CLASSES]);
    }

    #[test]
    fn test_forward_logits_normalize_per_row() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 75, 75], &device);
        let logits: Vec<f32> = model.forward(input).into_data().to_vec().unwrap();

        assert_eq!(logits.len(), 2 * NUM_CLASSES);
        for row in logits.chunks(NUM_CLASSES) {
            assert!(row.iter().all(|l| l.is_finite()));
            let scores = ScoreVector::from_logits([row[0], row[1], row[2]]).unwrap();
            let sum: f32 = scores.as_array().iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_real_classifier_predict_full_size() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let classifier = RealClassifier::from_model(model, device);

        let input = ImageTensor::from_vec(vec![0.5; TENSOR_LEN]).unwrap();
        let first = classifier.predict(&input).unwrap();
        let second = classifier.predict(&input).unwrap();

        let sum: f32 = first.as_array().iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        for (a, b) in first.as_array().iter().zip(second.as_array()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(classifier.variant(), ClassifierVariant::Real);
    }

    #[test]
    fn test_shared_real_classifier_predicts_identically_across_threads() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let classifier = Arc::new(RealClassifier::from_model(model, device));
        let input = Arc::new(ImageTensor::from_vec(vec![0.25; TENSOR_LEN]).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let classifier = Arc::clone(&classifier);
                let input = Arc::clone(&input);
                std::thread::spawn(move || classifier.predict(&input).unwrap())
            })
            .collect();
        let results: Vec<ScoreVector> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for scores in &results[1..] {
            assert_eq!(scores.argmax().0, results[0].argmax().0);
            for (a, b) in scores.as_array().iter().zip(results[0].as_array()) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = RealClassifier::<TestBackend>::load(
            &dir.path().join("missing.mpk"),
            &LungClassifierConfig::new(),
            Default::default(),
        );
        assert!(matches!(result, Err(LungScanError::ModelLoad(_))));
    }

    #[test]
    fn test_load_corrupt_weights_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEIGHTS_FILE);
        std::fs::write(&path, b"this is not a burn record").unwrap();

        let result =
            RealClassifier::<TestBackend>::load(&path, &small_config(), Default::default());
        assert!(matches!(result, Err(LungScanError::ModelLoad(_))));
    }

    #[test]
    fn test_artifact_roundtrip_and_shape_mismatch() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = small_config();

        let model = config.init::<TestBackend>(&device);
        let expected_params = model.num_params();
        let weights = save_artifact(model, &config, dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());

        let stored = LungClassifierConfig::load_beside(&weights).unwrap().unwrap();
        assert_eq!(stored.hidden_units, 32);

        let loaded = RealClassifier::<TestBackend>::load(&weights, &stored, device).unwrap();
        assert_eq!(loaded.num_params(), expected_params);

        // Same file against a wider head must be rejected
        let wider = LungClassifierConfig::new().with_hidden_units(64).with_hidden_units_2(16);
        let result = RealClassifier::<TestBackend>::load(&weights, &wider, Default::default());
        assert!(matches!(result, Err(LungScanError::ModelLoad(_))));
    }
}
