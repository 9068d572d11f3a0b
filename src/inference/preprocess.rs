//! Image Preprocessing Module
//!
//! Turns an arbitrary uploaded byte buffer into the fixed-shape tensor the
//! classifier consumes:
//! - format sniffing from magic bytes (PNG, JPEG, GIF, BMP)
//! - decoding with the `image` crate
//! - exact resize to 224x224 (aspect ratio is not preserved)
//! - conversion to RGB (gray replicated, alpha dropped)
//! - scaling to `[0, 1]`

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::error::{LungScanError, Result};

/// Side length of the square network input
pub const INPUT_SIZE: usize = 224;

/// Number of input channels (RGB)
pub const INPUT_CHANNELS: usize = 3;

/// Number of f32 values in one input tensor
pub const TENSOR_LEN: usize = INPUT_CHANNELS * INPUT_SIZE * INPUT_SIZE;

/// Pixel scale: the reference model was trained on `pixel / 255`
pub const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// Formats accepted for upload
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Interpolation used when resizing to the network input size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    /// Bilinear (triangle) interpolation
    #[default]
    Bilinear,
    /// Nearest neighbour, matching Keras `load_img` defaults
    Nearest,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Nearest => FilterType::Nearest,
        }
    }
}

/// Configuration for image preprocessing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Resize interpolation
    #[serde(default)]
    pub filter: ResizeFilter,
}

/// Normalized network input, CHW layout `[3, 224, 224]`, values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    /// Shape in CHW order
    pub const SHAPE: [usize; 3] = [INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE];

    /// Build a tensor from raw CHW data, checking shape and range
    pub fn from_vec(data: Vec<f32>) -> Result<Self> {
        if data.len() != TENSOR_LEN {
            return Err(LungScanError::Inference(format!(
                "tensor has {} values, expected {}",
                data.len(),
                TENSOR_LEN
            )));
        }
        if data.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(LungScanError::Inference(
                "tensor values must lie in [0, 1]".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// Values in CHW order
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// First 8 bytes of the SHA-256 of the little-endian f32 values
    ///
    /// Fixed algorithm, so the digest is the same across builds and platforms.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        for v in &self.data {
            hasher.update(v.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(prefix)
    }
}

/// Image preprocessor for chest X-ray uploads
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    /// Creates a new image preprocessor with the given configuration
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode, validate and normalize an uploaded byte buffer
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let image = self.decode(bytes)?;
        Ok(self.preprocess_image(&image))
    }

    /// Sniff the format and decode, rejecting anything that is not a raster
    /// image of a supported format
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(LungScanError::InvalidImage("empty payload".to_string()));
        }

        let format = image::guess_format(bytes).map_err(|_| {
            LungScanError::InvalidImage("unrecognized image format".to_string())
        })?;
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(LungScanError::InvalidImage(format!(
                "unsupported image format: {:?}",
                format
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(LungScanError::InvalidImage(format!(
                "image has zero dimension ({}x{})",
                image.width(),
                image.height()
            )));
        }

        Ok(image)
    }

    /// Resize and normalize an already decoded image
    pub fn preprocess_image(&self, image: &DynamicImage) -> ImageTensor {
        let size = INPUT_SIZE as u32;
        // Alpha is dropped before resizing so it never bleeds into the colour planes
        let rgb = image::imageops::resize(
            &image.to_rgb8(),
            size,
            size,
            self.config.filter.filter_type(),
        );

        let num_pixels = INPUT_SIZE * INPUT_SIZE;
        let mut data = vec![0.0f32; TENSOR_LEN];

        // CHW layout: all R values, then all G values, then all B values
        for (i, pixel) in rgb.pixels().enumerate() {
            data[i] = pixel[0] as f32 * PIXEL_SCALE;
            data[num_pixels + i] = pixel[1] as f32 * PIXEL_SCALE;
            data[2 * num_pixels + i] = pixel[2] as f32 * PIXEL_SCALE;
        }

        ImageTensor { data }
    }
}
