//! Image preprocessing for the udder image classifier.
//!
//! Uploads are sniffed for PNG/JPEG content, resized to the model's input
//! size and flattened into a single-sample NHWC batch with values in [0, 1].

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use serde::Serialize;

use crate::error::{InferenceError, Result};

/// Model input shape without the batch dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: u32, width: u32, channels: usize) -> Self {
        ImageShape {
            height,
            width,
            channels,
        }
    }

    /// Full batch shape `[1, H, W, C]`
    pub fn batch_dims(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, self.channels]
    }

    pub fn num_values(&self) -> usize {
        self.height as usize * self.width as usize * self.channels
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        ImageShape::new(224, 224, 3)
    }
}

/// Preprocessed pixels ready for the image model
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: ImageShape,
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn batch_dims(&self) -> [usize; 4] {
        self.shape.batch_dims()
    }
}

/// Decode an uploaded file, accepting only PNG and JPEG content
pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(InferenceError::MissingInput(
            "Please upload an image first.".to_string(),
        ));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| InferenceError::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg => {}
        other => {
            return Err(InferenceError::UnsupportedFormat(format!(
                "{:?} (expected jpg, jpeg or png)",
                other
            )))
        }
    }

    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| InferenceError::Decode(e.to_string()))
}

/// Resize, convert and normalize an image for a model with the given shape.
///
/// One channel means grayscale, three means RGB; any other count is rejected
/// before any pixel work is done.
pub fn preprocess(image: &DynamicImage, shape: ImageShape) -> Result<ImageTensor> {
    if shape.channels != 1 && shape.channels != 3 {
        return Err(InferenceError::UnsupportedChannels(shape.channels));
    }

    let resized = image.resize_exact(shape.width, shape.height, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    let mut data = Vec::with_capacity(shape.num_values());
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        if shape.channels == 1 {
            data.push(luma(r, g, b) as f32 / 255.0);
        } else {
            data.push(r as f32 / 255.0);
            data.push(g as f32 / 255.0);
            data.push(b as f32 / 255.0);
        }
    }

    Ok(ImageTensor { shape, data })
}

/// ITU-R 601-2 luma in fixed point
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
    l.min(255) as u8
}
