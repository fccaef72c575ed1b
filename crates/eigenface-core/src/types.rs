use crate::locator::FitPolicy;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default face raster width, in pixels.
pub const DEFAULT_FACE_WIDTH: u32 = 48;
/// Default face raster height, in pixels.
pub const DEFAULT_FACE_HEIGHT: u32 = 64;
/// Default number of eigenface coefficients kept per feature vector.
pub const DEFAULT_COMPONENTS: usize = 10;
/// Default neighbour count for k-NN voting.
pub const DEFAULT_NEIGHBOURS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RasterError {
    #[error("invalid pixel buffer length: expected {expected} ({width}x{height}), got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A row-major image with one value per pixel.
///
/// The buffer length always equals `width * height`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage<P> {
    width: u32,
    height: u32,
    pixels: Vec<P>,
}

/// Full-colour raster as decoded from a photo: `[r, g, b]` per pixel.
pub type ColorRaster = RasterImage<[u8; 3]>;

/// Grayscale intensity raster used for training and projection.
pub type GrayRaster = RasterImage<f64>;

impl<P> RasterImage<P> {
    pub fn new(width: u32, height: u32, pixels: Vec<P>) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RasterError::InvalidLength {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Internal constructor for buffers whose length is already known to match.
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<P>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (`width * height`).
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[P] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<P> {
        self.pixels
    }

    /// Whether both rasters have the same width and height.
    pub fn same_size<Q>(&self, other: &RasterImage<Q>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl<P: Copy> RasterImage<P> {
    /// A raster with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: P) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<P> {
        if x < self.width && y < self.height {
            Some(self.pixels[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Copy of the rectangle `[left, right) x [top, bottom)`.
    ///
    /// Bounds are clamped to the raster; an empty rectangle yields a 0x0 raster.
    pub fn crop(&self, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        let right = right.min(self.width);
        let bottom = bottom.min(self.height);
        let w = right.saturating_sub(left);
        let h = bottom.saturating_sub(top);
        if w == 0 || h == 0 {
            return Self {
                width: 0,
                height: 0,
                pixels: Vec::new(),
            };
        }

        let stride = self.width as usize;
        let mut pixels = Vec::with_capacity(w as usize * h as usize);
        for y in top..bottom {
            let row = y as usize * stride;
            pixels.extend_from_slice(&self.pixels[row + left as usize..row + right as usize]);
        }
        Self {
            width: w,
            height: h,
            pixels,
        }
    }
}

impl ColorRaster {
    /// Unweighted channel mean: `(r + g + b) / 3`.
    pub fn to_gray(&self) -> GrayRaster {
        let pixels = self
            .pixels
            .iter()
            .map(|&[r, g, b]| (r as f64 + g as f64 + b as f64) / 3.0)
            .collect();
        RasterImage {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        let raw = self.pixels.iter().flat_map(|p| p.iter().copied()).collect();
        // Length is width * height * 3 by construction.
        image::RgbImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }
}

impl From<&image::RgbImage> for ColorRaster {
    fn from(img: &image::RgbImage) -> Self {
        let pixels = img.pixels().map(|p| p.0).collect();
        RasterImage {
            width: img.width(),
            height: img.height(),
            pixels,
        }
    }
}

impl GrayRaster {
    /// Flatten into a `width * height` vector (row-major).
    pub fn to_vector(&self) -> Array1<f64> {
        Array1::from_vec(self.pixels.clone())
    }

    /// Rebuild a raster from a flattened vector.
    pub fn from_vector(width: u32, height: u32, values: &Array1<f64>) -> Result<Self, RasterError> {
        Self::new(width, height, values.to_vec())
    }

    /// Render as 8-bit grayscale, clamping to 0..=255.
    pub fn to_luma8(&self) -> image::GrayImage {
        let raw = self
            .pixels
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        image::GrayImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| image::GrayImage::new(self.width, self.height))
    }
}

impl From<&image::GrayImage> for GrayRaster {
    fn from(img: &image::GrayImage) -> Self {
        let pixels = img.pixels().map(|p| p.0[0] as f64).collect();
        RasterImage {
            width: img.width(),
            height: img.height(),
            pixels,
        }
    }
}

/// A face raster with its classification.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub raster: GrayRaster,
    /// Classification label; `None` until assigned.
    pub label: Option<String>,
    pub description: String,
}

impl FaceSample {
    pub fn new(raster: GrayRaster) -> Self {
        Self {
            raster,
            label: None,
            description: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Recognition pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Target face raster width after resizing.
    pub face_width: u32,
    /// Target face raster height after resizing.
    pub face_height: u32,
    pub fit: FitPolicy,
    /// Run skin-colour localisation before resizing.
    pub crop: bool,
    /// Eigenface coefficients per feature vector (clamped to the trained rank).
    pub components: usize,
    /// Neighbours consulted by the k-NN vote.
    pub neighbours: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            face_width: DEFAULT_FACE_WIDTH,
            face_height: DEFAULT_FACE_HEIGHT,
            fit: FitPolicy::FitOutside,
            crop: true,
            components: DEFAULT_COMPONENTS,
            neighbours: DEFAULT_NEIGHBOURS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = GrayRaster::new(2, 2, vec![0.0; 3]).unwrap_err();
        assert_eq!(
            err,
            RasterError::InvalidLength { width: 2, height: 2, expected: 4, actual: 3 }
        );
    }

    #[test]
    fn test_to_gray_channel_mean() {
        let color = ColorRaster::new(2, 1, vec![[30, 60, 90], [255, 255, 255]]).unwrap();
        let gray = color.to_gray();
        assert_eq!(gray.pixels(), &[60.0, 255.0]);
    }

    #[test]
    fn test_crop_rectangle() {
        let raster = GrayRaster::new(3, 3, (0..9).map(|v| v as f64).collect()).unwrap();
        let crop = raster.crop(1, 1, 3, 3);
        assert_eq!((crop.width(), crop.height()), (2, 2));
        assert_eq!(crop.pixels(), &[4.0, 5.0, 7.0, 8.0]);
    }

    #[test]
    fn test_crop_empty() {
        let raster = GrayRaster::filled(4, 4, 1.0);
        let crop = raster.crop(2, 2, 2, 2);
        assert!(crop.is_empty());
        assert_eq!((crop.width(), crop.height()), (0, 0));
    }

    #[test]
    fn test_rgb_image_conversion() {
        let mut img = image::RgbImage::new(2, 2);
        img.put_pixel(1, 0, image::Rgb([10, 20, 30]));
        let raster = ColorRaster::from(&img);
        assert_eq!(raster.get(1, 0), Some([10, 20, 30]));
        assert_eq!(raster.get(2, 0), None);
        assert_eq!(raster.to_rgb_image(), img);
    }

    #[test]
    fn test_to_luma8_clamps() {
        let gray = GrayRaster::new(3, 1, vec![-5.0, 127.6, 300.0]).unwrap();
        let img = gray.to_luma8();
        assert_eq!(img.as_raw(), &vec![0u8, 128, 255]);
    }

    #[test]
    fn test_default_config() {
        let config = RecognizerConfig::default();
        assert_eq!((config.face_width, config.face_height), (48, 64));
        assert_eq!(config.components, 10);
        assert_eq!(config.neighbours, 5);
        assert!(config.crop);
    }
}
