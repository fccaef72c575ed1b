//! Skin-colour face localisation.
//!
//! Segments likely skin pixels with a log-opponent intensity/hue model,
//! takes the bounding box of what survives two erosion passes, crops the
//! original photo to that box and resizes it to a fixed face raster.

use crate::types::{ColorRaster, GrayRaster, RasterImage, RecognizerConfig};
use serde::{Deserialize, Serialize};

// --- Segmentation constants ---
const BORDER_MARGIN: u32 = 2;
const SKIN_INTENSITY_MAX: f64 = 6.0;
const SKIN_HUE_MIN: f64 = 70.0;
const SKIN_HUE_MAX: f64 = 150.0;
/// Packed 24-bit RGB value a mask pixel must exceed to count as face.
const BRIGHTNESS_THRESHOLD: u32 = 50;
const SEGMENTATION_PASSES: usize = 2;

const BLACK: [u8; 3] = [0, 0, 0];

/// How a crop is scaled into the fixed target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Scale so the whole crop fits, pad the rest with black.
    FitInside,
    /// Scale so the crop covers the box, centre-crop the overflow.
    FitOutside,
}

/// Face bounding box in source pixel coordinates.
///
/// Half-open: `right` and `bottom` are one past the last covered pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Classify a pixel as skin using the log-opponent colour model.
///
/// Zero channels take `ln 0 = -inf`. Two or more zero channels give a NaN
/// hue and are never skin. A single zero green channel drives the hue to
/// 90 degrees with an intensity of `-inf`, so e.g. `[200, 0, 100]` counts
/// as skin.
pub fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (lr, lg, lb) = ((r as f64).ln(), (g as f64).ln(), (b as f64).ln());

    let intensity = (lr + lg + lb) / 3.0;
    let red_green = lr - lg;
    let blue_yellow = lb - (lb + lr) / 2.0;
    let hue = red_green.atan2(blue_yellow).to_degrees();

    intensity <= SKIN_INTENSITY_MAX && (SKIN_HUE_MIN..=SKIN_HUE_MAX).contains(&hue)
}

fn packed(rgb: [u8; 3]) -> u32 {
    (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32
}

/// Whether the raster has any pixels outside the border margin.
fn has_interior(width: u32, height: u32) -> bool {
    width > 2 * BORDER_MARGIN && height > 2 * BORDER_MARGIN
}

/// One segmentation pass.
///
/// Skin pixels keep their colour; every other interior pixel blacks out the
/// 5x5 neighbourhood around it in the output mask.
fn segment(src: &ColorRaster) -> ColorRaster {
    let (w, h) = (src.width(), src.height());
    let mut mask = src.pixels().to_vec();

    if has_interior(w, h) {
        let stride = w as usize;
        for x in BORDER_MARGIN..w - BORDER_MARGIN {
            for y in BORDER_MARGIN..h - BORDER_MARGIN {
                let idx = y as usize * stride + x as usize;
                let pixel = src.pixels()[idx];
                if is_skin(pixel) {
                    mask[idx] = pixel;
                } else {
                    for ny in y - BORDER_MARGIN..=y + BORDER_MARGIN {
                        for nx in x - BORDER_MARGIN..=x + BORDER_MARGIN {
                            mask[ny as usize * stride + nx as usize] = BLACK;
                        }
                    }
                }
            }
        }
    }

    RasterImage::from_parts(w, h, mask)
}

/// Bounding box of bright interior mask pixels, grown from a zero-area box
/// at the image centre.
fn bright_region(mask: &ColorRaster) -> FaceRegion {
    let (w, h) = (mask.width(), mask.height());
    let mut region = FaceRegion {
        left: w / 2,
        top: h / 2,
        right: w / 2,
        bottom: h / 2,
    };

    if !has_interior(w, h) {
        return region;
    }

    let stride = w as usize;
    for y in BORDER_MARGIN..h - BORDER_MARGIN {
        for x in BORDER_MARGIN..w - BORDER_MARGIN {
            if packed(mask.pixels()[y as usize * stride + x as usize]) > BRIGHTNESS_THRESHOLD {
                region.left = region.left.min(x);
                region.right = region.right.max(x + 1);
                region.top = region.top.min(y);
                region.bottom = region.bottom.max(y + 1);
            }
        }
    }

    region
}

/// Heuristic face finder producing fixed-size face rasters.
#[derive(Debug, Clone)]
pub struct FaceLocator {
    width: u32,
    height: u32,
    fit: FitPolicy,
}

impl Default for FaceLocator {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl FaceLocator {
    pub fn new(width: u32, height: u32, fit: FitPolicy) -> Self {
        Self { width, height, fit }
    }

    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self::new(config.face_width, config.face_height, config.fit)
    }

    /// Target raster size as `(width, height)`.
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Find the probable face rectangle in a colour photo.
    ///
    /// Never fails: an image without skin pixels yields a zero-area region
    /// at its centre.
    pub fn locate(&self, image: &ColorRaster) -> FaceRegion {
        let mut mask = segment(image);
        for _ in 1..SEGMENTATION_PASSES {
            mask = segment(&mask);
        }
        let region = bright_region(&mask);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            left = region.left,
            top = region.top,
            right = region.right,
            bottom = region.bottom,
            "located face region"
        );

        region
    }

    /// Locate the face, crop the original pixels to it and resize to the target.
    pub fn crop(&self, image: &ColorRaster) -> ColorRaster {
        let region = self.locate(image);
        if region.is_empty() {
            tracing::debug!("no skin-coloured pixels found; returning blank face");
        }
        let face = image.crop(region.left, region.top, region.right, region.bottom);
        self.resize(&face)
    }

    /// Full preprocessing for one photo: optional localisation, resize, grayscale.
    pub fn prepare(&self, image: &ColorRaster, crop: bool) -> GrayRaster {
        let face = if crop {
            self.crop(image)
        } else {
            self.resize(image)
        };
        face.to_gray()
    }

    /// Bilinear resize into the target box, preserving aspect ratio.
    ///
    /// An empty source produces an all-black raster.
    pub fn resize(&self, image: &ColorRaster) -> ColorRaster {
        let (tw, th) = (self.width as usize, self.height as usize);
        let (sw, sh) = (image.width() as usize, image.height() as usize);

        if image.is_empty() || tw == 0 || th == 0 {
            return ColorRaster::filled(self.width, self.height, BLACK);
        }

        let scale_w = tw as f64 / sw as f64;
        let scale_h = th as f64 / sh as f64;
        let scale = match self.fit {
            FitPolicy::FitInside => scale_w.min(scale_h),
            FitPolicy::FitOutside => scale_w.max(scale_h),
        };

        let new_w = ((sw as f64 * scale).round() as usize).max(1);
        let new_h = ((sh as f64 * scale).round() as usize).max(1);
        // Negative offsets centre-crop, positive ones pad.
        let off_x = (tw as i64 - new_w as i64) / 2;
        let off_y = (th as i64 - new_h as i64) / 2;
        let inv_x = sw as f64 / new_w as f64;
        let inv_y = sh as f64 / new_h as f64;

        let src = image.pixels();
        let mut out = vec![BLACK; tw * th];

        for ty in 0..th {
            let sy = ty as i64 - off_y;
            if sy < 0 || sy >= new_h as i64 {
                continue;
            }
            let src_y = (sy as f64 + 0.5) * inv_y - 0.5;
            let (y0, y1) = bracket(src_y, sh);
            let fy = src_y - src_y.floor();

            for tx in 0..tw {
                let sx = tx as i64 - off_x;
                if sx < 0 || sx >= new_w as i64 {
                    continue;
                }
                let src_x = (sx as f64 + 0.5) * inv_x - 0.5;
                let (x0, x1) = bracket(src_x, sw);
                let fx = src_x - src_x.floor();

                let tl = src[y0 * sw + x0];
                let tr = src[y0 * sw + x1];
                let bl = src[y1 * sw + x0];
                let br = src[y1 * sw + x1];

                let mut pixel = BLACK;
                for c in 0..3 {
                    let val = tl[c] as f64 * (1.0 - fx) * (1.0 - fy)
                        + tr[c] as f64 * fx * (1.0 - fy)
                        + bl[c] as f64 * (1.0 - fx) * fy
                        + br[c] as f64 * fx * fy;
                    pixel[c] = val.round().clamp(0.0, 255.0) as u8;
                }
                out[ty * tw + tx] = pixel;
            }
        }

        RasterImage::from_parts(self.width, self.height, out)
    }
}

/// Source indices bracketing `pos`, each clamped to `0..len` on its own.
fn bracket(pos: f64, len: usize) -> (usize, usize) {
    let floor = pos.floor() as i64;
    let last = len as i64 - 1;
    (floor.clamp(0, last) as usize, (floor + 1).clamp(0, last) as usize)
}

/// Median filter over a square `window`.
///
/// Pixels closer than half a window to the border are copied unchanged.
pub fn median_filter(raster: &GrayRaster, window: usize) -> GrayRaster {
    let (w, h) = (raster.width() as usize, raster.height() as usize);
    let half = window / 2;
    let src = raster.pixels();
    let mut out = src.to_vec();

    if window < 2 || w <= 2 * half || h <= 2 * half {
        return RasterImage::from_parts(raster.width(), raster.height(), out);
    }

    let mut neighbourhood = Vec::with_capacity((2 * half + 1) * (2 * half + 1));
    for y in half..h - half {
        for x in half..w - half {
            neighbourhood.clear();
            for ny in y - half..=y + half {
                neighbourhood.extend_from_slice(&src[ny * w + x - half..=ny * w + x + half]);
            }
            neighbourhood.sort_by(f64::total_cmp);
            out[y * w + x] = neighbourhood[neighbourhood.len() / 2];
        }
    }

    RasterImage::from_parts(raster.width(), raster.height(), out)
}
