//! Gallery loading: a directory tree of photos labelled by folder name.

use anyhow::{Context, Result};
use eigenface_core::{median_filter, ColorRaster, FaceLocator, FaceSample, GrayRaster};
use std::path::{Path, PathBuf};

use crate::config::Config;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Turns photos on disk into prepared face samples.
pub struct GalleryLoader {
    locator: FaceLocator,
    crop: bool,
    median_window: usize,
}

impl GalleryLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            locator: FaceLocator::from_config(&config.recognizer),
            crop: config.recognizer.crop,
            median_window: config.median_window,
        }
    }

    pub fn locator(&self) -> &FaceLocator {
        &self.locator
    }

    /// Load every image under `root`.
    ///
    /// Images in a sub-folder take the folder name as label; images directly
    /// under `root` stay unlabelled.
    pub fn load_dir(&self, root: &Path) -> Result<Vec<FaceSample>> {
        let paths = image_paths(root)?;
        anyhow::ensure!(!paths.is_empty(), "no .jpg or .png images under {}", root.display());

        let mut samples = Vec::with_capacity(paths.len());
        for path in paths {
            let raster = self.load_face(&path)?;
            let mut sample = FaceSample::new(raster).with_description(path.display().to_string());
            if let Some(label) = label_for(root, &path) {
                sample = sample.with_label(label);
            }
            samples.push(sample);
        }

        tracing::info!(root = %root.display(), samples = samples.len(), "gallery loaded");
        Ok(samples)
    }

    /// Decode one photo and prepare it as a face raster.
    pub fn load_face(&self, path: &Path) -> Result<GrayRaster> {
        let photo = load_color(path)?;
        let face = self.locator.prepare(&photo, self.crop);
        if self.median_window > 1 {
            return Ok(median_filter(&face, self.median_window));
        }
        Ok(face)
    }
}

/// Decode `path` into an RGB raster.
pub fn load_color(path: &Path) -> Result<ColorRaster> {
    let image = image::open(path)
        .with_context(|| format!("failed to load image {}", path.display()))?;
    Ok(ColorRaster::from(&image.to_rgb8()))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parent folder name, unless the image sits directly under `root`.
fn label_for(root: &Path, path: &Path) -> Option<String> {
    let parent = path.parent()?;
    if parent == root {
        return None;
    }
    parent.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// All image files below `root`, sorted for a reproducible gallery order.
fn image_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_image(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
