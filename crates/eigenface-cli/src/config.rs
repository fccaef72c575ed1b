use clap::{Args, ValueEnum};
use eigenface_core::{FitPolicy, RecognizerConfig};
use std::str::FromStr;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Face size, fit policy, localisation, components and k.
    pub recognizer: RecognizerConfig,
    /// Median filter window applied to every prepared face (0 or 1 disables).
    pub median_window: usize,
}

impl Config {
    /// Load configuration from `EIGENFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RecognizerConfig::default();
        Self {
            recognizer: RecognizerConfig {
                face_width: parsed(&get, "EIGENFACE_FACE_WIDTH").unwrap_or(defaults.face_width),
                face_height: parsed(&get, "EIGENFACE_FACE_HEIGHT").unwrap_or(defaults.face_height),
                fit: get("EIGENFACE_FIT")
                    .and_then(|v| parse_fit(&v))
                    .unwrap_or(defaults.fit),
                crop: get("EIGENFACE_CROP")
                    .map(|v| v != "0")
                    .unwrap_or(defaults.crop),
                components: parsed(&get, "EIGENFACE_COMPONENTS").unwrap_or(defaults.components),
                neighbours: parsed(&get, "EIGENFACE_NEIGHBOURS").unwrap_or(defaults.neighbours),
            },
            median_window: parsed(&get, "EIGENFACE_MEDIAN_WINDOW").unwrap_or(0),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|v| v.trim().parse().ok())
}

fn parse_fit(value: &str) -> Option<FitPolicy> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "inside" | "fit_inside" => Some(FitPolicy::FitInside),
        "outside" | "fit_outside" => Some(FitPolicy::FitOutside),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FitArg {
    /// Pad the scaled face with black
    Inside,
    /// Centre-crop the scaled face
    Outside,
}

impl From<FitArg> for FitPolicy {
    fn from(arg: FitArg) -> Self {
        match arg {
            FitArg::Inside => FitPolicy::FitInside,
            FitArg::Outside => FitPolicy::FitOutside,
        }
    }
}

/// Command-line overrides for the environment configuration.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Face raster width
    #[arg(long, global = true)]
    pub width: Option<u32>,
    /// Face raster height
    #[arg(long, global = true)]
    pub height: Option<u32>,
    /// How the located face is scaled into the raster
    #[arg(long, global = true, value_enum)]
    pub fit: Option<FitArg>,
    /// Skip skin-colour localisation and resize the whole photo
    #[arg(long, global = true)]
    pub no_crop: bool,
    /// Eigenface coefficients per feature vector
    #[arg(long, global = true)]
    pub components: Option<usize>,
    /// Neighbours consulted by the k-NN vote
    #[arg(short = 'k', long, global = true)]
    pub neighbours: Option<usize>,
    /// Median filter window for prepared faces
    #[arg(long, global = true)]
    pub median: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        let recognizer = &mut config.recognizer;
        if let Some(width) = self.width {
            recognizer.face_width = width;
        }
        if let Some(height) = self.height {
            recognizer.face_height = height;
        }
        if let Some(fit) = self.fit {
            recognizer.fit = fit.into();
        }
        if self.no_crop {
            recognizer.crop = false;
        }
        if let Some(components) = self.components {
            recognizer.components = components;
        }
        if let Some(neighbours) = self.neighbours {
            recognizer.neighbours = neighbours;
        }
        if let Some(window) = self.median {
            config.median_window = window;
        }
    }
}
