//! Renderer and loader tunables.

use std::path::PathBuf;

bitflags::bitflags! {
    /// Toggles for what the renderer draws.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DrawMode: u32 {
        const STARS = 1;
        const NEBULAE = 2;
        const OBJECTS = 4;
        const EFFECTS = 8;
        const HELPERS = 16;
        const OVERLAY = 32;
        const TEXTURES = 64;
        const LIGHTING = 128;
    }
}

impl Default for DrawMode {
    fn default() -> Self {
        Self::all().difference(Self::HELPERS)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub mode: DrawMode,
    /// Multiplier applied to object LOD override ranges.
    pub lod_bias: f32,
    /// Share of the camera position applied to the backdrop as parallax.
    pub backdrop_scalar: f32,
    /// Render target size relative to the window, for lower quality output.
    pub viewport_scale: f32,
    /// Alpha written by the frame clear.
    pub alpha: f32,
    pub asset_root: PathBuf,
    pub tick_duration_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: DrawMode::default(),
            lod_bias: 1.0,
            backdrop_scalar: 0.0,
            viewport_scale: 1.0,
            alpha: 1.0,
            asset_root: PathBuf::from("./assets"),
            tick_duration_millis: 500,
        }
    }
}

impl Settings {
    /// Defaults overridden by `GLANCER_ASSETS` and `GLANCER_LOD_BIAS`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup, so callers can inject values.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup("GLANCER_ASSETS") {
            self.asset_root = PathBuf::from(root);
        }
        if let Some(bias) = lookup("GLANCER_LOD_BIAS") {
            match bias.parse::<f32>() {
                Ok(bias) if bias > 0.0 && bias.is_finite() => self.lod_bias = bias,
                _ => log::warn!("ignoring GLANCER_LOD_BIAS={bias}, expected a positive number"),
            }
        }
        self
    }
}
