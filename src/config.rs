use crate::ir::Size;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Gap between neighbouring vertices in a layer.
    pub node_spacing: f64,
    /// Gap between consecutive layers. Raised to fit two group paddings and a
    /// group label when configured smaller.
    pub rank_spacing: f64,
    /// Width reserved for an edge passing through a layer.
    pub edge_gap: f64,
    pub group_padding: f64,
    pub group_label_height: f64,
    pub collapsed_group_size: Size,
    /// Upper bound on barycenter sweeps.
    pub order_passes: usize,
    /// Upper bound on coordinate alignment sweeps.
    pub align_passes: usize,
    pub margin: f64,
    /// Treat the only group of a single-group graph as expanded.
    pub expand_lone_group: bool,
    pub sizer: SizerConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing: 40.0,
            rank_spacing: 80.0,
            edge_gap: 10.0,
            group_padding: 20.0,
            group_label_height: 30.0,
            collapsed_group_size: Size::new(320.0, 110.0),
            order_passes: 8,
            align_passes: 4,
            margin: 50.0,
            expand_lone_group: true,
            sizer: SizerConfig::default(),
        }
    }
}

impl LayoutConfig {
    pub fn effective_rank_spacing(&self) -> f64 {
        self.rank_spacing
            .max(self.group_padding * 2.0 + self.group_label_height)
    }
}

/// Metrics for the built-in label-length node sizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SizerConfig {
    pub char_width: f64,
    pub padding_x: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub asset_height: f64,
    pub op_height: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            char_width: 7.2,
            padding_x: 40.0,
            min_width: 160.0,
            max_width: 320.0,
            asset_height: 90.0,
            op_height: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Largest scale zoom-to-fit will pick, so small graphs are not blown up.
    pub max_fit_scale: f64,
    /// Screen pixels kept free around content when fitting.
    pub fit_padding: f64,
    /// Fraction of the viewport a box fills after zoom-to-box without a target scale.
    pub box_fill_ratio: f64,
    pub animation_duration_ms: f64,
    /// Multiplier applied per wheel notch.
    pub wheel_zoom_step: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.01,
            max_scale: 1.0,
            max_fit_scale: 1.0,
            fit_padding: 40.0,
            box_fill_ratio: 0.9,
            animation_duration_ms: 400.0,
            wheel_zoom_step: 1.1,
        }
    }
}

impl ViewportConfig {
    /// Replaces values the camera cannot work with: non-positive or
    /// non-finite scale bounds fall back to the defaults, an inverted range is
    /// swapped and an unusable animation duration disables animation.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.min_scale.is_finite() && self.min_scale > 0.0) {
            tracing::warn!(min = self.min_scale, "viewport minScale must be positive; using default");
            self.min_scale = defaults.min_scale;
        }
        if !(self.max_scale.is_finite() && self.max_scale > 0.0) {
            tracing::warn!(max = self.max_scale, "viewport maxScale must be positive; using default");
            self.max_scale = defaults.max_scale;
        }
        if self.min_scale > self.max_scale {
            tracing::warn!(
                min = self.min_scale,
                max = self.max_scale,
                "viewport minScale exceeds maxScale; swapping"
            );
            std::mem::swap(&mut self.min_scale, &mut self.max_scale);
        }
        if !(self.animation_duration_ms.is_finite() && self.animation_duration_ms >= 0.0) {
            tracing::warn!(
                duration_ms = self.animation_duration_ms,
                "viewport animationDurationMs is unusable; disabling animation"
            );
            self.animation_duration_ms = 0.0;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub layout: LayoutConfig,
    pub viewport: ViewportConfig,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let contents = std::fs::read_to_string(path)?;
    let mut config: Config = serde_json::from_str(&contents)?;

    config.viewport = config.viewport.sanitized();
    config.layout.order_passes = config.layout.order_passes.max(1);
    Ok(config)
}
