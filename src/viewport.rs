//! Pan/zoom camera over a laid-out graph.
//!
//! A point `g` in graph space lands on screen at `g * scale + offset`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ViewportConfig;
use crate::layout::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewportState {
    fn lerp(&self, to: &ViewportState, t: f64) -> ViewportState {
        ViewportState {
            scale: self.scale + (to.scale - self.scale) * t,
            offset_x: self.offset_x + (to.offset_x - self.offset_x) * t,
            offset_y: self.offset_y + (to.offset_y - self.offset_y) * t,
        }
    }
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[derive(Debug, Clone)]
struct Animation {
    from: ViewportState,
    to: ViewportState,
    duration: Duration,
    /// Frame time of the first tick; unset until then.
    started: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    state: ViewportState,
    width: f64,
    height: f64,
    config: ViewportConfig,
    animation: Option<Animation>,
}

impl ViewportController {
    pub fn new(config: ViewportConfig, width: f64, height: f64) -> Self {
        let mut controller = Self {
            state: ViewportState::default(),
            width,
            height,
            config: config.sanitized(),
            animation: None,
        };
        controller.state.scale = controller.clamp_scale(1.0);
        controller
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    /// Clamps into the configured range. NaN maps to the minimum scale.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        let lo = self.config.min_scale.min(self.config.max_scale);
        let hi = self.config.min_scale.max(self.config.max_scale);
        if scale.is_nan() {
            return lo;
        }
        scale.max(lo).min(hi)
    }

    pub fn screen_to_graph(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.state.offset_x) / self.state.scale,
            (point.y - self.state.offset_y) / self.state.scale,
        )
    }

    pub fn graph_to_screen(&self, point: Point) -> Point {
        Point::new(
            point.x * self.state.scale + self.state.offset_x,
            point.y * self.state.scale + self.state.offset_y,
        )
    }

    /// Largest scale at which a `width` x `height` box fits inside the
    /// viewport with `fit_padding` on every side, capped by `max_fit_scale`.
    pub fn scale_for_bounds(&self, width: f64, height: f64) -> f64 {
        let padding = self.config.fit_padding * 2.0;
        let available_w = (self.width - padding).max(1.0);
        let available_h = (self.height - padding).max(1.0);
        let mut scale = self.config.max_fit_scale;
        if width > 0.0 {
            scale = scale.min(available_w / width);
        }
        if height > 0.0 {
            scale = scale.min(available_h / height);
        }
        self.clamp_scale(scale)
    }

    fn centered_on(&self, center: Point, scale: f64) -> ViewportState {
        ViewportState {
            scale,
            offset_x: self.width / 2.0 - center.x * scale,
            offset_y: self.height / 2.0 - center.y * scale,
        }
    }

    /// Fits a whole layout into a viewport of the given size and centers it.
    pub fn zoom_to_fit(
        &mut self,
        layout_width: f64,
        layout_height: f64,
        viewport_width: f64,
        viewport_height: f64,
    ) -> ViewportState {
        self.resize(viewport_width, viewport_height);
        let scale = self.scale_for_bounds(layout_width, layout_height);
        let target = self.centered_on(Point::new(layout_width / 2.0, layout_height / 2.0), scale);
        self.transition(target, false);
        target
    }

    /// Centers `rect`. Without `target_scale` the box fills `box_fill_ratio`
    /// of the viewport.
    pub fn zoom_to_box(&mut self, rect: Rect, animate: bool, target_scale: Option<f64>) {
        let scale = match target_scale {
            Some(scale) => scale,
            None => {
                let ratio = self.config.box_fill_ratio;
                let fit_w = if rect.width > 0.0 { self.width * ratio / rect.width } else { f64::INFINITY };
                let fit_h = if rect.height > 0.0 { self.height * ratio / rect.height } else { f64::INFINITY };
                fit_w.min(fit_h)
            }
        };
        let target = self.centered_on(rect.center(), self.clamp_scale(scale));
        tracing::trace!(scale = target.scale, animate, "zoom to box");
        self.transition(target, animate);
    }

    /// Centers a graph-space point at the current scale.
    pub fn zoom_to_coords(&mut self, x: f64, y: f64, animate: bool) {
        let target = self.centered_on(Point::new(x, y), self.state.scale);
        self.transition(target, animate);
    }

    /// Centers a layout, zooming out only as far as needed to fit it.
    pub fn autocenter(&mut self, layout_width: f64, layout_height: f64, animate: bool) {
        let scale = self
            .state
            .scale
            .min(self.scale_for_bounds(layout_width, layout_height));
        let target = self.centered_on(
            Point::new(layout_width / 2.0, layout_height / 2.0),
            self.clamp_scale(scale),
        );
        self.transition(target, animate);
    }

    /// Zooms around the viewport center.
    pub fn set_scale(&mut self, scale: f64) {
        let center = Point::new(self.width / 2.0, self.height / 2.0);
        let factor = self.clamp_scale(scale) / self.state.scale;
        self.zoom_at(center, factor);
    }

    /// Multiplies the scale by `factor`, keeping the graph point under
    /// `screen_point` fixed. Cancels any running animation.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.animation = None;
        let anchor = self.screen_to_graph(screen_point);
        let scale = self.clamp_scale(self.state.scale * factor);
        self.state = ViewportState {
            scale,
            offset_x: screen_point.x - anchor.x * scale,
            offset_y: screen_point.y - anchor.y * scale,
        };
    }

    /// Wheel zoom: positive `notches` zoom in by `wheel_zoom_step` each.
    pub fn wheel(&mut self, screen_point: Point, notches: f64) {
        self.zoom_at(screen_point, self.config.wheel_zoom_step.powf(notches));
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.animation = None;
        self.state.offset_x += dx;
        self.state.offset_y += dy;
    }

    fn transition(&mut self, target: ViewportState, animate: bool) {
        // Durations too long to represent jump straight to the target.
        let duration = Duration::try_from_secs_f64(self.config.animation_duration_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::ZERO);
        if animate && !duration.is_zero() {
            self.animation = Some(Animation {
                from: self.state,
                to: target,
                duration,
                started: None,
            });
        } else {
            self.animation = None;
            self.state = target;
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Advances the running animation to frame time `now`. Returns whether
    /// more frames are needed.
    pub fn tick(&mut self, now: Duration) -> bool {
        let Some(animation) = self.animation.as_mut() else {
            return false;
        };
        let started = *animation.started.get_or_insert(now);
        let elapsed = now.saturating_sub(started);
        let t = (elapsed.as_secs_f64() / animation.duration.as_secs_f64()).clamp(0.0, 1.0);
        if t >= 1.0 {
            self.state = animation.to;
            self.animation = None;
            return false;
        }
        self.state = animation.from.lerp(&animation.to, ease_in_out_cubic(t));
        true
    }

    /// Graph-space rectangle currently on screen.
    pub fn visible_rect(&self) -> Rect {
        let origin = self.screen_to_graph(Point::new(0.0, 0.0));
        Rect::new(
            origin.x,
            origin.y,
            self.width / self.state.scale,
            self.height / self.state.scale,
        )
    }

    pub fn is_offscreen(&self, bounds: &Rect) -> bool {
        !self.visible_rect().intersects(bounds)
    }
}
