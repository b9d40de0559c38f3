use egui::{Color32, Pos2, Rect};

use crate::ping::Latency;

/// Top of the fixed Y axis, in milliseconds.
pub const Y_MAX_MS: f64 = 500.0;
pub const Y_GRID_STEP_MS: f64 = 100.0;

const PALETTE: [Color32; 8] = [
    Color32::from_rgb(31, 119, 180),
    Color32::from_rgb(255, 127, 14),
    Color32::from_rgb(44, 160, 44),
    Color32::from_rgb(214, 39, 40),
    Color32::from_rgb(148, 103, 189),
    Color32::from_rgb(140, 86, 75),
    Color32::from_rgb(227, 119, 194),
    Color32::from_rgb(23, 190, 207),
];

pub fn series_color(index: usize) -> Color32 {
    PALETTE[index % PALETTE.len()]
}

/// Maps window positions and latencies into the plot rectangle.
#[derive(Debug, Clone, Copy)]
pub struct ChartGeometry {
    pub rect: Rect,
    pub max_points: usize,
}

impl ChartGeometry {
    pub fn new(rect: Rect, max_points: usize) -> Self {
        Self { rect, max_points }
    }

    pub fn x(&self, index: usize) -> f32 {
        let span = self.max_points.max(1) as f32;
        self.rect.left() + self.rect.width() * (index as f32 / span)
    }

    /// Values past the top of the axis are pinned to the top edge.
    pub fn y(&self, latency_ms: f64) -> f32 {
        let fraction = (latency_ms.clamp(0.0, Y_MAX_MS) / Y_MAX_MS) as f32;
        self.rect.bottom() - self.rect.height() * fraction
    }

    pub fn point(&self, index: usize, latency_ms: f64) -> Pos2 {
        Pos2::new(self.x(index), self.y(latency_ms))
    }

    /// Splits a window into connected runs; lost samples leave a gap.
    pub fn polylines(&self, points: &[Latency]) -> Vec<Vec<Pos2>> {
        let mut runs = Vec::new();
        let mut current = Vec::new();
        for (index, value) in points.iter().enumerate() {
            match value {
                Some(ms) => current.push(self.point(index, *ms)),
                None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
                None => {}
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    pub fn grid_values() -> impl Iterator<Item = f64> {
        let steps = (Y_MAX_MS / Y_GRID_STEP_MS) as usize;
        (0..=steps).map(|step| step as f64 * Y_GRID_STEP_MS)
    }
}
