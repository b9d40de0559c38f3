pub mod chart;
pub mod config;
pub mod ping;
pub mod ping_executor;
pub mod sample_log;
pub mod sample_store;
pub mod sampler;

use std::time::Duration;

use eframe::egui;
use egui::{Align2, Color32, FontId, Pos2, Sense, Shape, Stroke, Vec2};
use tokio::sync::watch;

use chart::{ChartGeometry, series_color};
use sample_store::WindowSnapshot;

pub use config::AppConfig;
pub use ping::{Latency, Sample};
pub use ping_executor::{CommandProbe, IcmpProbe, PlatformFamily, Probe, ProbeBackend};
pub use sample_log::{LogError, SampleLog};
pub use sample_store::SampleStore;
pub use sampler::Monitor;

const CHART_MARGIN: f32 = 40.0;

/// Live chart of the most recent samples, fed by the sampling thread.
pub struct PingLoggerApp {
    receiver: watch::Receiver<WindowSnapshot>,
    snapshot: WindowSnapshot,
    closing: bool,
}

impl PingLoggerApp {
    pub fn new(receiver: watch::Receiver<WindowSnapshot>) -> Self {
        let snapshot = receiver.borrow().clone();
        Self {
            receiver,
            snapshot,
            closing: false,
        }
    }

    /// Picks up the latest published round. Returns false once the sampler is gone.
    fn refresh(&mut self) -> bool {
        match self.receiver.has_changed() {
            Ok(true) => {
                self.snapshot = self.receiver.borrow_and_update().clone();
                true
            }
            Ok(false) => true,
            Err(_) => false,
        }
    }

    fn draw_legend(&self, ui: &mut egui::Ui) {
        for (index, series) in self.snapshot.series.iter().enumerate() {
            let stats = &series.statistics;
            let last = match stats.last_response {
                Some(ms) => format!("{ms:.1} ms"),
                None if stats.total_pings == 0 => "-".to_string(),
                None => "Timeout".to_string(),
            };
            ui.horizontal(|ui| {
                ui.colored_label(series_color(index), format!("● {}", series.host));
                ui.label(format!(
                    "last {last} | mean {:.1} ms | loss {:.1}%",
                    stats.mean_response_time, stats.loss_rate
                ));
            });
        }
    }

    fn draw_chart(&self, ui: &mut egui::Ui) {
        let size = Vec2::new(ui.available_width(), ui.available_height().max(200.0));
        let (outer, _) = ui.allocate_exact_size(size, Sense::hover());
        let plot = outer.shrink2(Vec2::new(CHART_MARGIN, CHART_MARGIN / 2.0));
        let geometry = ChartGeometry::new(plot, self.snapshot.max_points);

        let painter = ui.painter_at(outer);
        let axis = Stroke::new(1.0, Color32::GRAY);
        let grid = Stroke::new(0.5, Color32::from_gray(200));
        let text = Color32::DARK_GRAY;

        for value in ChartGeometry::grid_values() {
            let y = geometry.y(value);
            painter.line_segment([Pos2::new(plot.left(), y), Pos2::new(plot.right(), y)], grid);
            painter.text(
                Pos2::new(plot.left() - 4.0, y),
                Align2::RIGHT_CENTER,
                format!("{value:.0}"),
                FontId::default(),
                text,
            );
        }
        painter.line_segment([plot.left_bottom(), plot.right_bottom()], axis);
        painter.line_segment([plot.left_bottom(), plot.left_top()], axis);

        painter.text(
            Pos2::new(plot.left(), outer.top()),
            Align2::LEFT_TOP,
            "Ping (ms)",
            FontId::default(),
            text,
        );
        painter.text(
            Pos2::new(plot.center().x, outer.bottom()),
            Align2::CENTER_BOTTOM,
            format!("Last {} intervals", self.snapshot.max_points),
            FontId::default(),
            text,
        );

        let plot_painter = painter.with_clip_rect(plot.expand(2.0));
        for (index, series) in self.snapshot.series.iter().enumerate() {
            let color = series_color(index);
            for run in geometry.polylines(&series.points) {
                if let [single] = run.as_slice() {
                    plot_painter.circle_filled(*single, 2.0, color);
                } else {
                    plot_painter.add(Shape::line(run, Stroke::new(1.5, color)));
                }
            }
        }
    }
}

impl eframe::App for PingLoggerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.refresh() && !self.closing {
            log::info!("Sampler stopped; closing window");
            self.closing = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Ping Logger");
            self.draw_legend(ui);
            ui.separator();
            self.draw_chart(ui);
        });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
