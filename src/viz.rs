// Live amplitude visualizer
//
// Reads the capture pipeline's amplitude tap and redraws a waveform
// polyline on a display-cadence loop. Purely an observer: it has no
// effect on the audio path, and a surface that fails to render must
// swallow its own errors.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Drawing surface boundary; implementations must not propagate render
/// failures back to the caller
pub trait DrawSurface: Send {
    fn draw_polyline(&mut self, points: &[(f32, f32)]);
    fn clear(&mut self);
}

/// Default display refresh cadence (~60 Hz)
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(16);

pub struct Visualizer {
    surface: Box<dyn DrawSurface>,
    amplitude_rx: watch::Receiver<Vec<f32>>,
    active_rx: watch::Receiver<bool>,
    width: f32,
    height: f32,
    refresh: Duration,
}

impl Visualizer {
    pub fn new(
        surface: Box<dyn DrawSurface>,
        amplitude_rx: watch::Receiver<Vec<f32>>,
        active_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            surface,
            amplitude_rx,
            active_rx,
            width: 400.0,
            height: 100.0,
            refresh: REFRESH_INTERVAL,
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Redraw loop: one frame per tick while the session is active.
    ///
    /// On deactivation it performs exactly one final clear and returns,
    /// so no redraw loop outlives session teardown.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.refresh);

        loop {
            ticker.tick().await;

            if !*self.active_rx.borrow() {
                self.surface.clear();
                break;
            }

            let window = self.amplitude_rx.borrow().clone();
            self.draw_frame(&window);
        }

        info!("Visualizer loop terminated");
    }

    fn draw_frame(&mut self, window: &[f32]) {
        if window.is_empty() {
            return;
        }

        let slice_width = self.width / window.len() as f32;
        let mid = self.height / 2.0;

        let points: Vec<(f32, f32)> = window
            .iter()
            .enumerate()
            .map(|(i, &sample)| (i as f32 * slice_width, mid + sample * mid))
            .collect();

        self.surface.draw_polyline(&points);
    }
}
