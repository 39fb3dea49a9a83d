use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_millis(500);

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    pub fps: f32,
}

impl FrameTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            fps: 0.0,
        }
    }

    /// Advance one frame. Returns true when `fps` was refreshed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let dt = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::from_millis(16),
        };
        self.last_frame_time = Some(now);
        // Long stalls (dialogs, dragging the window) must not turn into a camera jump.
        self.frame_dt = dt.as_secs_f32().min(0.1);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed < FPS_WINDOW {
            return false;
        }
        self.fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_fps_time = now;
        true
    }

    pub fn title(&self, base: &str, status: Option<&str>) -> String {
        match status {
            Some(status) => format!("{} - {} - {:.0} fps", base, status, self.fps),
            None => format!("{} - {:.0} fps", base, self.fps),
        }
    }
}
