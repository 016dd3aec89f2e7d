// Redraw rate counter for the demo loop
use std::time::{Duration, Instant};

/// Redraw statistics over one report interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub fps: f64,
    /// Average damaged pixels per frame
    pub pixels_per_frame: f64,
}

/// Rolling FPS counter that also tracks how much of the screen each frame
/// touched
pub struct FpsCounter {
    last_report: Instant,
    /// Frames since last report
    frame_count: u32,
    /// Damaged pixels since last report
    pixel_count: u64,
    current: Option<FrameReport>,
    report_interval: Duration,
}

impl FpsCounter {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            last_report: Instant::now(),
            frame_count: 0,
            pixel_count: 0,
            current: None,
            report_interval,
        }
    }

    /// Call this after each redraw with the number of pixels written.
    /// Returns a report once per interval.
    pub fn tick(&mut self, pixels: u64) -> Option<FrameReport> {
        self.tick_at(Instant::now(), pixels)
    }

    fn tick_at(&mut self, now: Instant, pixels: u64) -> Option<FrameReport> {
        self.frame_count += 1;
        self.pixel_count += pixels;

        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < self.report_interval {
            return None;
        }

        let report = FrameReport {
            fps: self.frame_count as f64 / elapsed.as_secs_f64(),
            pixels_per_frame: self.pixel_count as f64 / self.frame_count as f64,
        };
        self.frame_count = 0;
        self.pixel_count = 0;
        self.last_report = now;
        self.current = Some(report);
        Some(report)
    }

    /// Last report, if an interval has elapsed
    pub fn current(&self) -> Option<FrameReport> {
        self.current
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
