//! Progress reporting for long-running operations.
//!
//! The CLI uses `IndicatifReporter` for a user-visible bar. Library callers
//! can use `NoopReporter`; generation tasks record progress with
//! `RecordingReporter`. Progress is advisory and never gates correctness.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives `(percent, message)` updates. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Reporter backed by an `indicatif` progress bar for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    /// A reporter that draws nothing, for `--quiet` and non-TTY output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, percent: u8, message: &str) {
        self.bar.set_position(u64::from(percent.min(100)));
        self.bar.set_message(message.to_string());
    }
}

/// Keeps the latest update plus full history, for task status polling.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    updates: Mutex<Vec<(u8, String)>>,
}

impl RecordingReporter {
    pub fn updates(&self) -> Vec<(u8, String)> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn latest(&self) -> Option<(u8, String)> {
        self.updates.lock().ok().and_then(|u| u.last().cloned())
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, percent: u8, message: &str) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((percent, message.to_string()));
        }
    }
}

/// Maps a sub-step's 0..=100 onto `start..=end` of an outer reporter.
#[derive(Debug)]
pub struct ScaledReporter<'a, R: ProgressReporter + ?Sized> {
    inner: &'a R,
    start: u8,
    end: u8,
}

impl<'a, R: ProgressReporter + ?Sized> ScaledReporter<'a, R> {
    pub fn new(inner: &'a R, start: u8, end: u8) -> Self {
        Self { inner, start, end }
    }

    pub fn scale(&self, percent: u8) -> u8 {
        let span = u16::from(self.end.saturating_sub(self.start));
        let offset = span * u16::from(percent.min(100)) / 100;
        // offset <= span <= 255
        self.start + u8::try_from(offset).unwrap_or(u8::MAX - self.start)
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for ScaledReporter<'_, R> {
    fn report(&self, percent: u8, message: &str) {
        self.inner.report(self.scale(percent), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.report(50, "hello");
    }

    #[test]
    fn indicatif_reporter_lifecycle() {
        let reporter = IndicatifReporter::hidden();
        reporter.report(10, "loading");
        reporter.report(100, "done");
        reporter.finish();
    }

    #[test]
    fn build_progress_maps_into_task_window() {
        let recorder = RecordingReporter::default();
        let scaled = ScaledReporter::new(&recorder, 20, 80);
        for p in [0, 40, 45, 80, 100] {
            scaled.report(p, "step");
        }
        let percents: Vec<u8> = recorder.updates().into_iter().map(|(p, _)| p).collect();
        assert_eq!(percents, [20, 44, 47, 68, 80]);
        assert_eq!(recorder.latest().unwrap().0, 80);
    }
}
