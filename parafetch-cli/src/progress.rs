//! Terminal progress bar fed by the download's progress fraction.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Resolution of the bar; fractions are mapped onto `0..=STEPS`.
const STEPS: u64 = 1000;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% ({eta})";

/// Progress bar sink. Cheap to clone; clones draw the same bar.
#[derive(Clone)]
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    /// Bar drawn on stderr.
    pub fn stderr() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Bar that never draws.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        let bar = ProgressBar::with_draw_target(Some(STEPS), target);
        bar.set_style(style);
        Self { bar }
    }

    /// Show `fraction` of the download as done.
    pub fn update(&self, fraction: f64) {
        self.bar.set_position(to_steps(fraction));
    }

    /// Leave the bar at its final state.
    pub fn finish(&self, success: bool) {
        if success {
            self.bar.finish();
        } else {
            self.bar.abandon();
        }
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }
}

fn to_steps(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * STEPS as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_steps() {
        assert_eq!(to_steps(0.0), 0);
        assert_eq!(to_steps(0.25), 250);
        assert_eq!(to_steps(1.0), 1000);
        assert_eq!(to_steps(1.5), 1000);
        assert_eq!(to_steps(-0.1), 0);
    }

    #[test]
    fn test_update_moves_bar() {
        let sink = ProgressSink::hidden();
        sink.update(0.5);
        assert_eq!(sink.position(), 500);

        let clone = sink.clone();
        clone.update(1.0);
        assert_eq!(sink.position(), 1000);
        sink.finish(true);
    }
}
