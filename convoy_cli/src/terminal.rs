use convoy_tracking::{
    checkpoint::CheckpointEvent,
    eta::{EtaSnapshot, Trend},
    render::{FrameUpdate, Presentation},
};
use indicatif::{ProgressBar, ProgressStyle};

const STEPS: u64 = 1000;

/// Interactive path for a terminal: a progress bar standing in for the map.
pub struct TerminalPresentation {
    bar: ProgressBar,
}

impl TerminalPresentation {
    pub fn new() -> Self {
        let bar = ProgressBar::new(STEPS);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl Presentation for TerminalPresentation {
    fn on_frame(&mut self, frame: &FrameUpdate) {
        self.bar
            .set_position((frame.progress * STEPS as f64).round() as u64);
        self.bar.set_message(format!(
            "{} heading {:.0}°{}",
            frame.position,
            frame.heading,
            if frame.camera_pose.is_none() { " (manual camera)" } else { "" }
        ));
    }

    fn on_eta(&mut self, snapshot: &EtaSnapshot) {
        let trend = match snapshot.trend {
            Trend::Improving => "improving",
            Trend::Worsening => "worsening",
            Trend::Steady => "steady",
        };

        self.bar.println(format!(
            "ETA {} ({}, {} left, traffic {:?}{})",
            snapshot.adjusted_arrival.strftime("%H:%M UTC"),
            trend,
            snapshot.remaining_distance,
            snapshot.severity,
            if snapshot.stale { ", stale" } else { "" }
        ));
    }

    fn on_checkpoint(&mut self, event: &CheckpointEvent) {
        self.bar.println(format!("{}% {}", event.percent, event.label));
    }

    fn on_stop(&mut self) {
        self.bar.finish_and_clear();
    }
}
