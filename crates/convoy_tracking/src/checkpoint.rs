use fxhash::FxHashSet;
use jiff::Timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    /// 0 to 100.
    pub percent: u8,
    pub label: String,
}

impl Checkpoint {
    pub fn new(percent: u8, label: &str) -> Self {
        Self {
            percent: percent.min(100),
            label: label.to_string(),
        }
    }

    fn fraction(&self) -> f64 {
        self.percent as f64 / 100.0
    }
}

pub fn default_checkpoints() -> Vec<Checkpoint> {
    vec![
        Checkpoint::new(0, "Shipment picked up"),
        Checkpoint::new(25, "Quarter of the way"),
        Checkpoint::new(50, "Halfway there"),
        Checkpoint::new(75, "Almost there"),
        Checkpoint::new(100, "Delivered"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEvent {
    pub percent: u8,
    pub label: String,
    pub fired_at: Timestamp,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct CheckpointNotifier {
    checkpoints: Vec<Checkpoint>,
    fired: FxHashSet<u8>,
    generation: u64,
}

impl Default for CheckpointNotifier {
    fn default() -> Self {
        Self::new(default_checkpoints())
    }
}

impl CheckpointNotifier {
    pub fn new(mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by_key(|checkpoint| checkpoint.percent);
        checkpoints.dedup_by_key(|checkpoint| checkpoint.percent);

        Self {
            checkpoints,
            fired: FxHashSet::default(),
            generation: 0,
        }
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn has_fired(&self, percent: u8) -> bool {
        self.fired.contains(&percent)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fires every checkpoint at or below `progress` that has not fired yet,
    /// in ascending order.
    pub fn update(&mut self, progress: f64, now: Timestamp) -> Vec<CheckpointEvent> {
        if progress.is_nan() {
            return Vec::new();
        }

        let mut events = Vec::new();

        for checkpoint in &self.checkpoints {
            if checkpoint.fraction() > progress {
                break;
            }

            if self.fired.insert(checkpoint.percent) {
                info!("Checkpoint {}%: {}", checkpoint.percent, checkpoint.label);
                events.push(CheckpointEvent {
                    percent: checkpoint.percent,
                    label: checkpoint.label.clone(),
                    fired_at: now,
                    generation: self.generation,
                });
            }
        }

        events
    }

    /// Forgets fired checkpoints for a new session generation.
    pub fn reset(&mut self, generation: u64) {
        self.fired.clear();
        self.generation = generation;
    }
}
