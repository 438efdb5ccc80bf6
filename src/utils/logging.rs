//! Logging setup and per-epoch training log lines

use std::time::{Duration, Instant};

use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::utils::format_duration;

/// Third-party crates that are chatty at debug level
const QUIET_CRATES: [&str; 3] = ["cubecl", "wgpu", "burn_fusion"];

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Most verbose level emitted by this crate
    pub level: Level,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub ansi: bool,
    /// Let `RUST_LOG` replace the computed filter when it is set
    pub respect_env: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            show_thread_ids: false,
            ansi: true,
            respect_env: true,
        }
    }
}

impl LogConfig {
    /// Debug output with module paths and rayon thread ids
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            ..Self::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Filter directive, e.g. `debug,cubecl=warn,wgpu=warn,burn_fusion=warn`
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        let mut parts = vec![level];
        if self.level > Level::WARN {
            parts.extend(QUIET_CRATES.iter().map(|c| format!("{}=warn", c)));
        }
        parts.join(",")
    }

    fn filter(&self) -> EnvFilter {
        let computed = || EnvFilter::new(self.directive());
        if self.respect_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| computed())
        } else {
            computed()
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(config.filter())
        .with_ansi(config.ansi)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Emits one line when an epoch starts and one when it ends
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: now,
            training_start: now,
        }
    }

    /// `epoch` is 0-indexed; lines are 1-indexed
    pub fn start_epoch(&mut self, epoch: usize, steps: usize, learning_rate: f64) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        info!(
            "Epoch {}/{}: {} steps, lr {:.6}",
            epoch + 1,
            self.total_epochs,
            steps,
            learning_rate
        );
    }

    /// Remaining time extrapolated from the mean epoch so far
    fn eta(&self) -> Duration {
        let done = (self.epoch + 1) as u32;
        let remaining = self.total_epochs.saturating_sub(self.epoch + 1) as u32;
        self.training_start.elapsed() / done * remaining
    }

    pub fn end_epoch(&self, loss: f64, accuracy: f64, val_loss: f64, val_accuracy: f64) {
        info!(
            "Epoch {}/{} - {} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4} (ETA {})",
            self.epoch + 1,
            self.total_epochs,
            format_duration(self.epoch_start.elapsed()),
            loss,
            accuracy,
            val_loss,
            val_accuracy,
            format_duration(self.eta())
        );
    }

    pub fn log_complete(&self, final_val_accuracy: f64) {
        info!(
            "Fit finished: {} epochs in {}, final val_acc {:.4}",
            self.total_epochs,
            format_duration(self.training_start.elapsed()),
            final_val_accuracy
        );
    }
}
