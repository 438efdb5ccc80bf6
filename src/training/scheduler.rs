//! Learning Rate Scheduler Module
//!
//! The learning rate is recomputed before every optimizer step from the
//! number of steps taken so far.

use serde::{Deserialize, Serialize};

/// Learning rate scheduler that adjusts the learning rate during training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LRScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Inverse-time decay: lr = initial_lr / (1 + decay * iteration)
    InverseTimeDecay { initial_lr: f64, decay: f64 },
}

impl LRScheduler {
    /// Create a constant learning rate scheduler
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// Create an inverse-time decay scheduler
    pub fn inverse_time(initial_lr: f64, decay: f64) -> Self {
        Self::InverseTimeDecay { initial_lr, decay }
    }

    /// Scheduler for a run: decay of `lr / epochs` per step, or constant when
    /// the decay is zero
    pub fn for_run(initial_lr: f64, decay: f64) -> Self {
        if decay > 0.0 {
            Self::inverse_time(initial_lr, decay)
        } else {
            Self::constant(initial_lr)
        }
    }

    /// Get the learning rate for a given optimizer iteration (0-indexed)
    pub fn get_lr(&self, iteration: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::InverseTimeDecay { initial_lr, decay } => {
                initial_lr / (1.0 + decay * iteration as f64)
            }
        }
    }

    pub fn initial_lr(&self) -> f64 {
        self.get_lr(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let scheduler = LRScheduler::constant(0.001);
        assert_eq!(scheduler.get_lr(0), 0.001);
        assert_eq!(scheduler.get_lr(10_000), 0.001);
    }

    #[test]
    fn test_inverse_time_decay() {
        let lr = 1e-3;
        let scheduler = LRScheduler::inverse_time(lr, lr / 75.0);

        assert_eq!(scheduler.get_lr(0), lr);
        let expected = lr / (1.0 + lr / 75.0 * 100.0);
        assert!((scheduler.get_lr(100) - expected).abs() < 1e-15);

        // Monotonically non-increasing
        let mut previous = f64::INFINITY;
        for step in (0..5000).step_by(250) {
            let current = scheduler.get_lr(step);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_for_run() {
        assert_eq!(LRScheduler::for_run(0.01, 0.0), LRScheduler::constant(0.01));
        assert!(matches!(
            LRScheduler::for_run(0.01, 0.001),
            LRScheduler::InverseTimeDecay { .. }
        ));
    }
}
