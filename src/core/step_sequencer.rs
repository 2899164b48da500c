//! Multi-step progress mapping
//!
//! Converts progress within the current named step into progress across the
//! whole operation. Each of `n` steps owns an equal `100 / n` slice of the
//! overall bar. With no steps configured the sequencer runs in single-step
//! mode and step progress is reported as overall progress unchanged.

use tracing::debug;

use crate::core::models::{clamp_percent, AppError, AppResult};

#[derive(Debug, Clone, Default)]
pub struct StepSequencer {
    steps: Vec<String>,
    current_index: usize,
    /// Progress within the current step (0.0 - 100.0)
    step_percent: f64,
    overall: f64,
    finished: bool,
}

impl StepSequencer {
    pub fn new(steps: Vec<String>) -> Self {
        let mut sequencer = Self::default();
        sequencer.configure(steps);
        sequencer
    }

    /// Replace the step list and reset all progress
    pub fn configure(&mut self, steps: Vec<String>) {
        debug!("Configuring step sequencer with {} steps", steps.len());
        self.steps = steps;
        self.current_index = 0;
        self.step_percent = 0.0;
        self.overall = 0.0;
        self.finished = false;
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_step_name(&self) -> Option<&str> {
        self.steps.get(self.current_index).map(String::as_str)
    }

    pub fn step_name(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(String::as_str)
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Make `index` the current step with zero local progress
    pub fn begin_step(&mut self, index: usize) -> AppResult<f64> {
        if index >= self.steps.len() {
            return Err(AppError::OutOfRange {
                index,
                step_count: self.steps.len(),
            });
        }

        self.current_index = index;
        self.step_percent = 0.0;
        self.finished = false;
        self.overall = self.compute_overall(0.0);

        debug!(
            "Began step {}/{} ({}) at {:.1}%",
            index + 1,
            self.steps.len(),
            self.steps[index],
            self.overall
        );
        Ok(self.overall)
    }

    /// Report progress within the current step and return the overall value.
    ///
    /// A value lower than one already reported for this step is ignored, so
    /// out-of-order updates never move the bar backwards.
    pub fn update_step_progress(&mut self, percent: f64) -> f64 {
        if self.finished {
            return self.overall;
        }

        let percent = clamp_percent(percent);
        if percent < self.step_percent {
            debug!(
                "Ignoring step progress regression {:.1}% < {:.1}%",
                percent, self.step_percent
            );
            return self.overall;
        }

        self.step_percent = percent;
        self.overall = self.compute_overall(percent);
        self.overall
    }

    pub fn complete_step(&mut self) -> f64 {
        self.update_step_progress(100.0)
    }

    /// Force the overall value to 100 regardless of the current step
    pub fn complete_all(&mut self) -> f64 {
        self.finished = true;
        self.step_percent = 100.0;
        self.current_index = self.steps.len();
        self.overall = 100.0;
        self.overall
    }

    fn compute_overall(&self, step_percent: f64) -> f64 {
        if self.steps.is_empty() {
            return clamp_percent(step_percent);
        }
        let count = self.steps.len() as f64;
        let base = self.current_index as f64 / count * 100.0;
        clamp_percent(base + step_percent / count)
    }
}
