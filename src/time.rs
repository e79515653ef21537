//! Simulation clock
use crate::config::Parameters;

/// Current time, step size and output/refinement cadence
#[derive(Debug, Clone, PartialEq)]
pub struct TimeState {
    current: f64,
    dt: f64,
    step: usize,
    end: f64,
    output_interval: f64,
    refinement_interval: f64,
}

impl TimeState {
    /// Clock at time 0, step 0
    pub fn new(end: f64, dt: f64, output_interval: f64, refinement_interval: f64) -> Self {
        Self {
            current: 0.,
            dt,
            step: 0,
            end,
            output_interval,
            refinement_interval,
        }
    }

    /// Clock from the parameter file
    pub fn from_parameters(p: &Parameters) -> Self {
        Self::new(p.end_time, p.time_step, p.output_interval, p.refinement_interval)
    }

    /// Current time
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Step size
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Index of the current step, 0 before the first increment
    pub fn step(&self) -> usize {
        self.step
    }

    /// End time
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Advance by one step
    pub fn increment(&mut self) {
        self.step += 1;
        self.current += self.dt;
    }

    /// Has the end time not been reached yet
    pub fn is_running(&self) -> bool {
        self.end - self.current > 1e-12
    }

    fn on_cadence(&self, interval: f64) -> bool {
        let delta = (interval / self.dt).round();
        if delta < 1. {
            return false;
        }
        self.step > 0 && self.step % (delta as usize) == 0
    }

    /// Output is written every `round(output_interval / dt)` steps
    pub fn time_to_output(&self) -> bool {
        self.on_cadence(self.output_interval)
    }

    /// Mesh is adapted every `round(refinement_interval / dt)` steps
    pub fn time_to_refine(&self) -> bool {
        self.on_cadence(self.refinement_interval)
    }
}
