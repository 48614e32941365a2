//! Maps the continuous transport position onto discrete ticks, two per beat.
use std::time::Duration;

/// How long to wait between transport polls while it is stopped.
pub const STOPPED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transport state change noticed by [`TickClock::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Started,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TickClock {
    tempo: f64,
    measure_length: u32,
    running: bool,
}

impl TickClock {
    pub fn new(tempo: f64, measure_length: u32) -> Self {
        Self {
            tempo,
            measure_length,
            running: false,
        }
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn measure_length(&self) -> u32 {
        self.measure_length
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seconds between two ticks.
    pub fn interval(&self) -> f64 {
        60.0 / self.tempo / 2.0
    }

    pub fn compute_tick(&self, transport_seconds: f64) -> u64 {
        (transport_seconds / self.interval()).floor().max(0.0) as u64
    }

    /// Time left until `tick + 1` is due, or the fixed poll interval when
    /// the transport is stopped.
    pub fn next_wait_duration(
        &self,
        tick: u64,
        transport_seconds: f64,
        transport_running: bool,
    ) -> Duration {
        if !transport_running {
            return STOPPED_POLL_INTERVAL;
        }
        let due = (tick + 1) as f64 * self.interval();
        Duration::from_secs_f64((due - transport_seconds).max(0.0))
    }

    /// Updates the running flag from the latest transport reading.
    pub fn observe(&mut self, tick: u64, transport_running: bool) -> Transition {
        if !transport_running {
            if self.running {
                self.running = false;
                return Transition::Stopped;
            }
            return Transition::None;
        }

        if tick > 0 && !self.running {
            self.running = true;
            return Transition::Started;
        }
        Transition::None
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(120.0, 4)
    }
}
