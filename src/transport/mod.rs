//! Transport clocks the sequencer follows
pub mod midi_clock;

pub use midi_clock::MidiClockTransport;

use std::time::Instant;

/// Nominal frame rate for transports that don't run on audio frames.
pub const NOMINAL_SAMPLE_RATE: u32 = 48_000;

/// The external playhead: where it is and whether it is moving.
pub trait Transport {
    fn frame(&self) -> u64;

    fn sample_rate(&self) -> u32;

    fn is_running(&self) -> bool;

    fn position_seconds(&self) -> f64 {
        self.frame() as f64 / f64::from(self.sample_rate())
    }

    /// Transport seconds that pass per second of wall-clock time.
    fn speed(&self) -> f64 {
        1.0
    }
}

/// Always running, counting from the moment it was created. Used when no
/// external clock is configured.
pub struct FreeRunningTransport {
    started: Instant,
}

impl FreeRunningTransport {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for FreeRunningTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FreeRunningTransport {
    fn frame(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() * f64::from(NOMINAL_SAMPLE_RATE)) as u64
    }

    fn sample_rate(&self) -> u32 {
        NOMINAL_SAMPLE_RATE
    }

    fn is_running(&self) -> bool {
        true
    }
}
