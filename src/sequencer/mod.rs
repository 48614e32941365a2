//! Core sequencer logic - the scheduler context owning every row's state
use std::thread;
use std::time::Duration;

pub mod clock;
pub mod playback;
pub mod track;

pub use clock::{TickClock, Transition, STOPPED_POLL_INTERVAL};
pub use playback::{drain_input, due_event, render_output, BeatDispatcher};
pub use track::{End, Range, Track};

use crate::config::{RowConfig, Settings, MAX_COLUMNS};
use crate::grid::GridController;
use crate::midi::MidiSink;
use crate::transport::Transport;

/// Owns the tracks, the row mapping and the tick counter, together with the
/// transport, grid and MIDI output they are driven by.
pub struct Sequencer<T: Transport, G: GridController, M: MidiSink> {
    transport: T,
    grid: G,
    midi: M,
    tracks: Vec<Track>,
    rows: Vec<Option<RowConfig>>,
    clock: TickClock,
    dispatcher: BeatDispatcher,
    last_tick: Option<u64>,
}

impl<T: Transport, G: GridController, M: MidiSink> Sequencer<T, G, M> {
    /// Validates `settings`, sizes one track per grid row and blanks the grid.
    pub fn new(transport: T, mut grid: G, midi: M, settings: &Settings) -> anyhow::Result<Self> {
        settings.validate()?;

        let mut rows = settings.row_configs();
        rows.resize(grid.rows(), None);
        let columns = grid.columns().min(MAX_COLUMNS);
        let tracks = (0..grid.rows()).map(|_| Track::new(columns)).collect();

        grid.set_all_leds(false)?;

        Ok(Self {
            transport,
            grid,
            midi,
            tracks,
            rows,
            clock: TickClock::new(settings.tempo, settings.measure_length),
            dispatcher: BeatDispatcher::new(settings.measure_length),
            last_tick: None,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn rows(&self) -> &[Option<RowConfig>] {
        &self.rows
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut G {
        &mut self.grid
    }

    pub fn midi(&self) -> &M {
        &self.midi
    }

    /// One pass of the scheduler loop. Returns how long to wait before the
    /// next pass.
    pub fn step(&mut self) -> anyhow::Result<Duration> {
        let running = self.transport.is_running();
        let tick = self.clock.compute_tick(self.transport.position_seconds());

        match self.clock.observe(tick, running) {
            Transition::Started => {
                log::info!("transport is rolling, sequencer started at tick {}", tick);
            }
            Transition::Stopped => {
                log::info!("transport stopped, waiting for it to restart");
                self.reset()?;
            }
            Transition::None => {}
        }

        if running && self.last_tick != Some(tick) {
            self.process_tick(tick)?;
            self.last_tick = Some(tick);
        }

        let wait = self
            .clock
            .next_wait_duration(tick, self.transport.position_seconds(), running);
        Ok(wall_clock_wait(wait, running, self.transport.speed()))
    }

    /// Drains input, fires and advances, then renders, in that order.
    pub fn process_tick(&mut self, tick: u64) -> anyhow::Result<()> {
        drain_input(&mut self.grid, &mut self.tracks)?;
        self.dispatcher
            .beat(tick, &mut self.tracks, &self.rows, &mut self.midi)?;
        render_output(&mut self.grid, &self.tracks, tick)
    }

    /// Steps and sleeps until a collaborator fails.
    pub fn run(&mut self) -> anyhow::Result<()> {
        log::info!(
            "sequencing {} rows at {} bpm, {} beats per measure",
            self.tracks.len(),
            self.clock.tempo(),
            self.clock.measure_length()
        );
        loop {
            let wait = self.step()?;
            thread::sleep(wait);
        }
    }

    /// Switches the grid off and hands the collaborators back.
    pub fn shutdown(mut self) -> anyhow::Result<(T, G, M)> {
        self.grid.set_all_leds(false)?;
        Ok((self.transport, self.grid, self.midi))
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.tracks.iter_mut().for_each(Track::clear);
        self.last_tick = None;
        self.grid.set_all_leds(false)
    }
}

/// Converts a wait in transport time into real time for a transport moving
/// at `speed`.
fn wall_clock_wait(wait: Duration, running: bool, speed: f64) -> Duration {
    if running && speed.is_finite() && speed > 0.0 {
        wait.div_f64(speed)
    } else {
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_scales_with_transport_speed() {
        let wait = Duration::from_millis(250);
        assert_eq!(wall_clock_wait(wait, true, 2.0), Duration::from_millis(125));
        assert_eq!(wall_clock_wait(wait, true, 0.5), Duration::from_millis(500));
        assert_eq!(wall_clock_wait(wait, true, 0.0), wait);
        assert_eq!(wall_clock_wait(wait, true, f64::NAN), wait);
        assert_eq!(
            wall_clock_wait(STOPPED_POLL_INTERVAL, false, 3.0),
            STOPPED_POLL_INTERVAL
        );
    }
}
