use float_cmp::approx_eq;
use gridseq::config::RowSettings;
use gridseq::sequencer::{Range, STOPPED_POLL_INTERVAL};
use gridseq::{MidiEvent, Sequencer, Settings, Transport, VirtualGrid};
use std::collections::BTreeMap;
use std::time::Duration;

/// Transport whose playhead is moved by hand; one frame per millisecond.
#[derive(Default)]
struct ManualTransport {
    frame: u64,
    running: bool,
    speed: Option<f64>,
}

impl ManualTransport {
    fn at(&mut self, seconds: f64) {
        self.frame = (seconds * 1000.0).round() as u64;
        self.running = true;
    }
}

impl Transport for ManualTransport {
    fn frame(&self) -> u64 {
        self.frame
    }

    fn sample_rate(&self) -> u32 {
        1000
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn speed(&self) -> f64 {
        self.speed.unwrap_or(1.0)
    }
}

type TestSequencer = Sequencer<ManualTransport, VirtualGrid, Vec<MidiEvent>>;

fn one_row_sequencer(measure_length: u32) -> TestSequencer {
    let settings = Settings {
        tempo: 120.0,
        measure_length,
        rows: 1,
        columns: 8,
        mapping: Some(BTreeMap::from([(0, RowSettings::new("note60", "pc3", 1))])),
    };
    Sequencer::new(
        ManualTransport::default(),
        VirtualGrid::new(1, 8),
        Vec::new(),
        &settings,
    )
    .unwrap()
}

/// Moves the transport to `tick` (0.25s each at 120 bpm) and steps once.
fn step_at(sequencer: &mut TestSequencer, tick: u64) -> Duration {
    sequencer.transport_mut().at(tick as f64 * 0.25);
    sequencer.step().unwrap()
}

fn start() -> MidiEvent {
    MidiEvent::NoteOn {
        pitch: 60,
        channel: 1,
        velocity: 64,
    }
}

fn stop() -> MidiEvent {
    MidiEvent::ProgramChange {
        value: 3,
        channel: 1,
    }
}

#[test]
fn press_at_measure_start_fires_and_pins() {
    let mut sequencer = one_row_sequencer(1);

    sequencer.grid_mut().press(0, 0);
    step_at(&mut sequencer, 0);
    assert_eq!(sequencer.midi(), &vec![start()]);

    step_at(&mut sequencer, 1);
    step_at(&mut sequencer, 2);
    assert_eq!(sequencer.tracks()[0].ranges(), &[Range::open(-1)]);
    assert_eq!(sequencer.midi(), &vec![start()]);

    // still lit on even ticks
    assert_eq!(sequencer.grid().leds(), &[0xff]);

    // closing the pinned range makes it run out and fire the stop
    sequencer.grid_mut().press(0, 2);
    step_at(&mut sequencer, 4);
    assert_eq!(sequencer.tracks()[0].ranges(), &[Range::bounded(-1, 1)]);
    step_at(&mut sequencer, 6);
    assert_eq!(sequencer.tracks()[0].ranges(), &[Range::bounded(-1, 0)]);
    assert_eq!(sequencer.midi(), &vec![start()]);
    step_at(&mut sequencer, 8);
    assert_eq!(sequencer.midi(), &vec![start(), stop()]);
    assert!(sequencer.tracks()[0].is_empty());
}

#[test]
fn range_plays_across_measures() {
    let mut sequencer = one_row_sequencer(2);

    sequencer.grid_mut().press(0, 2);
    sequencer.grid_mut().press(0, 3);
    step_at(&mut sequencer, 1);
    assert_eq!(sequencer.tracks()[0].ranges(), &[Range::bounded(2, 3)]);

    for tick in 2..=12 {
        step_at(&mut sequencer, tick);
    }
    // moved at ticks 4 and 8, reaches zero and starts at 12
    assert_eq!(sequencer.midi(), &vec![start()]);

    for tick in 13..=16 {
        step_at(&mut sequencer, tick);
    }
    assert_eq!(sequencer.midi(), &vec![start(), stop()]);
}

#[test]
fn tick_is_processed_once() {
    let mut sequencer = one_row_sequencer(1);
    sequencer.grid_mut().press(0, 0);

    sequencer.transport_mut().at(0.0);
    sequencer.step().unwrap();
    sequencer.transport_mut().at(0.1);
    sequencer.step().unwrap();
    assert_eq!(sequencer.midi().len(), 1);
}

#[test]
fn wait_lines_up_with_next_tick() {
    let mut sequencer = one_row_sequencer(4);
    sequencer.transport_mut().at(1.1);
    let wait = sequencer.step().unwrap();
    assert!(approx_eq!(f64, wait.as_secs_f64(), 0.15, epsilon = 1e-6));
}

#[test]
fn fast_clock_source_still_reaches_every_tick() {
    let mut sequencer = one_row_sequencer(4);
    let blanks_at_start = sequencer.grid().blank_count();
    sequencer.transport_mut().speed = Some(2.0);

    // sleep for each returned wait; the transport covers twice the distance
    let mut real_seconds = 0.0;
    for _ in 0..1000 {
        if real_seconds >= 2.0 {
            break;
        }
        sequencer.transport_mut().at(real_seconds * 2.0);
        real_seconds += sequencer.step().unwrap().as_secs_f64();
    }

    // ticks 0..=15 were all processed, so each odd one blanked the grid
    assert_eq!(sequencer.grid().blank_count(), blanks_at_start + 8);
}

#[test]
fn transport_stop_clears_once() {
    let mut sequencer = one_row_sequencer(4);
    let blanks_at_start = sequencer.grid().blank_count();

    sequencer.grid_mut().press(0, 3);
    step_at(&mut sequencer, 2);
    assert!(sequencer.clock().is_running());
    assert!(!sequencer.tracks()[0].is_empty());

    sequencer.transport_mut().running = false;
    assert_eq!(sequencer.step().unwrap(), STOPPED_POLL_INTERVAL);
    assert!(sequencer.tracks()[0].is_empty());
    assert_eq!(sequencer.grid().leds(), &[0]);
    assert_eq!(sequencer.grid().blank_count(), blanks_at_start + 1);

    for _ in 0..5 {
        assert_eq!(sequencer.step().unwrap(), STOPPED_POLL_INTERVAL);
    }
    assert_eq!(sequencer.grid().blank_count(), blanks_at_start + 1);

    // presses while stopped wait for the transport to roll again
    sequencer.grid_mut().press(0, 5);
    step_at(&mut sequencer, 2);
    assert!(sequencer.clock().is_running());
    assert_eq!(sequencer.tracks()[0].ranges(), &[Range::open(5)]);
}

#[test]
fn invalid_settings_are_rejected() {
    let settings = Settings {
        measure_length: 0,
        ..Default::default()
    };
    let result = Sequencer::new(
        ManualTransport::default(),
        VirtualGrid::new(8, 16),
        Vec::<MidiEvent>::new(),
        &settings,
    );
    assert!(result.is_err());
}
