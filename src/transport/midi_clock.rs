//! Transport slaved to an external MIDI clock (24 pulses per quarter note)
use super::{Transport, NOMINAL_SAMPLE_RATE};
use crate::midi::resolve_port;
use anyhow::anyhow;
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub const PULSES_PER_BEAT: u64 = 24;

const SONG_POSITION: u8 = 0xf2;
const TIMING_CLOCK: u8 = 0xf8;
const START: u8 = 0xfa;
const CONTINUE: u8 = 0xfb;
const STOP: u8 = 0xfc;

/// Weight of the newest pulse interval in the smoothed pulse period.
const PERIOD_SMOOTHING: f64 = 0.25;

/// What the clock messages received so far say about the playhead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockState {
    pulses: u64,
    running: bool,
    last_pulse: Option<Instant>,
    pulse_period: Option<f64>,
}

impl ClockState {
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn handle(&mut self, message: &[u8], now: Instant) {
        match message {
            [TIMING_CLOCK, ..] if self.running => {
                if let Some(last) = self.last_pulse {
                    self.observe_period(now.duration_since(last).as_secs_f64());
                }
                self.pulses += 1;
                self.last_pulse = Some(now);
            }
            [START, ..] => {
                log::debug!("MIDI clock start");
                self.pulses = 0;
                self.running = true;
                self.last_pulse = None;
            }
            [CONTINUE, ..] => {
                log::debug!("MIDI clock continue at pulse {}", self.pulses);
                self.running = true;
            }
            [STOP, ..] => {
                log::debug!("MIDI clock stop at pulse {}", self.pulses);
                self.running = false;
                self.last_pulse = None;
            }
            [SONG_POSITION, lsb, msb, ..] => {
                // counted in sixteenth notes
                let sixteenths = (u64::from(*msb & 0x7f) << 7) | u64::from(*lsb & 0x7f);
                self.pulses = sixteenths * (PULSES_PER_BEAT / 4);
                self.last_pulse = None;
            }
            _ => {}
        }
    }

    /// Seconds between pulses as sent by the clock source, once two pulses
    /// have arrived.
    pub fn pulse_period(&self) -> Option<f64> {
        self.pulse_period
    }

    fn observe_period(&mut self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        self.pulse_period = Some(match self.pulse_period {
            Some(period) => period + (seconds - period) * PERIOD_SMOOTHING,
            None => seconds,
        });
    }

    /// Pulses elapsed, interpolated within the current pulse. The pulse
    /// period falls back to `nominal_period` until one has been observed.
    fn position_pulses(&self, nominal_period: f64, now: Instant) -> f64 {
        let seconds_per_pulse = self.pulse_period.unwrap_or(nominal_period);
        let fraction = match self.last_pulse {
            Some(last) if self.running => {
                (now.duration_since(last).as_secs_f64() / seconds_per_pulse).min(1.0)
            }
            _ => 0.0,
        };
        self.pulses as f64 + fraction
    }
}

pub struct MidiClockTransport {
    state: Arc<Mutex<ClockState>>,
    tempo: f64,
    connection: Option<MidiInputConnection<()>>,
}

impl MidiClockTransport {
    /// A transport fed by hand through [`MidiClockTransport::handle`].
    pub fn new(tempo: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState::default())),
            tempo,
            connection: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_in) = MidiInput::new("gridseq clock") {
            midi_in
                .ports()
                .iter()
                .filter_map(|p| midi_in.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    /// Listens for clock messages on the input port described by `source`.
    pub fn connect(source: &str, tempo: f64) -> anyhow::Result<Self> {
        let mut midi_in = MidiInput::new("gridseq clock")
            .map_err(|e| anyhow!("Failed to create MIDI input: {}", e))?;
        midi_in.ignore(Ignore::None);

        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_default())
            .collect();
        let index = resolve_port(source, &names)
            .ok_or_else(|| anyhow!("No MIDI input port matches {:?}", source))?;

        let mut transport = Self::new(tempo);
        let state = Arc::clone(&transport.state);
        let connection = midi_in
            .connect(
                &ports[index],
                "gridseq clock in",
                move |_, message, _| {
                    state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .handle(message, Instant::now());
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to {:?}: {}", names[index], e))?;

        log::info!("following MIDI clock from {}", names[index]);
        transport.connection = Some(connection);
        Ok(transport)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn handle(&self, message: &[u8]) {
        self.lock().handle(message, Instant::now());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seconds_per_pulse(&self) -> f64 {
        60.0 / self.tempo / PULSES_PER_BEAT as f64
    }
}

impl Transport for MidiClockTransport {
    fn frame(&self) -> u64 {
        let seconds_per_pulse = self.seconds_per_pulse();
        let pulses = self.lock().position_pulses(seconds_per_pulse, Instant::now());
        (pulses * seconds_per_pulse * f64::from(NOMINAL_SAMPLE_RATE)).round() as u64
    }

    fn sample_rate(&self) -> u32 {
        NOMINAL_SAMPLE_RATE
    }

    fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    /// How much faster than `--tempo` the clock source is playing.
    fn speed(&self) -> f64 {
        match self.lock().pulse_period() {
            Some(period) => self.seconds_per_pulse() / period,
            None => 1.0,
        }
    }
}
