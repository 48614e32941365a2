//! GRIDSEQ - a live MIDI step sequencer played from a button grid
//!
//! This library provides the pieces of the sequencer:
//! - Per-row range tracking of what is lit on the grid
//! - Tick scheduling slaved to an external transport
//! - Dispatch of start/stop MIDI events on measure boundaries
//! - Grid, MIDI output and transport collaborators

pub mod config;
pub mod grid;
pub mod midi;
pub mod sequencer;
pub mod transport;

// Re-export commonly used types
pub use config::{RowConfig, RowSettings, Settings};
pub use grid::{GridController, GridEvent, MonomeGrid, VirtualGrid};
pub use midi::{midi_note_name, EventKind, MidiEvent, MidiOutputDevice, MidiSink};
pub use sequencer::{BeatDispatcher, Sequencer, TickClock, Track};
pub use transport::{FreeRunningTransport, MidiClockTransport, Transport};
