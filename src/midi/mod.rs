//! MIDI events, event descriptors, and output using midir
use anyhow::{anyhow, Context};
use midir::{MidiOutput, MidiOutputConnection};
use std::fmt;
use std::str::FromStr;

/// Velocity used for every note-on the sequencer sends.
pub const NOTE_VELOCITY: u8 = 64;

const CLIENT_NAME: &str = "gridseq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { pitch: u8, channel: u8, velocity: u8 },
    ProgramChange { value: u8, channel: u8 },
}

impl MidiEvent {
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOn {
                pitch,
                channel,
                velocity,
            } => vec![0x90 | (channel & 0x0f), pitch & 0x7f, velocity & 0x7f],
            MidiEvent::ProgramChange { value, channel } => {
                vec![0xc0 | (channel & 0x0f), value & 0x7f]
            }
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOn {
                pitch,
                channel,
                velocity,
            } => write!(
                f,
                "note-on {} ({}) vel {} ch {}",
                pitch,
                midi_note_name(pitch),
                velocity,
                channel
            ),
            MidiEvent::ProgramChange { value, channel } => {
                write!(f, "program-change {} ch {}", value, channel)
            }
        }
    }
}

/// What a row sends when it starts or stops, written `note<N>` or `pc<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Note(u8),
    ProgramChange(u8),
}

impl EventKind {
    pub fn on_channel(self, channel: u8) -> MidiEvent {
        match self {
            EventKind::Note(pitch) => MidiEvent::NoteOn {
                pitch,
                channel,
                velocity: NOTE_VELOCITY,
            },
            EventKind::ProgramChange(value) => MidiEvent::ProgramChange { value, channel },
        }
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (constructor, param): (fn(u8) -> EventKind, &str) =
            if let Some(param) = s.strip_prefix("note") {
                (EventKind::Note, param)
            } else if let Some(param) = s.strip_prefix("pc") {
                (EventKind::ProgramChange, param)
            } else {
                return Err(anyhow!("expected note<N> or pc<N>, got {:?}", s));
            };

        let value: u8 = param
            .parse()
            .with_context(|| format!("invalid parameter in {:?}", s))?;
        if value > 127 {
            return Err(anyhow!("parameter out of range 0..=127 in {:?}", s));
        }
        Ok(constructor(value))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Note(pitch) => write!(f, "note{}", pitch),
            EventKind::ProgramChange(value) => write!(f, "pc{}", value),
        }
    }
}

/// Anything that can deliver MIDI events to the outside world.
pub trait MidiSink {
    fn send_event(&mut self, event: &MidiEvent) -> anyhow::Result<()>;
}

/// Collects events instead of sending them.
impl MidiSink for Vec<MidiEvent> {
    fn send_event(&mut self, event: &MidiEvent) -> anyhow::Result<()> {
        self.push(*event);
        Ok(())
    }
}

/// Sends every event to all connected destinations.
pub struct MidiOutputDevice {
    connections: Vec<MidiOutputConnection>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    /// Connects to the port described by `destination`, see [`resolve_port`].
    pub fn connect(&mut self, destination: &str) -> anyhow::Result<String> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI output: {}", e))?;

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();
        let index = resolve_port(destination, &names)
            .ok_or_else(|| anyhow!("No MIDI output port matches {:?}", destination))?;
        let port = ports
            .get(index)
            .ok_or_else(|| anyhow!("Invalid port index {}", index))?;

        let connection = midi_out
            .connect(port, "gridseq out")
            .map_err(|e| anyhow!("Failed to connect to {:?}: {}", names[index], e))?;

        log::info!("connected MIDI output to {}", names[index]);
        self.connections.push(connection);
        Ok(names[index].clone())
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn disconnect(&mut self) {
        for connection in self.connections.drain(..) {
            connection.close();
        }
    }
}

impl MidiSink for MidiOutputDevice {
    fn send_event(&mut self, event: &MidiEvent) -> anyhow::Result<()> {
        let bytes = event.to_bytes();
        for conn in &mut self.connections {
            conn.send(&bytes)
                .map_err(|e| anyhow!("Failed to send {}: {}", event, e))?;
        }
        Ok(())
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the port a destination string refers to.
///
/// Accepted forms: a numeric client/port pair (`"130:0"`, matched against the
/// `client:port` address ALSA puts at the end of port names), a bare client
/// number (`"130"`, meaning port 0 of that client, or a port index when no
/// client has that number), or a client name optionally followed by a port
/// name or number (`"Hydrogen"`, `"Hydrogen:Hydrogen Midi-In"`, `"Hydrogen:0"`).
pub fn resolve_port(destination: &str, names: &[String]) -> Option<usize> {
    let destination = destination.trim();
    if let Ok(number) = destination.parse::<usize>() {
        let address = format!("{}:0", number);
        return position_by_address(&address, names).or((number < names.len()).then_some(number));
    }

    let (client, port) = match destination.split_once(':') {
        Some((client, port)) => (client.trim(), Some(port.trim())),
        None => (destination, None),
    };

    if let (Ok(client_id), Some(Ok(port_id))) =
        (client.parse::<u32>(), port.map(str::parse::<u32>))
    {
        return position_by_address(&format!("{}:{}", client_id, port_id), names);
    }

    names.iter().position(|name| {
        name.contains(client)
            && match port {
                None => true,
                Some(port) => match port.parse::<u32>() {
                    Ok(port_id) => name.ends_with(&format!(":{}", port_id)),
                    Err(_) => name.contains(port),
                },
            }
    })
}

fn position_by_address(address: &str, names: &[String]) -> Option<usize> {
    names
        .iter()
        .position(|name| name.rsplit(' ').next() == Some(address))
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
