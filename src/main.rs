use anyhow::anyhow;
use clap::Parser;
use gridseq::{
    FreeRunningTransport, GridController, MidiClockTransport, MidiOutputDevice, MonomeGrid,
    Sequencer, Settings, Transport,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "A live MIDI sequencer played from a monome grid", long_about = None)]
struct Args {
    /// Serial device of the grid (e.g. /dev/ttyUSB0)
    #[clap(short = 'd', long, required_unless_present = "list")]
    device: Option<String>,

    /// Tempo of the session in bpm (default 120)
    #[clap(short = 't', long)]
    tempo: Option<f64>,

    /// Length of each measure in quarter notes (default 4)
    #[clap(short = 'l', long)]
    measure_length: Option<u32>,

    /// MIDI destination, optionally with a port after a colon (e.g.
    /// "Hydrogen:Hydrogen Midi-In", "Hydrogen:0", "130:0", "Hydrogen", or
    /// "130" for port 0 of client 130)
    #[clap(short = 'c', long = "client", required_unless_present = "list")]
    clients: Vec<String>,

    /// MIDI input to take clock and start/stop from; without it the
    /// sequencer runs on its own clock
    #[clap(long)]
    clock: Option<String>,

    /// YAML settings file with tempo, grid size and row mapping
    #[clap(long)]
    config: Option<PathBuf>,

    /// Number of grid rows
    #[clap(long)]
    rows: Option<usize>,

    /// Number of grid columns
    #[clap(long)]
    columns: Option<usize>,

    /// List available MIDI ports and exit
    #[clap(short = 'L', long)]
    list: bool,
}

impl Args {
    /// Settings from the file, if any, overridden by the command line.
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::new_from_yaml_file(path)?,
            None => Settings::default(),
        };
        if let Some(tempo) = self.tempo {
            settings.tempo = tempo;
        }
        if let Some(measure_length) = self.measure_length {
            settings.measure_length = measure_length;
        }
        if let Some(rows) = self.rows {
            settings.rows = rows;
        }
        if let Some(columns) = self.columns {
            settings.columns = columns;
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn list_ports() {
    println!("MIDI outputs:");
    for (index, name) in MidiOutputDevice::available_ports().iter().enumerate() {
        println!("  {}: {}", index, name);
    }
    println!("MIDI inputs:");
    for (index, name) in MidiClockTransport::available_ports().iter().enumerate() {
        println!("  {}: {}", index, name);
    }
}

fn run<T: Transport, G: GridController>(
    transport: T,
    grid: G,
    midi: MidiOutputDevice,
    settings: &Settings,
) -> anyhow::Result<()> {
    let mut sequencer = Sequencer::new(transport, grid, midi, settings)?;
    let result = sequencer.run();
    if let Ok((_, _, mut midi)) = sequencer.shutdown() {
        midi.disconnect();
    }
    result
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list {
        list_ports();
        return Ok(());
    }

    let settings = args.settings()?;

    let mut midi = MidiOutputDevice::new();
    for client in &args.clients {
        midi.connect(client)?;
    }

    let device = args
        .device
        .as_deref()
        .ok_or_else(|| anyhow!("a grid device is required"))?;
    let grid = MonomeGrid::open(device, settings.rows, settings.columns)?;

    match &args.clock {
        Some(source) => run(
            MidiClockTransport::connect(source, settings.tempo)?,
            grid,
            midi,
            &settings,
        ),
        None => run(FreeRunningTransport::new(), grid, midi, &settings),
    }
}
