//! Serial monome grid speaking the "mext" protocol
use super::{GridController, GridEvent};
use crate::config::MAX_COLUMNS;
use anyhow::{anyhow, Context};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(20);

const LED_ALL_OFF: u8 = 0x12;
const LED_ALL_ON: u8 = 0x13;
const LED_ROW: u8 = 0x15;
const KEY_UP: u8 = 0x20;
const KEY_DOWN: u8 = 0x21;

/// Packet length (opcode included) for device messages we know how to skip.
fn packet_len(opcode: u8) -> Option<usize> {
    match opcode {
        0x00 | 0x02 | 0x03 | KEY_UP | KEY_DOWN => Some(3),
        0x01 => Some(33),
        _ => None,
    }
}

/// Reassembles device packets from a byte stream.
#[derive(Debug, Default)]
pub struct MextDecoder {
    packet: Vec<u8>,
}

impl MextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, byte: u8) -> Option<GridEvent> {
        if self.packet.is_empty() && packet_len(byte).is_none() {
            log::trace!("skipping unknown grid byte {:#04x}", byte);
            return None;
        }
        self.packet.push(byte);

        let opcode = self.packet[0];
        if Some(self.packet.len()) != packet_len(opcode) {
            return None;
        }

        let event = match opcode {
            KEY_UP | KEY_DOWN => Some(GridEvent {
                column: usize::from(self.packet[1]),
                row: usize::from(self.packet[2]),
                pressed: opcode == KEY_DOWN,
            }),
            _ => None,
        };
        self.packet.clear();
        event
    }
}

/// Bytes setting one grid row, one message per eight columns.
pub fn encode_led_row(row: usize, columns: usize, mask: u64) -> anyhow::Result<Vec<u8>> {
    let y = u8::try_from(row).map_err(|_| anyhow!("grid row {} is out of range", row))?;
    Ok((0..columns.min(MAX_COLUMNS))
        .step_by(8)
        .flat_map(|x| [LED_ROW, x as u8, y, (mask >> x) as u8])
        .collect())
}

pub struct MonomeGrid<W: Write> {
    writer: W,
    events: Receiver<GridEvent>,
    rows: usize,
    columns: usize,
    reader: Option<JoinHandle<()>>,
}

impl MonomeGrid<Box<dyn serialport::SerialPort>> {
    /// Opens the serial device and starts a thread decoding key presses.
    pub fn open(path: &str, rows: usize, columns: usize) -> anyhow::Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open grid device {}", path))?;
        let reader = port
            .try_clone()
            .with_context(|| format!("Failed to clone grid device {}", path))?;

        let (sender, events) = unbounded();
        let handle = spawn_reader(reader, sender);
        log::info!("opened grid {} ({}x{})", path, columns, rows);

        let mut grid = Self::from_parts(port, events, rows, columns);
        grid.reader = Some(handle);
        Ok(grid)
    }
}

impl<W: Write> MonomeGrid<W> {
    pub fn from_parts(writer: W, events: Receiver<GridEvent>, rows: usize, columns: usize) -> Self {
        Self {
            writer,
            events,
            rows,
            columns,
            reader: None,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.writer
            .write_all(bytes)
            .and_then(|_| self.writer.flush())
            .context("Failed to write to grid")
    }
}

impl<W: Write> GridController for MonomeGrid<W> {
    fn rows(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn next_event(&mut self) -> anyhow::Result<Option<GridEvent>> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => match self.reader.take().map(JoinHandle::join) {
                Some(Err(_)) => Err(anyhow!("Grid reader thread panicked")),
                _ => Err(anyhow!("Grid input has hung up")),
            },
        }
    }

    fn set_led_row(&mut self, row: usize, mask: u64) -> anyhow::Result<()> {
        let bytes = encode_led_row(row, self.columns, mask)?;
        self.write(&bytes)
    }

    fn set_all_leds(&mut self, on: bool) -> anyhow::Result<()> {
        self.write(&[if on { LED_ALL_ON } else { LED_ALL_OFF }])
    }
}

/// Decodes key packets from `reader` until it fails, then hangs up.
pub fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    sender: Sender<GridEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut decoder = MextDecoder::new();
        let mut buffer = [0u8; 64];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => {
                    log::error!("grid device closed");
                    break;
                }
                Ok(n) => {
                    for event in buffer[..n].iter().filter_map(|b| decoder.feed(*b)) {
                        if sender.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("grid read failed: {}", e);
                    break;
                }
            }
        }
    })
}
