//! Button grid controllers: key presses in, LED rows out
pub mod monome;

pub use monome::MonomeGrid;

use std::collections::VecDeque;

/// A key changing state on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridEvent {
    pub row: usize,
    pub column: usize,
    pub pressed: bool,
}

pub trait GridController {
    fn rows(&self) -> usize;

    fn columns(&self) -> usize;

    /// Returns the next pending key event without blocking.
    fn next_event(&mut self) -> anyhow::Result<Option<GridEvent>>;

    /// Lights the LEDs of `row` according to `mask`, bit 0 being column 0.
    fn set_led_row(&mut self, row: usize, mask: u64) -> anyhow::Result<()>;

    fn set_all_leds(&mut self, on: bool) -> anyhow::Result<()>;
}

/// An in-memory grid: presses are queued by hand and LED writes are kept.
#[derive(Debug, Clone, Default)]
pub struct VirtualGrid {
    rows: usize,
    columns: usize,
    pending: VecDeque<GridEvent>,
    leds: Vec<u64>,
    blank_count: usize,
}

impl VirtualGrid {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            pending: VecDeque::new(),
            leds: vec![0; rows],
            blank_count: 0,
        }
    }

    pub fn press(&mut self, row: usize, column: usize) {
        self.push(row, column, true);
    }

    pub fn release(&mut self, row: usize, column: usize) {
        self.push(row, column, false);
    }

    fn push(&mut self, row: usize, column: usize, pressed: bool) {
        self.pending.push_back(GridEvent {
            row,
            column,
            pressed,
        });
    }

    pub fn leds(&self) -> &[u64] {
        &self.leds
    }

    /// How many times every LED was switched off at once.
    pub fn blank_count(&self) -> usize {
        self.blank_count
    }
}

impl GridController for VirtualGrid {
    fn rows(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn next_event(&mut self) -> anyhow::Result<Option<GridEvent>> {
        Ok(self.pending.pop_front())
    }

    fn set_led_row(&mut self, row: usize, mask: u64) -> anyhow::Result<()> {
        match self.leds.get_mut(row) {
            Some(leds) => {
                *leds = mask;
                Ok(())
            }
            None => Err(anyhow::anyhow!("no LED row {}", row)),
        }
    }

    fn set_all_leds(&mut self, on: bool) -> anyhow::Result<()> {
        let mask = if on { u64::MAX } else { 0 };
        self.leds.iter_mut().for_each(|leds| *leds = mask);
        if !on {
            self.blank_count += 1;
        }
        Ok(())
    }
}
