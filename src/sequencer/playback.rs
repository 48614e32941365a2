//! Playback - turns tick boundaries into MIDI events and grid LED state
use super::track::{End, Track};
use crate::config::RowConfig;
use crate::grid::GridController;
use crate::midi::{MidiEvent, MidiSink};

/// Fires each row's start/stop events on its phase and advances every row
/// once per measure.
#[derive(Debug, Clone)]
pub struct BeatDispatcher {
    ticks_per_measure: u64,
}

impl BeatDispatcher {
    pub fn new(measure_length: u32) -> Self {
        Self {
            ticks_per_measure: 2 * u64::from(measure_length.max(1)),
        }
    }

    /// True when a row shifted by `tick_offset` evaluates firing at `tick`.
    pub fn is_firing_tick(&self, tick: u64, tick_offset: i64) -> bool {
        (tick as i64 - tick_offset).rem_euclid(self.ticks_per_measure as i64) == 0
    }

    pub fn is_measure_boundary(&self, tick: u64) -> bool {
        tick % self.ticks_per_measure == 0
    }

    /// Sends the due events for every mapped row, then advances all tracks
    /// on a measure boundary. Firing sees the tracks as they were before
    /// advancing.
    pub fn beat<M: MidiSink + ?Sized>(
        &self,
        tick: u64,
        tracks: &mut [Track],
        rows: &[Option<RowConfig>],
        midi: &mut M,
    ) -> anyhow::Result<()> {
        for (row, (track, config)) in tracks.iter().zip(rows).enumerate() {
            let Some(config) = config else {
                continue;
            };
            if !self.is_firing_tick(tick, config.tick_offset()) {
                continue;
            }
            if let Some(event) = due_event(track, config) {
                log::debug!("tick {} row {}: {}", tick, row, event);
                midi.send_event(&event)?;
            }
        }

        if self.is_measure_boundary(tick) {
            tracks.iter_mut().for_each(Track::advance);
        }
        Ok(())
    }
}

/// The event a row sends when its first range starts or ends at position
/// zero. A stop takes priority over a start in the same tick.
pub fn due_event(track: &Track, config: &RowConfig) -> Option<MidiEvent> {
    let first = track.first()?;
    let mut event = None;
    if first.start == 0 {
        event = config.start_event();
    }
    if first.end == End::At(0) {
        event = config.stop_event().or(event);
    }
    event
}

/// Feeds every pending grid press into its row's track. Releases and presses
/// outside the tracks are dropped.
pub fn drain_input<G: GridController + ?Sized>(
    grid: &mut G,
    tracks: &mut [Track],
) -> anyhow::Result<()> {
    while let Some(event) = grid.next_event()? {
        if !event.pressed {
            continue;
        }
        match tracks.get_mut(event.row) {
            Some(track) if event.column < track.max_position() => {
                log::trace!("press row {} column {}", event.row, event.column);
                track.add(event.column);
            }
            _ => log::debug!(
                "ignoring press outside the grid at row {} column {}",
                event.row,
                event.column
            ),
        }
    }
    Ok(())
}

/// Shows the tracks on even ticks and blanks the grid on odd ones, so lit
/// ranges blink once per beat.
pub fn render_output<G: GridController + ?Sized>(
    grid: &mut G,
    tracks: &[Track],
    tick: u64,
) -> anyhow::Result<()> {
    if tick % 2 == 0 {
        for (row, track) in tracks.iter().enumerate() {
            grid.set_led_row(row, track.mask())?;
        }
        Ok(())
    } else {
        grid.set_all_leds(false)
    }
}
