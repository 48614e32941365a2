//! Settings file, row mapping, and the per-row configuration derived from them
use crate::midi::{EventKind, MidiEvent};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_MEASURE_LENGTH: u32 = 4;
pub const DEFAULT_ROWS: usize = 8;
pub const DEFAULT_COLUMNS: usize = 16;

/// Widest row whose LEDs fit in a `u64` mask.
pub const MAX_COLUMNS: usize = 64;

/// Grid rows are addressed with a single byte.
pub const MAX_ROWS: usize = 256;

/// Channel value meaning "not configured".
const UNSET_CHANNEL: i32 = -1;

fn unset_channel() -> i32 {
    UNSET_CHANNEL
}

/// How one grid row is mapped onto MIDI, as written in the settings file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RowSettings {
    /// Sent when the row's first range reaches position 0, e.g. `note100`
    pub start: Option<String>,

    /// Sent when the row's first range ends at position 0, e.g. `pc3`
    pub stop: Option<String>,

    /// Output channel 0-15; -1 or absent sends on channel 0
    #[serde(default = "unset_channel")]
    pub channel: i32,

    /// Shifts the row's firing tick away from the measure boundary
    #[serde(default)]
    pub tick_offset: i64,
}

impl RowSettings {
    pub fn new(start: &str, stop: &str, channel: i32) -> Self {
        Self {
            start: Some(start.to_string()),
            stop: Some(stop.to_string()),
            channel,
            tick_offset: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Beats per minute
    pub tempo: f64,

    /// Beats per measure
    pub measure_length: u32,

    /// Grid height
    pub rows: usize,

    /// Grid width
    pub columns: usize,

    /// Row index to MIDI mapping; absent means the built-in mapping
    pub mapping: Option<BTreeMap<usize, RowSettings>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            measure_length: DEFAULT_MEASURE_LENGTH,
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
            mapping: None,
        }
    }
}

impl Settings {
    pub fn new_from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::new_from_yaml(&yaml)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    pub fn new_from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Notes 100-103 on the first four rows and 101 again on the fifth.
    pub fn default_mapping() -> BTreeMap<usize, RowSettings> {
        [100, 101, 102, 103, 101]
            .iter()
            .enumerate()
            .map(|(row, pitch)| {
                let note = format!("note{}", pitch);
                (row, RowSettings::new(&note, &note, 0))
            })
            .collect()
    }

    pub fn mapping(&self) -> BTreeMap<usize, RowSettings> {
        self.mapping.clone().unwrap_or_else(Self::default_mapping)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.tempo.is_finite() && self.tempo > 0.0) {
            return Err(anyhow!("tempo must be positive, got {}", self.tempo));
        }
        if self.measure_length == 0 {
            return Err(anyhow!("measure length must be at least one beat"));
        }
        if self.rows == 0 || self.rows > MAX_ROWS {
            return Err(anyhow!(
                "rows must be between 1 and {}, got {}",
                MAX_ROWS,
                self.rows
            ));
        }
        if self.columns == 0 || self.columns > MAX_COLUMNS {
            return Err(anyhow!(
                "columns must be between 1 and {}, got {}",
                MAX_COLUMNS,
                self.columns
            ));
        }
        for (row, row_settings) in self.mapping() {
            let channel = row_settings.channel;
            if channel != UNSET_CHANNEL && !(0..=15).contains(&channel) {
                return Err(anyhow!(
                    "row {}: channel must be between 0 and 15, got {}",
                    row,
                    channel
                ));
            }
        }
        Ok(())
    }

    /// One entry per grid row; `None` for rows that send nothing.
    ///
    /// Descriptors that fail to parse are reported here, once, and treated
    /// as sending nothing.
    pub fn row_configs(&self) -> Vec<Option<RowConfig>> {
        let mut configs = vec![None; self.rows];
        for (row, row_settings) in self.mapping() {
            if row >= self.rows {
                log::warn!("mapping for row {} ignored, the grid has {} rows", row, self.rows);
                continue;
            }
            let config = RowConfig::from_settings(row, &row_settings);
            if config.is_mapped() {
                configs[row] = Some(config);
            } else {
                log::warn!("row {} has no usable start or stop event", row);
            }
        }
        configs
    }
}

/// Immutable per-row dispatch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowConfig {
    start: Option<EventKind>,
    stop: Option<EventKind>,
    channel: u8,
    tick_offset: i64,
}

impl RowConfig {
    pub fn new(
        start: Option<EventKind>,
        stop: Option<EventKind>,
        channel: u8,
        tick_offset: i64,
    ) -> Self {
        Self {
            start,
            stop,
            channel,
            tick_offset,
        }
    }

    pub fn from_settings(row: usize, settings: &RowSettings) -> Self {
        let parse = |which: &str, descriptor: &Option<String>| {
            descriptor.as_deref().and_then(|d| match d.parse::<EventKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    log::warn!("row {}: {} event ignored: {:#}", row, which, e);
                    None
                }
            })
        };

        Self {
            start: parse("start", &settings.start),
            stop: parse("stop", &settings.stop),
            channel: u8::try_from(settings.channel).unwrap_or(0),
            tick_offset: settings.tick_offset,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.start.is_some() || self.stop.is_some()
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn tick_offset(&self) -> i64 {
        self.tick_offset
    }

    pub fn start_event(&self) -> Option<MidiEvent> {
        self.start.map(|kind| kind.on_channel(self.channel))
    }

    pub fn stop_event(&self) -> Option<MidiEvent> {
        self.stop.map(|kind| kind.on_channel(self.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new_from_yaml("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.mapping().len(), 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_settings() {
        let settings = Settings::new_from_yaml(
            r#"
tempo: 96
measure-length: 3
rows: 4
columns: 8
mapping:
  0:
    start: note36
    stop: note37
    channel: 9
  2:
    start: pc4
    tick-offset: 3
"#,
        )
        .unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tempo, 96.0);
        assert_eq!(settings.measure_length, 3);

        let configs = settings.row_configs();
        assert_eq!(configs.len(), 4);
        assert_eq!(
            configs[0],
            Some(RowConfig::new(
                Some(EventKind::Note(36)),
                Some(EventKind::Note(37)),
                9,
                0
            ))
        );
        assert_eq!(configs[1], None);
        let row_two = configs[2].unwrap();
        assert_eq!(
            row_two.start_event(),
            Some(MidiEvent::ProgramChange {
                value: 4,
                channel: 0
            })
        );
        assert_eq!(row_two.stop_event(), None);
        assert_eq!(row_two.tick_offset(), 3);
    }

    #[test]
    fn test_malformed_descriptors_send_nothing() {
        let mut mapping = BTreeMap::new();
        mapping.insert(0, RowSettings::new("cc10", "note", -1));
        mapping.insert(1, RowSettings::new("note40", "bogus", -1));
        let settings = Settings {
            mapping: Some(mapping),
            ..Default::default()
        };

        let configs = settings.row_configs();
        assert_eq!(configs[0], None);
        let row_one = configs[1].unwrap();
        assert!(row_one.start_event().is_some());
        assert!(row_one.stop_event().is_none());
        assert_eq!(row_one.channel(), 0);
    }

    #[test]
    fn test_mapping_outside_grid_is_ignored() {
        let mut mapping = BTreeMap::new();
        mapping.insert(12, RowSettings::new("note40", "note40", 0));
        let settings = Settings {
            rows: 8,
            mapping: Some(mapping),
            ..Default::default()
        };
        assert!(settings.row_configs().iter().all(Option::is_none));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            Settings {
                tempo: 0.0,
                ..Default::default()
            },
            Settings {
                measure_length: 0,
                ..Default::default()
            },
            Settings {
                columns: 65,
                ..Default::default()
            },
            Settings {
                rows: 0,
                ..Default::default()
            },
            Settings {
                rows: 257,
                ..Default::default()
            },
            Settings {
                mapping: Some(BTreeMap::from([(0, RowSettings::new("note1", "note1", 16))])),
                ..Default::default()
            },
        ];
        for settings in bad {
            assert!(settings.validate().is_err(), "{:?}", settings);
        }
    }
}
