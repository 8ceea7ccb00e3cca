// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The default metronome tempo in BPM.
const DEFAULT_TEMPO: f64 = 120.0;

/// The default metronome meter.
const DEFAULT_BEATS_PER_BAR: usize = 4;

/// The configuration for the pad instrument.
#[derive(Deserialize)]
pub struct Config {
    /// The audio device to use. Empty means the system default.
    audio_device: Option<String>,
    /// The MIDI input device to use.
    midi_device: Option<String>,
    /// The directory holding the pad samples.
    sample_dir: Option<PathBuf>,
    /// The file the bindings are persisted to.
    bindings_file: Option<PathBuf>,
    /// The starting metronome tempo.
    tempo: Option<f64>,
    /// The starting metronome meter.
    beats_per_bar: Option<usize>,

    /// The directory the config file was loaded from; relative paths
    /// resolve against it.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    /// Parses the config from a YAML file.
    pub fn load(path: &Path) -> Result<Config, Box<dyn Error>> {
        let mut config: Config = serde_yml::from_str(&fs::read_to_string(path)?)
            .map_err(|e| format!("error parsing config file {}: {}", path.display(), e))?;
        config.base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Returns a config with all defaults, resolved against the current
    /// directory.
    pub fn default_at(base_dir: &Path) -> Config {
        Config {
            audio_device: None,
            midi_device: None,
            sample_dir: None,
            bindings_file: None,
            tempo: None,
            beats_per_bar: None,
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    pub fn midi_device(&self) -> Option<&str> {
        self.midi_device.as_deref()
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.resolve(self.sample_dir.as_deref().unwrap_or(Path::new("samples")))
    }

    pub fn bindings_file(&self) -> PathBuf {
        self.resolve(
            self.bindings_file
                .as_deref()
                .unwrap_or(Path::new("bindings.json")),
        )
    }

    pub fn tempo(&self) -> f64 {
        self.tempo.unwrap_or(DEFAULT_TEMPO)
    }

    pub fn beats_per_bar(&self) -> usize {
        self.beats_per_bar.unwrap_or(DEFAULT_BEATS_PER_BAR)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
