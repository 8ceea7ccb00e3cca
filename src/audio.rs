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

//! The audio backend interface.
//!
//! Both the trigger engine and the metronome render through one shared
//! backend. The backend accepts attack and release commands for voices
//! identified by caller-assigned ids; the two clients draw ids from the same
//! global counter, so their voices can never collide. Scheduling is
//! immediate: there is no look-ahead, which keeps interactive latency
//! minimal.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod cpal;
pub mod mock;

/// Identifies one live voice in the backend.
pub type VoiceId = u64;

/// Global voice id counter shared by all backend clients.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh voice id.
pub fn next_voice_id() -> VoiceId {
    NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The sound a voice renders.
#[derive(Clone, Debug)]
pub enum Source {
    /// A preloaded mono sample, already resampled to the backend rate.
    Sample(Arc<Vec<f32>>),
    /// A parametric synthesized voice.
    Synth(Patch),
}

/// Parameters for a synthesized voice.
///
/// Decay values are time constants in seconds: the voice amplitude falls off
/// as `exp(-t / decay)` and the backend retires the voice once it is
/// inaudible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Patch {
    /// A membrane-like decaying sine tone.
    Membrane { freq: f32, decay: f32 },
    /// A white noise burst.
    Noise { decay: f32 },
    /// A metallic tone built from inharmonic partials.
    Metallic { freq: f32, decay: f32 },
}

/// Typed error for backend start failures so callers can distinguish a
/// missing device from a stream that would not open.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no audio output device named {0:?}")]
    UnknownDevice(String),
    #[error("no default audio output device")]
    NoDefaultDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// A rendering backend shared by the trigger engine and the metronome.
pub trait Backend: fmt::Display + Send + Sync {
    /// Returns the name of the backend device.
    fn name(&self) -> String;

    /// Starts the backend. Idempotent: concurrent and repeated callers join
    /// a single in-flight attempt. A failed start is not memoized; the next
    /// caller retries.
    fn start(&self) -> Result<(), BackendError>;

    /// The output sample rate. Meaningful once `start` has succeeded.
    fn sample_rate(&self) -> u32;

    /// Begins rendering a voice at the given gain. When `release_after` is
    /// set the backend releases the voice itself once that long has played.
    /// Errors are swallowed: an attack on a backend that cannot render is a
    /// no-op.
    fn attack(&self, voice: VoiceId, source: Source, gain: f32, release_after: Option<Duration>);

    /// Stops a ringing voice with a short fade. Releasing a voice that never
    /// started, or that already ended, is a no-op.
    fn release(&self, voice: VoiceId);
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Backend::list()
}

/// Gets a backend for the given output device, or the default output device
/// if no name is given.
pub fn get_device(name: Option<&str>) -> Result<Arc<dyn Backend>, Box<dyn Error>> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Arc::new(mock::Backend::get(name)));
        }
    }

    Ok(Arc::new(cpal::Backend::get(name)?))
}
