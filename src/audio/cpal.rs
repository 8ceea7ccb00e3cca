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

//! The cpal rendering backend.
//!
//! Attack and release commands travel over a bounded channel and are drained
//! inside the output callback, so no lock is ever taken on the audio thread.
//! The cpal stream is not `Send`, so it lives on a dedicated thread that
//! parks once the stream is running.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::{BackendError, Patch, Source, VoiceId};

/// Hard cap on simultaneously ringing voices. The oldest voice is stolen
/// when the pool is full.
const MAX_VOICES: usize = 32;

/// Length of the fade applied when a voice is released.
const RELEASE_FADE: Duration = Duration::from_millis(4);

/// A voice amplitude below this is treated as silence and the voice retired.
const SILENCE_FLOOR: f32 = 0.001;

/// Commands handed to the output callback.
enum Command {
    Attack {
        voice: VoiceId,
        source: Source,
        gain: f32,
        release_after: Option<Duration>,
    },
    Release(VoiceId),
}

/// A cpal-backed audio output.
pub struct Backend {
    name: Option<String>,
    started: Mutex<Option<Started>>,
}

struct Started {
    tx: Sender<Command>,
    sample_rate: u32,
}

impl Backend {
    /// Gets a backend for the named output device, or the default device.
    pub fn get(name: Option<&str>) -> Result<Backend, Box<dyn Error>> {
        Ok(Backend {
            name: name.map(|n| n.to_string()),
            started: Mutex::new(None),
        })
    }

    /// Lists the names of all output devices.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.output_devices()? {
            names.push(device.name()?);
        }
        Ok(names)
    }
}

impl super::Backend for Backend {
    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "default".to_string())
    }

    fn start(&self) -> Result<(), BackendError> {
        // Holding the lock for the whole attempt coalesces concurrent
        // callers into the single in-flight start.
        let mut started = self.started.lock();
        if started.is_some() {
            return Ok(());
        }

        let (tx, rx) = crossbeam_channel::bounded::<Command>(256);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, BackendError>>(1);

        let name = self.name.clone();
        thread::spawn(move || run_stream(name, rx, ready_tx));

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(sample_rate)) => sample_rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BackendError::Stream("stream thread exited".to_string())),
        };

        info!(sample_rate, "Audio backend started.");
        *started = Some(Started { tx, sample_rate });
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.started
            .lock()
            .as_ref()
            .map(|s| s.sample_rate)
            .unwrap_or(44100)
    }

    fn attack(&self, voice: VoiceId, source: Source, gain: f32, release_after: Option<Duration>) {
        if let Some(started) = self.started.lock().as_ref() {
            // A full channel means the callback is hopelessly behind;
            // dropping the hit is better than blocking the caller.
            let _ = started.tx.try_send(Command::Attack {
                voice,
                source,
                gain,
                release_after,
            });
        }
    }

    fn release(&self, voice: VoiceId) {
        if let Some(started) = self.started.lock().as_ref() {
            let _ = started.tx.try_send(Command::Release(voice));
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", super::Backend::name(self))
    }
}

/// Opens the device and stream, reports readiness, then parks holding the
/// stream alive.
fn run_stream(
    name: Option<String>,
    rx: Receiver<Command>,
    ready_tx: Sender<Result<u32, BackendError>>,
) {
    let stream = match build_stream(name, rx) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // The stream stops when dropped, so this thread holds it and parks
    // forever.
    let _stream = stream;
    loop {
        thread::park();
    }
}

fn build_stream(
    name: Option<String>,
    rx: Receiver<Command>,
) -> Result<(cpal::Stream, u32), BackendError> {
    let host = cpal::default_host();

    let device = match &name {
        Some(name) => host
            .output_devices()
            .map_err(|e| BackendError::Stream(e.to_string()))?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            .ok_or_else(|| BackendError::UnknownDevice(name.clone()))?,
        None => host
            .default_output_device()
            .ok_or(BackendError::NoDefaultDevice)?,
    };

    let config = device
        .default_output_config()
        .map_err(|e| BackendError::Stream(e.to_string()))?;
    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(BackendError::Stream(format!(
            "unsupported sample format {:?}",
            config.sample_format()
        )));
    }

    let config: cpal::StreamConfig = config.into();
    let sample_rate = config.sample_rate;
    let channels = config.channels as usize;
    let mut mixer = Mixer::new(sample_rate);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Ok(cmd) = rx.try_recv() {
                    mixer.handle(cmd);
                }
                mixer.render(data, channels);
            },
            |e| error!(err = %e, "Audio output stream error."),
            None,
        )
        .map_err(|e| BackendError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| BackendError::Stream(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// The state of one ringing voice.
struct ActiveVoice {
    id: VoiceId,
    kind: VoiceKind,
    gain: f32,
    /// Frames rendered so far.
    frames: u64,
    /// Frame at which the voice releases itself, if scheduled.
    release_at: Option<u64>,
    /// Remaining fade multiplier once released; None while ringing.
    fade: Option<f32>,
}

enum VoiceKind {
    Sample {
        data: Arc<Vec<f32>>,
        pos: usize,
    },
    Synth {
        patch: Patch,
        phase: f32,
        phase2: f32,
        /// xorshift state for the noise role.
        noise: u32,
    },
}

/// Mixes active voices into the output buffer on the audio thread.
struct Mixer {
    sample_rate: f32,
    fade_step: f32,
    voices: Vec<ActiveVoice>,
}

impl Mixer {
    fn new(sample_rate: u32) -> Mixer {
        Mixer {
            sample_rate: sample_rate as f32,
            fade_step: 1.0 / (RELEASE_FADE.as_secs_f32() * sample_rate as f32).max(1.0),
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Attack {
                voice,
                source,
                gain,
                release_after,
            } => {
                if self.voices.len() >= MAX_VOICES {
                    debug!(max_voices = MAX_VOICES, "Voice pool full, stealing oldest");
                    self.voices.remove(0);
                }
                let kind = match source {
                    Source::Sample(data) => VoiceKind::Sample { data, pos: 0 },
                    Source::Synth(patch) => VoiceKind::Synth {
                        patch,
                        phase: 0.0,
                        phase2: 0.0,
                        noise: 0x9e3779b9 ^ voice as u32,
                    },
                };
                self.voices.push(ActiveVoice {
                    id: voice,
                    kind,
                    gain,
                    frames: 0,
                    release_at: release_after
                        .map(|d| (d.as_secs_f64() * self.sample_rate as f64) as u64),
                    fade: None,
                });
            }
            Command::Release(voice) => {
                // Releasing an unknown or finished voice is a no-op.
                for v in self.voices.iter_mut() {
                    if v.id == voice && v.fade.is_none() {
                        v.fade = Some(1.0);
                    }
                }
            }
        }
    }

    fn render(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels) {
            let mut out = 0.0f32;
            for voice in self.voices.iter_mut() {
                out += voice.next_sample(self.sample_rate, self.fade_step);
            }
            for sample in frame.iter_mut() {
                *sample = out;
            }
        }
        let sample_rate = self.sample_rate;
        self.voices.retain(|v| !v.finished(sample_rate));
    }
}

impl ActiveVoice {
    fn next_sample(&mut self, sample_rate: f32, fade_step: f32) -> f32 {
        if let Some(release_at) = self.release_at {
            if self.frames >= release_at && self.fade.is_none() {
                self.fade = Some(1.0);
            }
        }

        let t = self.frames as f32 / sample_rate;
        let raw = match &mut self.kind {
            VoiceKind::Sample { data, pos } => {
                let sample = data.get(*pos).copied().unwrap_or(0.0);
                *pos += 1;
                sample
            }
            VoiceKind::Synth {
                patch,
                phase,
                phase2,
                noise,
            } => match *patch {
                Patch::Membrane { freq, decay } => {
                    let env = (-t / decay).exp();
                    let s = phase.sin() * env;
                    *phase += std::f32::consts::TAU * freq / sample_rate;
                    s
                }
                Patch::Noise { decay } => {
                    // xorshift32, mapped to [-1, 1].
                    *noise ^= *noise << 13;
                    *noise ^= *noise >> 17;
                    *noise ^= *noise << 5;
                    let s = (*noise as f32 / u32::MAX as f32) * 2.0 - 1.0;
                    s * (-t / decay).exp()
                }
                Patch::Metallic { freq, decay } => {
                    let env = (-t / decay).exp();
                    let s = (phase.sin() + 0.7 * phase2.sin()) * 0.6 * env;
                    *phase += std::f32::consts::TAU * freq / sample_rate;
                    *phase2 += std::f32::consts::TAU * freq * 1.483 / sample_rate;
                    s
                }
            },
        };

        self.frames += 1;

        let fade = match &mut self.fade {
            Some(fade) => {
                *fade = (*fade - fade_step).max(0.0);
                *fade
            }
            None => 1.0,
        };

        raw * self.gain * fade
    }

    fn finished(&self, sample_rate: f32) -> bool {
        if self.fade == Some(0.0) {
            return true;
        }
        match &self.kind {
            VoiceKind::Sample { data, pos } => *pos >= data.len(),
            VoiceKind::Synth { patch, .. } => {
                let decay = match patch {
                    Patch::Membrane { decay, .. }
                    | Patch::Noise { decay }
                    | Patch::Metallic { decay, .. } => *decay,
                };
                // exp(-t/decay) falls below the silence floor at
                // t = decay * ln(1/floor).
                let cutoff = decay * (1.0 / SILENCE_FLOOR).ln();
                self.frames as f32 / sample_rate > cutoff
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attack(mixer: &mut Mixer, voice: VoiceId, source: Source, release_after: Option<Duration>) {
        mixer.handle(Command::Attack {
            voice,
            source,
            gain: 1.0,
            release_after,
        });
    }

    #[test]
    fn test_sample_voice_plays_and_finishes() {
        let mut mixer = Mixer::new(44100);
        let data = Arc::new(vec![0.5f32; 8]);
        attack(&mut mixer, 1, Source::Sample(data), None);

        let mut out = vec![0.0f32; 16];
        mixer.render(&mut out, 1);

        assert_eq!(0.5, out[0]);
        assert_eq!(0.5, out[7]);
        assert_eq!(0.0, out[8]);
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn test_release_fades_voice() {
        let mut mixer = Mixer::new(44100);
        let data = Arc::new(vec![1.0f32; 44100]);
        attack(&mut mixer, 1, Source::Sample(data), None);
        mixer.handle(Command::Release(1));

        // The fade lasts about 4ms; well before 1000 frames the voice
        // should be retired.
        let mut out = vec![0.0f32; 1000];
        mixer.render(&mut out, 1);
        assert!(mixer.voices.is_empty());
        assert_eq!(0.0, *out.last().unwrap());
    }

    #[test]
    fn test_release_unknown_voice_is_noop() {
        let mut mixer = Mixer::new(44100);
        mixer.handle(Command::Release(42));
        let mut out = vec![0.0f32; 64];
        mixer.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_scheduled_release() {
        let mut mixer = Mixer::new(44100);
        let data = Arc::new(vec![1.0f32; 44100]);
        attack(
            &mut mixer,
            1,
            Source::Sample(data),
            Some(Duration::from_millis(10)),
        );

        // 10ms of audio plus the fade is far less than half a second.
        let mut out = vec![0.0f32; 22050];
        mixer.render(&mut out, 1);
        assert!(mixer.voices.is_empty());
        assert_eq!(1.0, out[0]);
        assert_eq!(0.0, *out.last().unwrap());
    }

    #[test]
    fn test_voice_pool_steals_oldest() {
        let mut mixer = Mixer::new(44100);
        for id in 0..(MAX_VOICES as u64 + 1) {
            attack(
                &mut mixer,
                id,
                Source::Synth(Patch::Membrane {
                    freq: 100.0,
                    decay: 1.0,
                }),
                None,
            );
        }
        assert_eq!(MAX_VOICES, mixer.voices.len());
        assert_eq!(1, mixer.voices[0].id);
    }
}
