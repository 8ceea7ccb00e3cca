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

//! The trigger engine proper: resolves a pad and velocity into backend
//! attack/release commands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::loader::SampleSet;
use super::synth;
use crate::audio::{next_voice_id, Backend, Source, VoiceId};
use crate::pads::Pad;

/// How long the closed hat rings before its scheduled release, emulating a
/// damped stick hit.
const HAT_CLOSED_DAMP: Duration = Duration::from_millis(140);

/// How long the pedal chick rings before its scheduled release.
const HAT_PEDAL_DAMP: Duration = Duration::from_millis(110);

/// Whether the engine renders from recorded samples or the synthesized
/// fallback bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    Sampled,
    SynthesizedFallback,
}

/// Typed error for `prepare` so callers can tell a backend that would not
/// start apart from anything else. Sample load failures are not errors: they
/// flip the engine into fallback mode instead.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("audio backend failed to start: {0}")]
    Backend(#[from] crate::audio::BackendError),
}

/// The state of a completed prepare attempt.
#[derive(Debug)]
struct Prepared {
    mode: EngineMode,
    samples: Option<SampleSet>,
}

/// The voice-triggering engine. Owns the live audio resources: the loaded
/// sample set, the fallback voice parameters, and the ids of ringing voices.
pub struct TriggerEngine {
    backend: Arc<dyn Backend>,
    sample_dir: PathBuf,
    /// Memoized prepare outcome. Holding the lock for the duration of the
    /// attempt coalesces concurrent callers; a backend failure leaves it
    /// `None` so the next user gesture retries.
    prepared: Mutex<Option<Prepared>>,
    /// The ringing voice per choke-group pad, released when any member of
    /// the group is retriggered.
    ringing: Mutex<HashMap<Pad, VoiceId>>,
    /// Current hi-hat pedal openness (0 closed .. 127 open).
    hh_openness: AtomicU8,
}

impl TriggerEngine {
    /// Creates a new engine rendering through the given backend. Samples are
    /// loaded from `sample_dir` on the first `prepare`.
    pub fn new(backend: Arc<dyn Backend>, sample_dir: PathBuf) -> TriggerEngine {
        TriggerEngine {
            backend,
            sample_dir,
            prepared: Mutex::new(None),
            ringing: Mutex::new(HashMap::new()),
            hh_openness: AtomicU8::new(0),
        }
    }

    /// Idempotently readies the engine: starts the backend and runs the
    /// one-shot sample load. The first decode failure flips the engine into
    /// `SynthesizedFallback` for the rest of the session; only a backend
    /// start failure is an error, and that is retried on the next call.
    pub fn prepare(&self) -> Result<EngineMode, PrepareError> {
        let mut prepared = self.prepared.lock();
        if let Some(prepared) = prepared.as_ref() {
            return Ok(prepared.mode);
        }

        self.backend.start()?;

        let outcome = match SampleSet::load(&self.sample_dir, self.backend.sample_rate()) {
            Ok(samples) => {
                info!("Trigger engine prepared in sampled mode.");
                Prepared {
                    mode: EngineMode::Sampled,
                    samples: Some(samples),
                }
            }
            Err(e) => {
                warn!(
                    err = e.as_ref(),
                    dir = %self.sample_dir.display(),
                    "Sample set unavailable, falling back to synthesized voices."
                );
                Prepared {
                    mode: EngineMode::SynthesizedFallback,
                    samples: None,
                }
            }
        };

        let mode = outcome.mode;
        *prepared = Some(outcome);
        Ok(mode)
    }

    /// Returns the current engine mode.
    pub fn mode(&self) -> EngineMode {
        self.prepared
            .lock()
            .as_ref()
            .map(|p| p.mode)
            .unwrap_or(EngineMode::Sampled)
    }

    /// Records the hi-hat pedal openness. State only: no audio output until
    /// the next hat hit.
    pub fn set_hi_hat_openness(&self, value: u8) {
        self.hh_openness.store(value.min(127), Ordering::Relaxed);
    }

    /// Renders one hit of the given pad. Never panics and never surfaces an
    /// error: if the engine cannot render (backend down, not prepared yet)
    /// the hit is quietly dropped.
    pub fn trigger(&self, pad: Pad, velocity: u8) {
        if self.prepare().is_err() {
            debug!(pad = %pad, "Dropping trigger, backend unavailable.");
            return;
        }

        let gain = velocity.min(127) as f32 / 127.0;
        self.choke(pad);

        let voice = next_voice_id();
        let prepared = self.prepared.lock();
        let samples = prepared.as_ref().and_then(|p| p.samples.as_ref());

        let source = match samples.and_then(|s| s.get(pad)) {
            Some(data) => Source::Sample(data),
            None => Source::Synth(synth::patch_for(
                pad,
                self.hh_openness.load(Ordering::Relaxed),
            )),
        };

        // The damped hat variants schedule their own early release; sampled
        // open hats and everything else ring their natural length.
        let release_after = match (&source, pad) {
            (Source::Sample(_), Pad::HiHatClosed) => Some(HAT_CLOSED_DAMP),
            (Source::Sample(_), Pad::HiHatPedal) => Some(HAT_PEDAL_DAMP),
            _ => None,
        };

        if pad.choke_group().is_some() {
            self.ringing.lock().insert(pad, voice);
        }

        debug!(pad = %pad, velocity, voice, "Triggering pad.");
        self.backend.attack(voice, source, gain, release_after);
    }

    /// Releases every ringing voice in the pad's choke group, including a
    /// previous hit of the pad itself. A no-op for pads outside any group.
    fn choke(&self, pad: Pad) {
        if pad.choke_group().is_none() {
            return;
        }
        let mut ringing = self.ringing.lock();
        for member in pad.choke_members() {
            if let Some(voice) = ringing.remove(&member) {
                debug!(pad = %member, voice, "Choking voice.");
                self.backend.release(voice);
            }
        }
    }
}

impl std::fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEngine")
            .field("mode", &self.mode())
            .field("ringing", &self.ringing.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{self, Command};
    use crate::audio::Patch;
    use crate::testutil::write_wav;
    use std::path::Path;

    fn mock_engine(sample_dir: &Path) -> (TriggerEngine, Arc<mock::Backend>) {
        let backend = Arc::new(mock::Backend::get("mock"));
        let engine = TriggerEngine::new(backend.clone(), sample_dir.to_path_buf());
        (engine, backend)
    }

    fn sampled_engine() -> (TriggerEngine, Arc<mock::Backend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let samples = vec![0.5f32; 32];
        for pad in Pad::ALL {
            write_wav(&dir.path().join(pad.spec().sample_file), &samples, 44100)
                .expect("write wav");
        }
        let (engine, backend) = mock_engine(dir.path());
        (engine, backend, dir)
    }

    #[test]
    fn test_prepare_sampled_mode() {
        let (engine, backend, _dir) = sampled_engine();
        assert_eq!(EngineMode::Sampled, engine.prepare().expect("prepare"));
        assert_eq!(EngineMode::Sampled, engine.mode());
        // A second prepare joins the memoized outcome without a new backend
        // start attempt beyond the first.
        assert_eq!(EngineMode::Sampled, engine.prepare().expect("prepare"));
        assert_eq!(1, backend.start_count());
    }

    #[test]
    fn test_prepare_falls_back_permanently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, _backend) = mock_engine(dir.path());

        assert_eq!(
            EngineMode::SynthesizedFallback,
            engine.prepare().expect("prepare")
        );

        // Even if samples appear later the mode never flips back.
        let samples = vec![0.5f32; 32];
        for pad in Pad::ALL {
            write_wav(&dir.path().join(pad.spec().sample_file), &samples, 44100)
                .expect("write wav");
        }
        assert_eq!(
            EngineMode::SynthesizedFallback,
            engine.prepare().expect("prepare")
        );
        assert_eq!(EngineMode::SynthesizedFallback, engine.mode());
    }

    #[test]
    fn test_prepare_backend_failure_retries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, backend) = mock_engine(dir.path());

        backend.set_fail_start(true);
        assert!(engine.prepare().is_err());

        // The failure was not memoized: the next gesture retries and
        // succeeds.
        backend.set_fail_start(false);
        assert!(engine.prepare().is_ok());
        assert_eq!(2, backend.start_count());
    }

    #[test]
    fn test_kick_renders_one_attack_no_release() {
        let (engine, backend, _dir) = sampled_engine();
        engine.prepare().expect("prepare");
        backend.clear_commands();

        engine.trigger(Pad::Kick, 100);

        let commands = backend.commands();
        assert_eq!(1, commands.len());
        match &commands[0] {
            Command::Attack {
                source,
                gain,
                release_after,
                ..
            } => {
                assert!(matches!(source, Source::Sample(_)));
                assert!((gain - 100.0 / 127.0).abs() < 1e-6);
                assert_eq!(None, *release_after);
            }
            other => panic!("expected attack, got {:?}", other),
        }
    }

    #[test]
    fn test_open_then_closed_hat_chokes_open_voice() {
        let (engine, backend, _dir) = sampled_engine();
        engine.prepare().expect("prepare");
        backend.clear_commands();

        engine.trigger(Pad::HiHatOpen, 100);
        engine.trigger(Pad::HiHatClosed, 90);

        let commands = backend.commands();
        assert_eq!(3, commands.len());

        let open_voice = match &commands[0] {
            Command::Attack { voice, release_after, .. } => {
                assert_eq!(None, *release_after);
                *voice
            }
            other => panic!("expected open attack, got {:?}", other),
        };
        match &commands[1] {
            Command::Release(voice) => assert_eq!(open_voice, *voice),
            other => panic!("expected release of open voice, got {:?}", other),
        }
        match &commands[2] {
            Command::Attack { release_after, .. } => {
                assert_eq!(Some(HAT_CLOSED_DAMP), *release_after)
            }
            other => panic!("expected closed attack, got {:?}", other),
        }
    }

    #[test]
    fn test_hat_choke_all_orderings() {
        let hats = [Pad::HiHatClosed, Pad::HiHatOpen, Pad::HiHatPedal];
        for first in hats {
            for second in hats {
                let (engine, backend, _dir) = sampled_engine();
                engine.prepare().expect("prepare");
                backend.clear_commands();

                engine.trigger(first, 100);
                engine.trigger(second, 100);

                let commands = backend.commands();
                // Attack, release of the first hat's voice, second attack.
                assert_eq!(3, commands.len(), "{} then {}", first, second);
                assert!(commands[0].is_attack());
                assert!(matches!(commands[1], Command::Release(_)));
                assert!(commands[2].is_attack());
            }
        }
    }

    #[test]
    fn test_non_group_pads_never_choke() {
        let (engine, backend, _dir) = sampled_engine();
        engine.prepare().expect("prepare");
        backend.clear_commands();

        engine.trigger(Pad::Kick, 100);
        engine.trigger(Pad::Snare, 100);
        engine.trigger(Pad::Crash, 100);
        engine.trigger(Pad::Crash, 100);

        assert!(backend.commands().iter().all(Command::is_attack));
    }

    #[test]
    fn test_fallback_uses_synth_patches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, backend) = mock_engine(dir.path());
        engine.prepare().expect("prepare");
        backend.clear_commands();

        engine.trigger(Pad::Snare, 127);

        let commands = backend.commands();
        assert_eq!(1, commands.len());
        match &commands[0] {
            Command::Attack { source, gain, .. } => {
                assert!(matches!(source, Source::Synth(Patch::Noise { .. })));
                assert_eq!(1.0, *gain);
            }
            other => panic!("expected attack, got {:?}", other),
        }
    }

    #[test]
    fn test_openness_feeds_fallback_hat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, backend) = mock_engine(dir.path());
        engine.prepare().expect("prepare");

        let open_decay = |backend: &mock::Backend| match backend.commands().last() {
            Some(Command::Attack {
                source: Source::Synth(Patch::Metallic { decay, .. }),
                ..
            }) => *decay,
            other => panic!("expected metallic attack, got {:?}", other),
        };

        engine.set_hi_hat_openness(0);
        engine.trigger(Pad::HiHatOpen, 100);
        let closed_pedal = open_decay(&backend);

        engine.set_hi_hat_openness(127);
        engine.trigger(Pad::HiHatOpen, 100);
        let open_pedal = open_decay(&backend);

        assert!(closed_pedal < open_pedal);
    }

    #[test]
    fn test_trigger_with_failed_backend_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, backend) = mock_engine(dir.path());
        backend.set_fail_start(true);

        engine.trigger(Pad::Kick, 100);
        assert!(backend.commands().is_empty());
    }
}
