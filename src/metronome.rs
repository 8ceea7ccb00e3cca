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

//! The self-clocking beat scheduler.
//!
//! A dedicated clock thread emits one tick per quarter-note subdivision,
//! sleeping against an absolute deadline so ticks never drift and tempo
//! changes ramp without a phase discontinuity. Each tick renders a hard or
//! soft click through the shared audio backend, weighted by the per-beat
//! accent and volume pattern, and notifies the single tick subscriber.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{next_voice_id, Backend, BackendError, Patch, Source};

/// Tempo bounds in beats per minute.
const MIN_TEMPO: f64 = 30.0;
const MAX_TEMPO: f64 = 300.0;

/// Beats-per-bar bounds.
const MIN_BEATS_PER_BAR: usize = 1;
const MAX_BEATS_PER_BAR: usize = 12;

/// Base gains for the two click voices; the accented click is louder.
const HARD_CLICK_GAIN: f32 = 0.9;
const SOFT_CLICK_GAIN: f32 = 0.55;

/// The two click voices: short sine bursts, the accented one pitched higher.
const HARD_CLICK: Patch = Patch::Membrane {
    freq: 1000.0,
    decay: 0.02,
};
const SOFT_CLICK: Patch = Patch::Membrane {
    freq: 800.0,
    decay: 0.015,
};

/// How often the clock thread wakes to check for a stop while sleeping
/// toward the next tick.
const STOP_POLL: Duration = Duration::from_millis(20);

/// The callback invoked with `(beat_in_bar, bar)` after each tick renders.
pub type TickFn = Box<dyn Fn(u32, u64) + Send + Sync>;

/// One emitted tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    pub beat_in_bar: u32,
    pub bar: u64,
    pub accent: bool,
    pub volume: f32,
}

/// The mutable scheduler state: tempo, meter, pattern and counters.
#[derive(Debug)]
struct State {
    tempo: f64,
    beats_per_bar: usize,
    accents: Vec<bool>,
    volumes: Vec<f32>,
    beat: u64,
    bar: u64,
}

impl State {
    fn new(tempo: f64, beats_per_bar: usize) -> State {
        let tempo = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
        let beats_per_bar = beats_per_bar.clamp(MIN_BEATS_PER_BAR, MAX_BEATS_PER_BAR);
        State {
            tempo,
            beats_per_bar,
            accents: vec![false; beats_per_bar],
            volumes: vec![1.0; beats_per_bar],
            beat: 0,
            bar: 0,
        }
    }

    /// Advances the counters by one tick and returns what it should render.
    /// The bar counter increments on every lap through beat zero, so the
    /// very first tick is reported as bar 1.
    fn advance(&mut self) -> Tick {
        let beat_in_bar = (self.beat % self.beats_per_bar as u64) as usize;
        if beat_in_bar == 0 {
            self.bar += 1;
        }
        let tick = Tick {
            beat_in_bar: beat_in_bar as u32,
            bar: self.bar,
            accent: self.accents[beat_in_bar],
            volume: self.volumes[beat_in_bar],
        };
        self.beat += 1;
        tick
    }

    /// Resizes the accent and volume patterns, preserving existing values
    /// by index and padding new slots with the defaults.
    fn resize(&mut self, beats_per_bar: usize) {
        self.beats_per_bar = beats_per_bar;
        self.accents.resize(beats_per_bar, false);
        self.volumes.resize(beats_per_bar, 1.0);
    }
}

/// The metronome. Owns its state and clock thread; renders clicks through
/// the shared backend.
pub struct Metronome {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<State>>,
    subscriber: Arc<Mutex<Option<Arc<TickFn>>>>,
    running: Arc<AtomicBool>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl Metronome {
    /// Creates a stopped metronome at the given tempo and meter.
    pub fn new(backend: Arc<dyn Backend>, tempo: f64, beats_per_bar: usize) -> Metronome {
        Metronome {
            backend,
            state: Arc::new(Mutex::new(State::new(tempo, beats_per_bar))),
            subscriber: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            clock: Mutex::new(None),
        }
    }

    /// Starts ticking from beat zero. The audio backend must start first;
    /// if it cannot, the metronome does not start.
    pub fn start(&self) -> Result<(), BackendError> {
        self.stop();
        self.backend.start()?;

        {
            let mut state = self.state.lock();
            state.beat = 0;
            state.bar = 0;
        }

        info!(tempo = self.tempo(), "Metronome started.");
        self.running.store(true, Ordering::Relaxed);

        let backend = self.backend.clone();
        let state = self.state.clone();
        let subscriber = self.subscriber.clone();
        let running = self.running.clone();
        *self.clock.lock() = Some(thread::spawn(move || {
            run_clock(backend, state, subscriber, running)
        }));

        Ok(())
    }

    /// Stops ticking before the next scheduled tick. Counters keep their
    /// values until the next `start`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(clock) = self.clock.lock().take() {
            if clock.join().is_err() {
                warn!("Metronome clock thread panicked.");
            }
            info!("Metronome stopped.");
        }
    }

    /// Returns true while the clock is ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Sets the tempo, clamped to [30, 300] BPM. The live clock ramps: the
    /// already-scheduled tick fires on time and later ticks use the new
    /// period.
    pub fn set_tempo(&self, bpm: f64) {
        let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
        self.state.lock().tempo = bpm;
        debug!(bpm, "Tempo changed.");
    }

    /// Returns the current tempo.
    pub fn tempo(&self) -> f64 {
        self.state.lock().tempo
    }

    /// Sets the beats per bar, clamped to [1, 12], preserving the existing
    /// accent/volume pattern by index.
    pub fn set_beats_per_bar(&self, beats: usize) {
        let beats = beats.clamp(MIN_BEATS_PER_BAR, MAX_BEATS_PER_BAR);
        self.state.lock().resize(beats);
    }

    /// Returns the current beats per bar.
    pub fn beats_per_bar(&self) -> usize {
        self.state.lock().beats_per_bar
    }

    /// Sets the accent flag for one beat; out-of-range indices clamp to the
    /// last beat.
    pub fn set_accent(&self, beat: usize, accent: bool) {
        let mut state = self.state.lock();
        let idx = beat.min(state.beats_per_bar - 1);
        state.accents[idx] = accent;
    }

    /// Replaces the whole accent pattern, truncated or padded to the
    /// current meter.
    pub fn set_accents(&self, accents: Vec<bool>) {
        let mut state = self.state.lock();
        let beats = state.beats_per_bar;
        state.accents = accents;
        state.accents.resize(beats, false);
    }

    /// Returns the accent pattern.
    pub fn accents(&self) -> Vec<bool> {
        self.state.lock().accents.clone()
    }

    /// Sets the volume for one beat, clamped to [0, 1]; out-of-range
    /// indices clamp to the last beat.
    pub fn set_volume(&self, beat: usize, volume: f32) {
        let mut state = self.state.lock();
        let idx = beat.min(state.beats_per_bar - 1);
        state.volumes[idx] = volume.clamp(0.0, 1.0);
    }

    /// Replaces the whole volume pattern, truncated or padded to the
    /// current meter.
    pub fn set_volumes(&self, volumes: Vec<f32>) {
        let mut state = self.state.lock();
        let beats = state.beats_per_bar;
        state.volumes = volumes
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0))
            .collect();
        state.volumes.resize(beats, 1.0);
    }

    /// Returns the volume pattern.
    pub fn volumes(&self) -> Vec<f32> {
        self.state.lock().volumes.clone()
    }

    /// Sets or clears the tick subscriber. A new subscriber replaces the
    /// previous one. Safe to call from inside a tick callback.
    pub fn subscribe(&self, callback: Option<TickFn>) {
        *self.subscriber.lock() = callback.map(Arc::new);
    }

    /// Returns the running beat and bar counters.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.beat, state.bar)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The clock loop: tick, then sleep toward the next absolute deadline.
fn run_clock(
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<State>>,
    subscriber: Arc<Mutex<Option<Arc<TickFn>>>>,
    running: Arc<AtomicBool>,
) {
    let mut next = Instant::now();

    while running.load(Ordering::Relaxed) {
        let (tick, period) = {
            let mut state = state.lock();
            let tick = state.advance();
            (tick, Duration::from_secs_f64(60.0 / state.tempo))
        };

        let (patch, base_gain) = if tick.accent {
            (HARD_CLICK, HARD_CLICK_GAIN)
        } else {
            (SOFT_CLICK, SOFT_CLICK_GAIN)
        };
        backend.attack(
            next_voice_id(),
            Source::Synth(patch),
            base_gain * tick.volume,
            None,
        );

        // The callback runs outside the lock so a subscriber that calls
        // `subscribe` from inside its own callback cannot deadlock.
        let callback = subscriber.lock().clone();
        if let Some(callback) = callback {
            (*callback)(tick.beat_in_bar, tick.bar);
        }

        // The deadline advances by exactly one period per tick; reading the
        // tempo fresh each lap makes tempo changes take effect on the next
        // interval without disturbing the current phase.
        next += period;
        let mut now = Instant::now();
        if next < now {
            // Fell behind (e.g. suspended); realign rather than burst.
            next = now;
        }
        while now < next {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            spin_sleep::sleep((next - now).min(STOP_POLL));
            now = Instant::now();
        }
    }
}
