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
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{BackendError, Source, VoiceId};

/// A recorded backend command, in the order it was received.
#[derive(Clone, Debug)]
pub enum Command {
    Attack {
        voice: VoiceId,
        source: Source,
        gain: f32,
        release_after: Option<Duration>,
    },
    Release(VoiceId),
}

impl Command {
    /// Returns true if this command is an attack.
    pub fn is_attack(&self) -> bool {
        matches!(self, Command::Attack { .. })
    }
}

/// A mock backend. Doesn't actually render anything; it records every
/// command for assertions.
#[derive(Clone)]
pub struct Backend {
    name: String,
    fail_start: Arc<AtomicBool>,
    start_count: Arc<AtomicU32>,
    commands: Arc<Mutex<Vec<Command>>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            fail_start: Arc::new(AtomicBool::new(false)),
            start_count: Arc::new(AtomicU32::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes subsequent `start` calls fail, or succeed again.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::Relaxed);
    }

    /// Returns the number of times `start` was attempted.
    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }

    /// Returns a copy of the recorded commands.
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Forgets all recorded commands.
    pub fn clear_commands(&self) {
        self.commands.lock().clear();
    }
}

impl super::Backend for Backend {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> Result<(), BackendError> {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_start.load(Ordering::Relaxed) {
            return Err(BackendError::Stream("mock start failure".to_string()));
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        44100
    }

    fn attack(&self, voice: VoiceId, source: Source, gain: f32, release_after: Option<Duration>) {
        self.commands.lock().push(Command::Attack {
            voice,
            source,
            gain,
            release_after,
        });
    }

    fn release(&self, voice: VoiceId) {
        self.commands.lock().push(Command::Release(voice));
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
