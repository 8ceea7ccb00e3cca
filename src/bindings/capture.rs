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

//! Capture states for learn-style binding.
//!
//! While a capture is listening, the next input event of its kind is
//! consumed as a binding attempt instead of a trigger. Each of the three
//! input kinds (key, note, controller) has its own independent slot.

use crate::pads::Pad;

/// The kind of input identity a capture listens for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CaptureKind {
    Key,
    Note,
    Controller,
}

/// One capture slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Capture {
    #[default]
    Idle,
    /// The next event of this kind binds to the given pad.
    Listening(Pad),
}

impl Capture {
    /// Takes the listening pad, returning the slot to idle.
    pub fn take(&mut self) -> Option<Pad> {
        match std::mem::take(self) {
            Capture::Idle => None,
            Capture::Listening(pad) => Some(pad),
        }
    }
}

/// The result of a consumed capture event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// The identity is now bound to the pad.
    Committed(Pad),
    /// The identity was already bound to the pad; nothing changed.
    Unchanged(Pad),
    /// The identity belongs to another pad; nothing changed.
    Conflicted { target: Pad, owner: Pad },
}
