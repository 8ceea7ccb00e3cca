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

//! Fallback voice parameters.
//!
//! When sample playback is unavailable the engine drives a small fixed bank
//! of parametric voices. The constants here map each pad to its voice role
//! with decay times tuned per role; the hi-hat decays additionally follow
//! the current pedal openness.

use crate::audio::Patch;
use crate::pads::Pad;

/// Returns the fallback patch for a pad at the given hi-hat openness
/// (0..127, only meaningful for the hat pads).
pub fn patch_for(pad: Pad, openness: u8) -> Patch {
    let open = openness.min(127) as f32 / 127.0;
    match pad {
        Pad::Kick => Patch::Membrane {
            freq: 55.0,
            decay: 0.28,
        },
        Pad::TomFloor => Patch::Membrane {
            freq: 95.0,
            decay: 0.30,
        },
        Pad::TomMid => Patch::Membrane {
            freq: 140.0,
            decay: 0.26,
        },
        Pad::TomHigh => Patch::Membrane {
            freq: 185.0,
            decay: 0.22,
        },
        Pad::Snare => Patch::Noise { decay: 0.16 },
        Pad::Stick => Patch::Noise { decay: 0.05 },
        // The hat decays vary by variant: a pedal chick is shortest, a
        // closed hit slightly longer, and an open hat rings in proportion
        // to how far the pedal is open.
        Pad::HiHatPedal => Patch::Metallic {
            freq: 3200.0,
            decay: 0.04,
        },
        Pad::HiHatClosed => Patch::Metallic {
            freq: 3200.0,
            decay: 0.06 + 0.04 * open,
        },
        Pad::HiHatOpen => Patch::Metallic {
            freq: 3000.0,
            decay: 0.30 + 0.45 * open,
        },
        Pad::Crash => Patch::Metallic {
            freq: 900.0,
            decay: 1.4,
        },
        Pad::Ride => Patch::Metallic {
            freq: 1100.0,
            decay: 1.0,
        },
    }
}
