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

//! The voice-triggering engine.
//!
//! This module provides:
//! - Sample loading and caching (in-memory for zero-latency playback)
//! - Logical pad + velocity to sound event resolution
//! - Choke group muting for the hi-hat pads
//! - Permanent fallback to synthesized voices when samples cannot load

mod loader;
mod synth;
mod trigger;

pub use trigger::{EngineMode, PrepareError, TriggerEngine};
