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

//! The fixed voice catalog.
//!
//! Maps the logical pads of the instrument to their General MIDI note
//! numbers, sample files, fallback synthesis roles and choke groups. This is
//! pure data: the catalog never changes at runtime and carries no behavior of
//! its own.

use std::fmt;

/// One logical drum pad, independent of any physical input bound to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pad {
    Kick,
    Stick,
    Snare,
    TomFloor,
    HiHatClosed,
    HiHatPedal,
    TomMid,
    HiHatOpen,
    TomHigh,
    Crash,
    Ride,
}

/// The fallback synthesis role of a pad, used when sample playback is
/// unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceRole {
    /// Membrane-like decaying tone (kick and toms).
    Membrane,
    /// Short noise burst (snare and stick).
    Noise,
    /// Metallic decaying tone (hats and cymbals).
    Metallic,
}

/// Choke group membership. Triggering any pad in a group silences the
/// ringing output of every other member before the new hit renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChokeGroup {
    HiHat,
}

/// The synthesis parameters and sample reference for one pad.
#[derive(Clone, Copy, Debug)]
pub struct VoiceSpec {
    /// The pad's default General MIDI note number. Reserved: a note binding
    /// for a different pad can never claim this number.
    pub note: u8,
    /// The note name in scientific pitch notation.
    pub note_name: &'static str,
    /// The sample file for this pad within the sample directory.
    pub sample_file: &'static str,
    /// The fallback synthesis role.
    pub role: VoiceRole,
    /// The choke group this pad belongs to, if any.
    pub choke_group: Option<ChokeGroup>,
}

impl Pad {
    /// Every pad in the catalog, in note-number order.
    pub const ALL: [Pad; 11] = [
        Pad::Kick,
        Pad::Stick,
        Pad::Snare,
        Pad::TomFloor,
        Pad::HiHatClosed,
        Pad::HiHatPedal,
        Pad::TomMid,
        Pad::HiHatOpen,
        Pad::TomHigh,
        Pad::Crash,
        Pad::Ride,
    ];

    /// Returns the voice spec for this pad.
    pub const fn spec(self) -> VoiceSpec {
        match self {
            Pad::Kick => VoiceSpec {
                note: 36,
                note_name: "C2",
                sample_file: "kick.wav",
                role: VoiceRole::Membrane,
                choke_group: None,
            },
            Pad::Stick => VoiceSpec {
                note: 37,
                note_name: "C#2",
                sample_file: "stick.wav",
                role: VoiceRole::Noise,
                choke_group: None,
            },
            Pad::Snare => VoiceSpec {
                note: 38,
                note_name: "D2",
                sample_file: "snare.wav",
                role: VoiceRole::Noise,
                choke_group: None,
            },
            Pad::TomFloor => VoiceSpec {
                note: 41,
                note_name: "F2",
                sample_file: "tom-floor.wav",
                role: VoiceRole::Membrane,
                choke_group: None,
            },
            Pad::HiHatClosed => VoiceSpec {
                note: 42,
                note_name: "F#2",
                sample_file: "hihat-closed.wav",
                role: VoiceRole::Metallic,
                choke_group: Some(ChokeGroup::HiHat),
            },
            Pad::HiHatPedal => VoiceSpec {
                note: 44,
                note_name: "G#2",
                sample_file: "hihat-pedal.wav",
                role: VoiceRole::Metallic,
                choke_group: Some(ChokeGroup::HiHat),
            },
            Pad::TomMid => VoiceSpec {
                note: 45,
                note_name: "A2",
                sample_file: "tom-mid.wav",
                role: VoiceRole::Membrane,
                choke_group: None,
            },
            Pad::HiHatOpen => VoiceSpec {
                note: 46,
                note_name: "A#2",
                sample_file: "hihat-open.wav",
                role: VoiceRole::Metallic,
                choke_group: Some(ChokeGroup::HiHat),
            },
            Pad::TomHigh => VoiceSpec {
                note: 48,
                note_name: "C3",
                sample_file: "tom-high.wav",
                role: VoiceRole::Membrane,
                choke_group: None,
            },
            Pad::Crash => VoiceSpec {
                note: 49,
                note_name: "C#3",
                sample_file: "crash.wav",
                role: VoiceRole::Metallic,
                choke_group: None,
            },
            Pad::Ride => VoiceSpec {
                note: 51,
                note_name: "D#3",
                sample_file: "ride.wav",
                role: VoiceRole::Metallic,
                choke_group: None,
            },
        }
    }

    /// Returns the pad's default General MIDI note number.
    pub const fn note(self) -> u8 {
        self.spec().note
    }

    /// Returns the pad whose default note number matches, if any.
    pub fn from_note(note: u8) -> Option<Pad> {
        Pad::ALL.iter().copied().find(|pad| pad.note() == note)
    }

    /// Returns the choke group this pad belongs to, if any.
    pub const fn choke_group(self) -> Option<ChokeGroup> {
        self.spec().choke_group
    }

    /// Returns the other members of this pad's choke group, including the
    /// pad itself.
    pub fn choke_members(self) -> impl Iterator<Item = Pad> {
        let group = self.choke_group();
        Pad::ALL
            .into_iter()
            .filter(move |pad| group.is_some() && pad.choke_group() == group)
    }

    /// Returns the short identifier used on the command line.
    pub const fn id(self) -> &'static str {
        match self {
            Pad::Kick => "kick",
            Pad::Stick => "stick",
            Pad::Snare => "snare",
            Pad::TomFloor => "tom-floor",
            Pad::HiHatClosed => "hihat-closed",
            Pad::HiHatPedal => "hihat-pedal",
            Pad::TomMid => "tom-mid",
            Pad::HiHatOpen => "hihat-open",
            Pad::TomHigh => "tom-high",
            Pad::Crash => "crash",
            Pad::Ride => "ride",
        }
    }

    /// Returns the pad with the given short identifier, if any.
    pub fn from_id(id: &str) -> Option<Pad> {
        Pad::ALL.iter().copied().find(|pad| pad.id() == id)
    }

    /// Returns a human readable label for this pad.
    pub const fn label(self) -> &'static str {
        match self {
            Pad::Kick => "Kick",
            Pad::Stick => "Stick",
            Pad::Snare => "Snare",
            Pad::TomFloor => "Floor Tom",
            Pad::HiHatClosed => "Hi-Hat (Closed)",
            Pad::HiHatPedal => "Hi-Hat (Pedal)",
            Pad::TomMid => "Mid Tom",
            Pad::HiHatOpen => "Hi-Hat (Open)",
            Pad::TomHigh => "High Tom",
            Pad::Crash => "Crash",
            Pad::Ride => "Ride",
        }
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_numbers_unique() {
        for a in Pad::ALL {
            for b in Pad::ALL {
                if a != b {
                    assert_ne!(a.note(), b.note(), "{} and {} share a note", a, b);
                }
            }
        }
    }

    #[test]
    fn test_from_note_round_trip() {
        for pad in Pad::ALL {
            assert_eq!(Some(pad), Pad::from_note(pad.note()));
        }
        assert_eq!(None, Pad::from_note(0));
        assert_eq!(None, Pad::from_note(60));
    }

    #[test]
    fn test_from_id_round_trip() {
        for pad in Pad::ALL {
            assert_eq!(Some(pad), Pad::from_id(pad.id()));
        }
        assert_eq!(None, Pad::from_id("cowbell"));
    }

    #[test]
    fn test_hi_hat_choke_group() {
        let members: Vec<Pad> = Pad::HiHatClosed.choke_members().collect();
        assert_eq!(
            vec![Pad::HiHatClosed, Pad::HiHatPedal, Pad::HiHatOpen],
            members
        );

        // All three hats report the same group, nothing else does.
        for pad in Pad::ALL {
            let is_hat = matches!(pad, Pad::HiHatClosed | Pad::HiHatPedal | Pad::HiHatOpen);
            assert_eq!(is_hat, pad.choke_group() == Some(ChokeGroup::HiHat));
        }
    }

    #[test]
    fn test_choke_members_empty_outside_group() {
        assert_eq!(0, Pad::Kick.choke_members().count());
        assert_eq!(0, Pad::Crash.choke_members().count());
    }
}
