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

//! The binding table.
//!
//! Maps input identities (keyboard keys, MIDI note numbers, MIDI controller
//! numbers) to pads. Each identity is owned by at most one pad; additions
//! that would break that invariant are rejected with the current owner. A
//! pad's default MIDI note is reserved for it and never enters the table:
//! binding it to its own pad is a no-op, binding it to another is a
//! conflict.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::pads::Pad;

/// The identities bound to one pad beyond its reserved default note.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Binding {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keys: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub notes: BTreeSet<u8>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub controllers: BTreeSet<u8>,
}

impl Binding {
    fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.notes.is_empty() && self.controllers.is_empty()
    }
}

/// The result of attempting to add a binding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AddOutcome {
    /// The identity was newly bound to the pad.
    Added,
    /// The identity was already bound to this pad (or is its reserved
    /// default note).
    Unchanged,
    /// The identity belongs to another pad.
    Conflict { owner: Pad },
}

/// The full binding table, keyed by each pad's default note number.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BindingTable {
    entries: BTreeMap<u8, Binding>,
}

impl BindingTable {
    pub fn new() -> BindingTable {
        BindingTable::default()
    }

    /// Returns the pad a key is bound to, if any.
    pub fn owner_of_key(&self, key: &str) -> Option<Pad> {
        self.entries
            .iter()
            .find(|(_, binding)| binding.keys.contains(key))
            .and_then(|(note, _)| Pad::from_note(*note))
    }

    /// Returns the pad a note resolves to. Reserved defaults win; extra
    /// bindings are consulted only for notes outside the default map.
    pub fn owner_of_note(&self, note: u8) -> Option<Pad> {
        if let Some(pad) = Pad::from_note(note) {
            return Some(pad);
        }
        self.entries
            .iter()
            .find(|(_, binding)| binding.notes.contains(&note))
            .and_then(|(note, _)| Pad::from_note(*note))
    }

    /// Returns the pad a controller number is bound to, if any.
    pub fn owner_of_controller(&self, controller: u8) -> Option<Pad> {
        self.entries
            .iter()
            .find(|(_, binding)| binding.controllers.contains(&controller))
            .and_then(|(note, _)| Pad::from_note(*note))
    }

    /// Binds a key to a pad unless another pad already owns it.
    pub fn try_add_key(&mut self, pad: Pad, key: &str) -> AddOutcome {
        match self.owner_of_key(key) {
            Some(owner) if owner == pad => AddOutcome::Unchanged,
            Some(owner) => AddOutcome::Conflict { owner },
            None => {
                self.entry(pad).keys.insert(key.to_string());
                AddOutcome::Added
            }
        }
    }

    /// Binds an extra note to a pad. Default notes are reserved: a pad's
    /// own default is an unchanged no-op, any other pad's default is a
    /// conflict.
    pub fn try_add_note(&mut self, pad: Pad, note: u8) -> AddOutcome {
        if let Some(owner) = Pad::from_note(note) {
            if owner == pad {
                return AddOutcome::Unchanged;
            }
            return AddOutcome::Conflict { owner };
        }
        match self.extra_note_owner(note) {
            Some(owner) if owner == pad => AddOutcome::Unchanged,
            Some(owner) => AddOutcome::Conflict { owner },
            None => {
                self.entry(pad).notes.insert(note);
                AddOutcome::Added
            }
        }
    }

    /// Binds a controller number to a pad unless another pad owns it.
    /// Controllers have no default reservation.
    pub fn try_add_controller(&mut self, pad: Pad, controller: u8) -> AddOutcome {
        match self.owner_of_controller(controller) {
            Some(owner) if owner == pad => AddOutcome::Unchanged,
            Some(owner) => AddOutcome::Conflict { owner },
            None => {
                self.entry(pad).controllers.insert(controller);
                AddOutcome::Added
            }
        }
    }

    /// Removes a key binding. Returns true if it was present.
    pub fn remove_key(&mut self, pad: Pad, key: &str) -> bool {
        let removed = self
            .entries
            .get_mut(&pad.note())
            .map(|binding| binding.keys.remove(key))
            .unwrap_or(false);
        self.prune(pad);
        removed
    }

    /// Removes an extra note binding. Returns true if it was present.
    pub fn remove_note(&mut self, pad: Pad, note: u8) -> bool {
        let removed = self
            .entries
            .get_mut(&pad.note())
            .map(|binding| binding.notes.remove(&note))
            .unwrap_or(false);
        self.prune(pad);
        removed
    }

    /// Removes a controller binding. Returns true if it was present.
    pub fn remove_controller(&mut self, pad: Pad, controller: u8) -> bool {
        let removed = self
            .entries
            .get_mut(&pad.note())
            .map(|binding| binding.controllers.remove(&controller))
            .unwrap_or(false);
        self.prune(pad);
        removed
    }

    /// Removes every binding for one pad.
    pub fn clear(&mut self, pad: Pad) {
        self.entries.remove(&pad.note());
    }

    /// Removes every binding for every pad.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Returns the binding entry for a pad, if it has one.
    pub fn get(&self, pad: Pad) -> Option<&Binding> {
        self.entries.get(&pad.note())
    }

    /// Rebuilds the table through the add operations, dropping entries under
    /// unknown note keys and any identity that a lower-numbered pad already
    /// owns. Externally edited data goes through this so a loaded table
    /// always upholds the uniqueness invariant.
    pub fn sanitized(&self) -> BindingTable {
        let mut table = BindingTable::new();
        for (note, binding) in &self.entries {
            let Some(pad) = Pad::from_note(*note) else {
                continue;
            };
            for key in &binding.keys {
                table.try_add_key(pad, key);
            }
            for note in &binding.notes {
                table.try_add_note(pad, *note);
            }
            for controller in &binding.controllers {
                table.try_add_controller(pad, *controller);
            }
        }
        table
    }

    fn extra_note_owner(&self, note: u8) -> Option<Pad> {
        self.entries
            .iter()
            .find(|(_, binding)| binding.notes.contains(&note))
            .and_then(|(note, _)| Pad::from_note(*note))
    }

    fn entry(&mut self, pad: Pad) -> &mut Binding {
        self.entries.entry(pad.note()).or_default()
    }

    fn prune(&mut self, pad: Pad) {
        if self
            .entries
            .get(&pad.note())
            .map(|binding| binding.is_empty())
            .unwrap_or(false)
        {
            self.entries.remove(&pad.note());
        }
    }
}
