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

//! The binding resolver.
//!
//! Routes incoming input events (keyboard keys, raw MIDI) either into the
//! trigger engine or, while a capture is listening, into the binding table.
//! Controller events pass through edge detection so that a sweeping pedal
//! fires a pad once per press rather than once per value change. Every
//! committed mutation is persisted through the binding store.

mod capture;
mod store;
mod table;

use std::collections::HashMap;
use std::sync::Arc;

use midly::{live::LiveEvent, MidiMessage};
use parking_lot::Mutex;
use tracing::{debug, warn};

pub use capture::{Capture, CaptureKind, CaptureOutcome};
pub use store::BindingStore;
pub use table::{AddOutcome, Binding, BindingTable};

use crate::engine::TriggerEngine;
use crate::pads::Pad;

/// The velocity used for triggers with no velocity of their own, such as
/// keyboard keys.
const DEFAULT_VELOCITY: u8 = 100;

/// Controller values at or above this threshold count as pressed.
const CC_PRESS_THRESHOLD: u8 = 64;

/// The controller number carrying hi-hat pedal openness.
const CC_HI_HAT_OPENNESS: u8 = 4;

#[derive(Default)]
struct Captures {
    key: Capture,
    note: Capture,
    controller: Capture,
}

impl Captures {
    fn slot(&mut self, kind: CaptureKind) -> &mut Capture {
        match kind {
            CaptureKind::Key => &mut self.key,
            CaptureKind::Note => &mut self.note,
            CaptureKind::Controller => &mut self.controller,
        }
    }
}

/// Resolves input identities to pads and manages the binding table.
pub struct Resolver {
    engine: Arc<TriggerEngine>,
    store: BindingStore,
    table: Mutex<BindingTable>,
    captures: Mutex<Captures>,
    // Last seen value per controller number, for edge detection.
    cc_levels: Mutex<HashMap<u8, u8>>,
}

impl Resolver {
    /// Creates a resolver, loading any persisted bindings from the store.
    pub fn new(engine: Arc<TriggerEngine>, store: BindingStore) -> Resolver {
        let table = store.load();
        Resolver {
            engine,
            store,
            table: Mutex::new(table),
            captures: Mutex::new(Captures::default()),
            cc_levels: Mutex::new(HashMap::new()),
        }
    }

    /// Starts listening for the next event of the given kind and binds it
    /// to the pad. A capture already listening for that kind is replaced.
    pub fn begin_capture(&self, kind: CaptureKind, pad: Pad) {
        *self.captures.lock().slot(kind) = Capture::Listening(pad);
        debug!(pad = %pad, ?kind, "Capture started.");
    }

    /// Cancels any capture listening for the given kind.
    pub fn cancel_capture(&self, kind: CaptureKind) {
        *self.captures.lock().slot(kind) = Capture::Idle;
    }

    /// Returns the capture slot for the given kind.
    pub fn capture_state(&self, kind: CaptureKind) -> Capture {
        *self.captures.lock().slot(kind)
    }

    /// Handles one keyboard key press. While a key capture is listening the
    /// key is consumed as a binding attempt; otherwise a bound key triggers
    /// its pad at the default velocity and an unbound key is ignored.
    pub fn handle_key(&self, key: &str) -> Option<CaptureOutcome> {
        if let Some(pad) = self.captures.lock().key.take() {
            let outcome = self.commit(pad, |table| table.try_add_key(pad, key));
            return Some(outcome);
        }

        let owner = self.table.lock().owner_of_key(key);
        if let Some(pad) = owner {
            self.engine.trigger(pad, DEFAULT_VELOCITY);
        }
        None
    }

    /// Handles one raw MIDI message. Note-ons with nonzero velocity and
    /// controller changes are routed; everything else is ignored.
    pub fn handle_raw_midi(&self, raw: &[u8]) -> Option<CaptureOutcome> {
        let event = match LiveEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(err = %e, "Ignoring unparseable MIDI event.");
                return None;
            }
        };

        let LiveEvent::Midi { message, .. } = event else {
            return None;
        };
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                self.on_note(key.as_int(), vel.as_int())
            }
            MidiMessage::Controller { controller, value } => {
                self.on_controller(controller.as_int(), value.as_int())
            }
            _ => None,
        }
    }

    /// Removes one key binding.
    pub fn remove_key(&self, pad: Pad, key: &str) -> bool {
        let removed = self.table.lock().remove_key(pad, key);
        if removed {
            self.persist();
        }
        removed
    }

    /// Removes one extra note binding.
    pub fn remove_note(&self, pad: Pad, note: u8) -> bool {
        let removed = self.table.lock().remove_note(pad, note);
        if removed {
            self.persist();
        }
        removed
    }

    /// Removes one controller binding.
    pub fn remove_controller(&self, pad: Pad, controller: u8) -> bool {
        let removed = self.table.lock().remove_controller(pad, controller);
        if removed {
            self.persist();
        }
        removed
    }

    /// Removes every binding for one pad.
    pub fn clear_pad(&self, pad: Pad) {
        self.table.lock().clear(pad);
        self.persist();
    }

    /// Removes every binding for every pad.
    pub fn reset_all(&self) {
        self.table.lock().clear_all();
        self.persist();
    }

    /// Returns a snapshot of the current binding table.
    pub fn bindings(&self) -> BindingTable {
        self.table.lock().clone()
    }

    fn on_note(&self, note: u8, velocity: u8) -> Option<CaptureOutcome> {
        if let Some(pad) = self.captures.lock().note.take() {
            let outcome = self.commit(pad, |table| table.try_add_note(pad, note));
            return Some(outcome);
        }

        let owner = self.table.lock().owner_of_note(note);
        if let Some(pad) = owner {
            self.engine.trigger(pad, velocity);
        }
        None
    }

    fn on_controller(&self, controller: u8, value: u8) -> Option<CaptureOutcome> {
        // Openness always tracks the pedal controller, trigger or not.
        if controller == CC_HI_HAT_OPENNESS {
            self.engine.set_hi_hat_openness(value);
        }

        let previous = self
            .cc_levels
            .lock()
            .insert(controller, value)
            .unwrap_or(0);
        let pressed = previous < CC_PRESS_THRESHOLD && value >= CC_PRESS_THRESHOLD;
        if !pressed {
            return None;
        }

        if let Some(pad) = self.captures.lock().controller.take() {
            let outcome = self.commit(pad, |table| table.try_add_controller(pad, controller));
            return Some(outcome);
        }

        let owner = self.table.lock().owner_of_controller(controller);
        if let Some(pad) = owner {
            self.engine.trigger(pad, value);
        }
        None
    }

    fn commit<F>(&self, pad: Pad, add: F) -> CaptureOutcome
    where
        F: FnOnce(&mut BindingTable) -> AddOutcome,
    {
        let outcome = add(&mut self.table.lock());
        match outcome {
            AddOutcome::Added => {
                self.persist();
                CaptureOutcome::Committed(pad)
            }
            AddOutcome::Unchanged => CaptureOutcome::Unchanged(pad),
            AddOutcome::Conflict { owner } => CaptureOutcome::Conflicted { target: pad, owner },
        }
    }

    fn persist(&self) {
        let table = self.table.lock().clone();
        if let Err(e) = self.store.save(&table) {
            warn!(err = e.as_ref(), "Unable to persist bindings.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;

    fn resolver(dir: &tempfile::TempDir) -> (Resolver, Arc<mock::Backend>) {
        let backend = Arc::new(mock::Backend::get("mock"));
        let engine = Arc::new(TriggerEngine::new(
            backend.clone() as Arc<dyn crate::audio::Backend>,
            dir.path().to_path_buf(),
        ));
        let store = BindingStore::new(&dir.path().join("bindings.json"));
        (Resolver::new(engine, store), backend)
    }

    fn note_on(note: u8, vel: u8) -> Vec<u8> {
        vec![0x90, note, vel]
    }

    fn control_change(controller: u8, value: u8) -> Vec<u8> {
        vec![0xB0, controller, value]
    }

    fn attack_count(backend: &mock::Backend) -> usize {
        backend.commands().iter().filter(|c| c.is_attack()).count()
    }

    #[test]
    fn test_key_capture_then_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Key, Pad::Kick);
        assert_eq!(
            Some(CaptureOutcome::Committed(Pad::Kick)),
            resolver.handle_key("z")
        );
        assert_eq!(Capture::Idle, resolver.capture_state(CaptureKind::Key));
        // The capture itself does not trigger.
        assert_eq!(0, attack_count(&backend));

        assert_eq!(None, resolver.handle_key("z"));
        assert_eq!(1, attack_count(&backend));

        // Unbound keys are ignored.
        assert_eq!(None, resolver.handle_key("q"));
        assert_eq!(1, attack_count(&backend));
    }

    #[test]
    fn test_key_capture_conflict_leaves_owner() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Key, Pad::Kick);
        resolver.handle_key("z");

        resolver.begin_capture(CaptureKind::Key, Pad::Snare);
        assert_eq!(
            Some(CaptureOutcome::Conflicted {
                target: Pad::Snare,
                owner: Pad::Kick
            }),
            resolver.handle_key("z")
        );

        // The key still triggers its original owner.
        backend.clear_commands();
        resolver.handle_key("z");
        let commands = backend.commands();
        assert_eq!(1, commands.len());
    }

    #[test]
    fn test_capture_supersedes_same_kind() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Key, Pad::Kick);
        resolver.begin_capture(CaptureKind::Key, Pad::Snare);
        assert_eq!(
            Capture::Listening(Pad::Snare),
            resolver.capture_state(CaptureKind::Key)
        );
        assert_eq!(
            Some(CaptureOutcome::Committed(Pad::Snare)),
            resolver.handle_key("x")
        );
    }

    #[test]
    fn test_captures_are_independent_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Note, Pad::Crash);
        // A key press is unaffected by a listening note capture.
        assert_eq!(None, resolver.handle_key("z"));
        // The note capture consumes the next note event.
        assert_eq!(
            Some(CaptureOutcome::Committed(Pad::Crash)),
            resolver.handle_raw_midi(&note_on(60, 100))
        );
        assert_eq!(0, attack_count(&backend));
    }

    #[test]
    fn test_default_note_triggers_without_binding() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        assert_eq!(None, resolver.handle_raw_midi(&note_on(Pad::Kick.note(), 90)));
        assert_eq!(1, attack_count(&backend));

        // Unmapped notes are ignored.
        assert_eq!(None, resolver.handle_raw_midi(&note_on(100, 90)));
        assert_eq!(1, attack_count(&backend));
    }

    #[test]
    fn test_note_capture_of_foreign_default_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Note, Pad::Kick);
        assert_eq!(
            Some(CaptureOutcome::Conflicted {
                target: Pad::Kick,
                owner: Pad::Snare
            }),
            resolver.handle_raw_midi(&note_on(Pad::Snare.note(), 100))
        );
    }

    #[test]
    fn test_note_off_and_zero_velocity_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        assert_eq!(None, resolver.handle_raw_midi(&note_on(Pad::Kick.note(), 0)));
        assert_eq!(
            None,
            resolver.handle_raw_midi(&[0x80, Pad::Kick.note(), 64])
        );
        assert_eq!(0, attack_count(&backend));
    }

    #[test]
    fn test_controller_edge_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Controller, Pad::Crash);
        resolver.handle_raw_midi(&control_change(20, 127));

        // A press fires once per down edge, not once per value change.
        for value in [0u8, 40, 70, 80, 30, 90] {
            resolver.handle_raw_midi(&control_change(20, value));
        }
        assert_eq!(2, attack_count(&backend));
    }

    #[test]
    fn test_controller_capture_requires_down_edge() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _backend) = resolver(&dir);

        resolver.begin_capture(CaptureKind::Controller, Pad::Ride);
        // Below the threshold the capture keeps listening.
        assert_eq!(None, resolver.handle_raw_midi(&control_change(21, 30)));
        assert_eq!(
            Capture::Listening(Pad::Ride),
            resolver.capture_state(CaptureKind::Controller)
        );
        assert_eq!(
            Some(CaptureOutcome::Committed(Pad::Ride)),
            resolver.handle_raw_midi(&control_change(21, 100))
        );
    }

    #[test]
    fn test_cc4_routes_openness_even_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);

        resolver.handle_raw_midi(&control_change(4, 127));
        // The openness update alone produces no attack.
        assert_eq!(0, attack_count(&backend));

        // An open hat rendered afterwards reflects the new openness.
        resolver.handle_raw_midi(&note_on(Pad::HiHatOpen.note(), 100));
        let long_decay = open_hat_decay(&backend);

        backend.clear_commands();
        resolver.handle_raw_midi(&control_change(4, 0));
        resolver.handle_raw_midi(&note_on(Pad::HiHatOpen.note(), 100));
        assert!(open_hat_decay(&backend) < long_decay);
    }

    fn open_hat_decay(backend: &mock::Backend) -> f32 {
        use crate::audio::{Patch, Source};
        backend
            .commands()
            .iter()
            .find_map(|c| match c {
                mock::Command::Attack {
                    source: Source::Synth(Patch::Metallic { decay, .. }),
                    ..
                } => Some(*decay),
                _ => None,
            })
            .expect("no metallic attack recorded")
    }

    #[test]
    fn test_persistence_across_resolvers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (resolver, _backend) = resolver(&dir);
            resolver.begin_capture(CaptureKind::Key, Pad::Kick);
            resolver.handle_key("z");
        }

        let (resolver, backend) = resolver(&dir);
        resolver.handle_key("z");
        assert_eq!(1, attack_count(&backend));

        resolver.reset_all();
        backend.clear_commands();
        resolver.handle_key("z");
        assert_eq!(0, attack_count(&backend));
    }

    #[test]
    fn test_remove_binding_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _backend) = resolver(&dir);
        resolver.begin_capture(CaptureKind::Key, Pad::Kick);
        resolver.handle_key("z");
        assert!(resolver.remove_key(Pad::Kick, "z"));
        assert!(!resolver.remove_key(Pad::Kick, "z"));

        let (resolver, backend) = self::resolver(&dir);
        resolver.handle_key("z");
        assert_eq!(0, attack_count(&backend));
    }

    #[test]
    fn test_remove_note_binding_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);
        resolver.begin_capture(CaptureKind::Note, Pad::Kick);
        resolver.handle_raw_midi(&note_on(60, 100));

        assert_eq!(None, resolver.handle_raw_midi(&note_on(60, 90)));
        assert_eq!(1, attack_count(&backend));

        assert!(resolver.remove_note(Pad::Kick, 60));
        assert!(!resolver.remove_note(Pad::Kick, 60));
        backend.clear_commands();
        assert_eq!(None, resolver.handle_raw_midi(&note_on(60, 90)));
        assert_eq!(0, attack_count(&backend));

        // The removal survives a reload, and the default note still does.
        let (resolver, backend) = self::resolver(&dir);
        resolver.handle_raw_midi(&note_on(60, 90));
        assert_eq!(0, attack_count(&backend));
        resolver.handle_raw_midi(&note_on(Pad::Kick.note(), 90));
        assert_eq!(1, attack_count(&backend));
    }

    #[test]
    fn test_remove_controller_binding_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, backend) = resolver(&dir);
        resolver.begin_capture(CaptureKind::Controller, Pad::Crash);
        resolver.handle_raw_midi(&control_change(20, 127));

        resolver.handle_raw_midi(&control_change(20, 0));
        resolver.handle_raw_midi(&control_change(20, 100));
        assert_eq!(1, attack_count(&backend));

        assert!(resolver.remove_controller(Pad::Crash, 20));
        assert!(!resolver.remove_controller(Pad::Crash, 20));
        backend.clear_commands();
        resolver.handle_raw_midi(&control_change(20, 0));
        resolver.handle_raw_midi(&control_change(20, 100));
        assert_eq!(0, attack_count(&backend));

        let (resolver, backend) = self::resolver(&dir);
        resolver.handle_raw_midi(&control_change(20, 100));
        assert_eq!(0, attack_count(&backend));
    }
}
