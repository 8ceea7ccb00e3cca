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

//! Binding persistence.
//!
//! The full table is written to a single JSON file after every committed
//! mutation and read back at startup. The current schema wraps the table in
//! a versioned record; files written by older releases, which held only a
//! keys-per-note map, are migrated in place on first load.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pads::Pad;

use super::table::BindingTable;

/// The current schema version.
const SCHEMA_VERSION: u32 = 2;

#[derive(Deserialize, Serialize)]
struct Record {
    version: u32,
    table: BindingTable,
}

/// Loads and saves the binding table at a fixed path.
#[derive(Debug)]
pub struct BindingStore {
    path: PathBuf,
}

impl BindingStore {
    pub fn new(path: &Path) -> BindingStore {
        BindingStore {
            path: path.to_path_buf(),
        }
    }

    /// Reads the table from disk. A missing or malformed file yields an
    /// empty table; a legacy keys-only file is migrated and rewritten in
    /// the current schema.
    pub fn load(&self) -> BindingTable {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return BindingTable::new();
            }
            Err(e) => {
                warn!(
                    err = %e,
                    path = %self.path.display(),
                    "Unable to read bindings file, starting with empty bindings."
                );
                return BindingTable::new();
            }
        };

        if let Ok(record) = serde_json::from_str::<Record>(&contents) {
            if record.version == SCHEMA_VERSION {
                // A hand-edited file can carry duplicate identities, so the
                // load path re-establishes the uniqueness invariant.
                let table = record.table.sanitized();
                if table != record.table {
                    warn!(
                        path = %self.path.display(),
                        "Dropped conflicting entries from bindings file."
                    );
                }
                return table;
            }
            warn!(
                version = record.version,
                "Unsupported bindings schema version, starting with empty bindings."
            );
            return BindingTable::new();
        }

        // Older releases stored a bare map of note number to key list.
        if let Ok(legacy) = serde_json::from_str::<BTreeMap<u8, BTreeSet<String>>>(&contents) {
            let table = migrate_legacy(legacy);
            info!(
                path = %self.path.display(),
                "Migrated legacy bindings file to the current schema."
            );
            if let Err(e) = self.save(&table) {
                warn!(err = e.as_ref(), "Unable to rewrite migrated bindings file.");
            }
            return table;
        }

        warn!(
            path = %self.path.display(),
            "Malformed bindings file, starting with empty bindings."
        );
        BindingTable::new()
    }

    /// Writes the whole table to disk in the current schema.
    pub fn save(&self, table: &BindingTable) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let record = Record {
            version: SCHEMA_VERSION,
            table: table.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

fn migrate_legacy(legacy: BTreeMap<u8, BTreeSet<String>>) -> BindingTable {
    let mut table = BindingTable::new();
    for (note, keys) in legacy {
        let Some(pad) = Pad::from_note(note) else {
            warn!(note, "Dropping legacy binding for unknown note.");
            continue;
        };
        for key in keys {
            table.try_add_key(pad, &key);
        }
    }
    table
}
