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
mod audio;
mod bindings;
mod config;
mod engine;
mod metronome;
mod midi;
mod pads;
#[cfg(test)]
mod testutil;

use std::error::Error;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::debug;

use bindings::{BindingStore, CaptureKind, CaptureOutcome, Resolver};
use config::Config;
use engine::TriggerEngine;
use metronome::Metronome;
use pads::Pad;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A percussion pad instrument."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will start the pad instrument.
    Start {
        /// The path to the config file. Without one, defaults apply
        /// relative to the current directory.
        config_path: Option<String>,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Lists the pad catalog.
    Pads {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = match config_path {
                Some(config_path) => Config::load(&PathBuf::from(config_path))?,
                None => Config::default_at(Path::new(".")),
            };
            start(config).await?;
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Pads {} => {
            println!("Pads:");
            for pad in Pad::ALL {
                let spec = pad.spec();
                let choke = match spec.choke_group {
                    Some(_) => " choke: hi-hat",
                    None => "",
                };
                println!(
                    "- {:14} note {:3} ({:4}) sample {}{}",
                    pad.id(),
                    spec.note,
                    spec.note_name,
                    spec.sample_file,
                    choke
                );
            }
        }
    }

    Ok(())
}

/// Wires the engine, metronome, resolver and input devices together and
/// runs until quit.
async fn start(config: Config) -> Result<(), Box<dyn Error>> {
    let backend = audio::get_device(config.audio_device())?;
    let engine = Arc::new(TriggerEngine::new(backend.clone(), config.sample_dir()));
    let metronome = Arc::new(Metronome::new(
        backend,
        config.tempo(),
        config.beats_per_bar(),
    ));
    metronome.subscribe(Some(Box::new(|beat, bar| {
        debug!(beat, bar, "Tick.");
    })));

    let store = BindingStore::new(&config.bindings_file());
    let resolver = Arc::new(Resolver::new(engine, store));

    let midi_device = config
        .midi_device()
        .map(midi::get_device)
        .map_or(Ok(None), |result| result.map(Some))?;

    let (midi_tx, mut midi_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(256);
    if let Some(midi_device) = midi_device.as_ref() {
        midi_device.watch_events(midi_tx)?;
    }

    let midi_task = {
        let resolver = resolver.clone();
        tokio::spawn(async move {
            while let Some(raw) = midi_rx.recv().await {
                if let Some(outcome) = resolver.handle_raw_midi(&raw) {
                    print_outcome(outcome);
                }
            }
        })
    };

    let stdin_task = {
        let resolver = resolver.clone();
        let metronome = metronome.clone();
        tokio::task::spawn_blocking(move || stdin_loop(&resolver, &metronome))
    };

    stdin_task.await??;

    metronome.stop();
    if let Some(midi_device) = midi_device.as_ref() {
        midi_device.stop_watch_events();
    }
    midi_task.abort();

    Ok(())
}

/// Reads commands from stdin until quit. Lines that aren't commands are
/// treated as key presses.
fn stdin_loop(resolver: &Resolver, metronome: &Metronome) -> std::io::Result<()> {
    println!("Ready. Commands: start, stop, tempo <bpm>, bind <pad>, bind-note <pad>,");
    println!("bind-cc <pad>, unbind <pad>, cancel, reset-bindings, quit.");
    println!("Other input plays the pad bound to that key.");

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let argument = words.next();

        match (command, argument) {
            ("quit", _) | ("exit", _) => return Ok(()),
            ("start", _) => {
                if let Err(e) = metronome.start() {
                    println!("Unable to start the metronome: {}", e);
                }
            }
            ("stop", _) => metronome.stop(),
            ("tempo", Some(bpm)) => match bpm.parse::<f64>() {
                Ok(bpm) => metronome.set_tempo(bpm),
                Err(_) => println!("Not a tempo: {}", bpm),
            },
            ("bind", Some(pad)) => begin_capture(resolver, CaptureKind::Key, pad),
            ("bind-note", Some(pad)) => begin_capture(resolver, CaptureKind::Note, pad),
            ("bind-cc", Some(pad)) => begin_capture(resolver, CaptureKind::Controller, pad),
            ("unbind", Some(pad)) => match Pad::from_id(pad) {
                Some(pad) => resolver.clear_pad(pad),
                None => println!("Unknown pad: {}", pad),
            },
            ("cancel", _) => {
                resolver.cancel_capture(CaptureKind::Key);
                resolver.cancel_capture(CaptureKind::Note);
                resolver.cancel_capture(CaptureKind::Controller);
            }
            ("reset-bindings", _) => resolver.reset_all(),
            _ => {
                if let Some(outcome) = resolver.handle_key(command) {
                    print_outcome(outcome);
                }
            }
        }
    }

    Ok(())
}

fn begin_capture(resolver: &Resolver, kind: CaptureKind, pad: &str) {
    match Pad::from_id(pad) {
        Some(pad) => {
            resolver.begin_capture(kind, pad);
            println!("Listening: the next input binds to {}.", pad);
        }
        None => println!("Unknown pad: {}", pad),
    }
}

fn print_outcome(outcome: CaptureOutcome) {
    match outcome {
        CaptureOutcome::Committed(pad) => println!("Bound to {}.", pad),
        CaptureOutcome::Unchanged(pad) => println!("Already bound to {}.", pad),
        CaptureOutcome::Conflicted { target, owner } => {
            println!("Cannot bind to {}: already owned by {}.", target, owner)
        }
    }
}
