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

//! Sample loading for the trigger engine.
//!
//! The sample set is fixed: one file per pad, addressed by the pad's logical
//! note name, decoded entirely into memory at load time for zero-latency
//! playback. Loading is all-or-nothing: if any file of the set is missing or
//! fails to decode, the whole set is treated as unavailable and the engine
//! falls back to synthesized voices.

use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::pads::Pad;

/// The loaded sample set: one mono buffer per pad, resampled to the backend
/// rate.
pub struct SampleSet {
    samples: HashMap<Pad, Arc<Vec<f32>>>,
}

impl SampleSet {
    /// Loads the full sample set from the given directory.
    pub fn load(dir: &Path, target_rate: u32) -> Result<SampleSet, Box<dyn Error>> {
        let mut samples = HashMap::new();

        for pad in Pad::ALL {
            let path = dir.join(pad.spec().sample_file);
            let data = load_file(&path, target_rate)
                .map_err(|e| format!("failed to load sample {}: {}", path.display(), e))?;
            debug!(pad = %pad, frames = data.len(), "Sample loaded");
            samples.insert(pad, Arc::new(data));
        }

        info!(
            samples = samples.len(),
            memory_kb = samples
                .values()
                .map(|s| s.len() * std::mem::size_of::<f32>())
                .sum::<usize>()
                / 1024,
            "Sample set loaded"
        );

        Ok(SampleSet { samples })
    }

    /// Returns the buffer for the given pad.
    pub fn get(&self, pad: Pad) -> Option<Arc<Vec<f32>>> {
        self.samples.get(&pad).cloned()
    }
}

impl std::fmt::Debug for SampleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSet")
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Decodes one audio file to a mono buffer at the target rate.
fn load_file(path: &Path, target_rate: u32) -> Result<Vec<f32>, Box<dyn Error>> {
    let (interleaved, channels, source_rate) = decode_file(path)?;
    let mono = downmix_mono(&interleaved, channels);
    if source_rate == target_rate {
        Ok(mono)
    } else {
        Ok(resample_linear(&mono, source_rate, target_rate))
    }
}

/// Decodes a file with symphonia, returning interleaved samples, the channel
/// count, and the source sample rate.
fn decode_file(path: &Path) -> Result<(Vec<f32>, usize, u32), Box<dyn Error>> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or("no default track in audio file")?;
    let track_id = track.id;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels = 0usize;
    let mut sample_rate = 0u32;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    channels = spec.channels.count();
                    sample_rate = spec.rate;
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            // A corrupt packet is recoverable; skip it.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if channels == 0 || samples.is_empty() {
        return Err("audio file contained no decodable audio".into());
    }

    Ok((samples, channels, sample_rate))
}

/// Averages interleaved channels down to mono.
fn downmix_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples a mono buffer using linear interpolation. Sufficient quality
/// for drum hits and one-shots.
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let source_pos = i as f64 / ratio;
        let idx = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        let s0 = samples.get(idx).copied().unwrap_or(0.0);
        let s1 = samples.get(idx + 1).copied().unwrap_or(s0);
        output.push(s0 + (s1 - s0) * frac);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_downmix_mono() {
        assert_eq!(vec![1.0, 2.0], downmix_mono(&[1.0, 2.0], 1));
        assert_eq!(vec![0.5, 0.0], downmix_mono(&[1.0, 0.0, 0.5, -0.5], 2));
    }

    #[test]
    fn test_resample_linear_lengths() {
        let samples = vec![0.0f32; 4410];
        assert_eq!(4800, resample_linear(&samples, 44100, 48000).len());
        assert_eq!(4410, resample_linear(&samples, 44100, 44100).len());
    }

    #[test]
    fn test_resample_linear_interpolates() {
        // Doubling the rate of a ramp should land halfway between samples.
        let samples = vec![0.0, 1.0];
        let out = resample_linear(&samples, 22050, 44100);
        assert_eq!(4, out.len());
        assert_eq!(0.0, out[0]);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(1.0, out[2]);
    }

    #[test]
    fn test_decode_wav_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();
        write_wav(&path, &samples, 44100)?;

        let decoded = load_file(&path, 44100)?;
        assert_eq!(samples.len(), decoded.len());
        assert!((decoded[100] - samples[100]).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_load_set_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        // An empty directory has none of the pad samples.
        assert!(SampleSet::load(dir.path(), 44100).is_err());
    }

    #[test]
    fn test_load_full_set() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let samples = vec![0.25f32; 64];
        for pad in Pad::ALL {
            write_wav(&dir.path().join(pad.spec().sample_file), &samples, 44100)?;
        }

        let set = SampleSet::load(dir.path(), 44100)?;
        for pad in Pad::ALL {
            let buffer = set.get(pad).expect("sample missing");
            assert_eq!(64, buffer.len());
        }
        Ok(())
    }
}
