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
//! 16-bit PCM WAV encoding.
use std::io::{self, Write};

/// Size of the RIFF/fmt/data header.
pub const HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;

/// Quantizes a float sample to 16 bits. The sample is clamped to [-1, 1], negative values
/// scale by 32768 and non-negative values by 32767, truncating toward zero.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    // NaN clamps to NaN, which `as` turns into 0.
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// Writes interleaved samples as a 16-bit PCM WAV stream.
pub fn write_wav<W: Write>(
    writer: &mut W,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> io::Result<()> {
    if channels == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a WAV stream needs at least one channel",
        ));
    }

    let data_len = samples
        .len()
        .checked_mul(BYTES_PER_SAMPLE as usize)
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "too many samples for a WAV data chunk",
            )
        })?;
    let block_align = channels * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    writer.write_all(&header)?;

    let mut chunk = Vec::with_capacity(8192);
    for block in samples.chunks(4096) {
        chunk.clear();
        for sample in block {
            chunk.extend_from_slice(&quantize(*sample).to_le_bytes());
        }
        writer.write_all(&chunk)?;
    }
    Ok(())
}

/// Encodes interleaved samples into an in-memory WAV file.
pub fn encode_wav(samples: &[f32], channels: u16, sample_rate: u32) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + samples.len() * BYTES_PER_SAMPLE as usize);
    write_wav(&mut bytes, samples, channels, sample_rate)?;
    Ok(bytes)
}
