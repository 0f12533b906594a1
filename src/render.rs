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
use std::{
    io::{BufWriter, Write},
    path::Path,
    time::Instant,
};

use tracing::{debug, info, span, Level};

use crate::{
    chain::SignalChain,
    envelope::{AutomationEvent, Planner},
    options::{BeatMode, Options},
    program::Program,
    util::sanitize_name,
    wav,
};

mod error;

pub use self::error::RenderError;

/// Frames rendered between planning passes.
const BLOCK_FRAMES: usize = 4096;

/// A complete offline rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl SampleBuffer {
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Encodes the buffer as a 16-bit PCM WAV stream.
    pub fn write_wav<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        wav::write_wav(writer, &self.samples, self.channels, self.sample_rate)
    }
}

/// Number of frames a rendering of the program produces, or None if there's nothing to
/// render.
fn frame_count(program: &Program, sample_rate: u32) -> Option<usize> {
    let total = program.total_duration();
    if !(total > 0.0) || sample_rate == 0 {
        return None;
    }
    let frames = (total * sample_rate as f64).round();
    if frames < 1.0 || frames > usize::MAX as f64 {
        return None;
    }
    Some(frames as usize)
}

/// Plans every automation event of an offline rendering, in order.
pub fn plan_events(program: &Program, options: &Options) -> Vec<AutomationEvent> {
    let total = program.total_duration();
    let mut events = Vec::new();
    Planner::new(options, 0.0).plan_until(program, total, total, |event| events.push(event));
    events
}

/// Renders the whole program at the options' sample rate. Volume and mute are playback
/// controls and don't apply here.
pub fn render(program: &Program, options: &Options) -> Result<SampleBuffer, RenderError> {
    let span = span!(Level::INFO, "render");
    let _enter = span.enter();

    let sample_rate = options.sample_rate();
    let frames = frame_count(program, sample_rate).ok_or(RenderError::EmptyProgram)?;
    let channels = options.beat_mode().channels();
    let sample_count = frames
        .checked_mul(channels as usize)
        .ok_or(RenderError::OutOfMemory { samples: usize::MAX })?;

    let mut samples: Vec<f32> = Vec::new();
    samples
        .try_reserve_exact(sample_count)
        .map_err(|_| RenderError::OutOfMemory {
            samples: sample_count,
        })?;
    samples.resize(sample_count, 0.0);

    info!(
        frames,
        channels,
        sample_rate,
        beat_mode = options.beat_mode().to_string(),
        "Rendering program."
    );
    let start = Instant::now();

    let total = program.total_duration();
    let mut chain = SignalChain::new(program, options, sample_rate, 0.0, 1.0);
    let mut planner = Planner::new(options, 0.0);
    let mut planning = true;
    let mut scheduled = 0usize;

    for block in samples.chunks_mut(BLOCK_FRAMES * channels as usize) {
        if planning {
            let block_end =
                (chain.frames_rendered() as usize + block.len() / channels as usize) as f64
                    / sample_rate as f64;
            planning = planner.plan_until(program, block_end, total, |event| {
                if chain.apply(&event) {
                    scheduled += 1;
                }
            });
        }
        chain.render(block);
    }

    debug!(
        scheduled,
        elapsed = format!("{:?}", start.elapsed()),
        "Rendering finished."
    );

    Ok(SampleBuffer {
        channels,
        sample_rate,
        samples,
    })
}

/// Renders the program and writes it to `path` as a WAV file. The file only appears once
/// it has been written completely.
pub fn render_to_file(
    program: &Program,
    options: &Options,
    path: &Path,
) -> Result<SampleBuffer, RenderError> {
    let buffer = render(program, options)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        buffer.write_wav(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    info!(path = %path.display(), frames = buffer.frames(), "Wrote rendering.");
    Ok(buffer)
}

/// The default export name, e.g. `bws_preset_2_isochronic.wav`.
pub fn export_file_name(name: &str, beat_mode: BeatMode) -> String {
    format!(
        "bws_{}_{}.wav",
        sanitize_name(name),
        beat_mode.export_name()
    )
}
