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
// Mixes live signal chains into a device's output layout. Used by the cpal backend.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chain::SignalChain;

/// Mixes any number of signal chains into interleaved output frames.
#[derive(Clone)]
pub struct AudioMixer {
    /// Chains currently feeding the output.
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Number of output channels
    num_channels: u16,
}

/// A chain registered with the mixer.
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// The chain to render from.
    pub chain: Arc<Mutex<SignalChain>>,
    /// Precomputed channel mappings: chain channel index -> output channel indices.
    channel_mappings: Vec<Vec<usize>>,
    /// Reused render buffer.
    scratch: Vec<f32>,
}

impl ActiveSource {
    pub fn new(id: u64, chain: Arc<Mutex<SignalChain>>) -> ActiveSource {
        ActiveSource {
            id,
            chain,
            channel_mappings: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16) -> Self {
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            num_channels,
        }
    }

    /// A mono chain goes to both of the first two outputs, a stereo chain goes left and
    /// right. Outputs the device doesn't have are dropped.
    fn precompute_channel_mappings(source_channels: u16, num_channels: u16) -> Vec<Vec<usize>> {
        let wanted: Vec<Vec<usize>> = match source_channels {
            1 => vec![vec![0, 1]],
            _ => (0..source_channels as usize).map(|index| vec![index]).collect(),
        };

        wanted
            .into_iter()
            .map(|outputs| {
                outputs
                    .into_iter()
                    .filter(|output| *output < num_channels as usize)
                    .collect()
            })
            .collect()
    }

    /// Adds a new audio source to the mixer
    pub fn add_source(&self, mut source: ActiveSource) {
        let source_channels = source.chain.lock().channels();
        source.channel_mappings =
            Self::precompute_channel_mappings(source_channels, self.num_channels);
        self.active_sources.lock().push(source);
    }

    /// Removes a source by ID.
    pub fn remove_source(&self, source_id: u64) {
        self.active_sources
            .lock()
            .retain(|source| source.id != source_id);
    }

    /// Number of sources currently being mixed.
    pub fn source_count(&self) -> usize {
        self.active_sources.lock().len()
    }

    /// Renders `num_frames` frames from every source and mixes them into `output`.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let num_channels = self.num_channels as usize;
        let output = &mut output[..num_frames * num_channels];
        output.fill(0.0);

        let mut sources = self.active_sources.lock();
        for source in sources.iter_mut() {
            let source_channels = source.channel_mappings.len();
            source.scratch.resize(num_frames * source_channels, 0.0);
            source.chain.lock().render(&mut source.scratch);

            for (frame, out) in source
                .scratch
                .chunks_exact(source_channels)
                .zip(output.chunks_exact_mut(num_channels))
            {
                for (sample, targets) in frame.iter().zip(source.channel_mappings.iter()) {
                    for target in targets {
                        out[*target] += *sample;
                    }
                }
            }
        }
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BeatMode, Options};
    use crate::program::{Program, Stage};

    fn chain(beat_mode: BeatMode) -> Arc<Mutex<SignalChain>> {
        let program = Program::new(4.0, vec![Stage::new(4.0, 10.0)]);
        let options = Options::default().with_beat_mode(beat_mode);
        Arc::new(Mutex::new(SignalChain::new(
            &program, &options, 8000, 0.0, 1.0,
        )))
    }

    #[test]
    fn test_channel_mappings() {
        assert_eq!(
            vec![vec![0, 1]],
            AudioMixer::precompute_channel_mappings(1, 2)
        );
        assert_eq!(
            vec![vec![0], vec![1]],
            AudioMixer::precompute_channel_mappings(2, 8)
        );
        assert_eq!(
            vec![vec![0], vec![]],
            AudioMixer::precompute_channel_mappings(2, 1)
        );
    }

    #[test]
    fn test_stereo_chain_mixing() {
        let mixer = AudioMixer::new(2);
        let source = chain(BeatMode::DualChannel);
        mixer.add_source(ActiveSource::new(1, source.clone()));

        let frames = mixer.process_frames(100);
        assert_eq!(200, frames.len());
        assert_eq!(100, source.lock().frames_rendered());

        let mut expected = vec![0.0; 200];
        chain(BeatMode::DualChannel).lock().render(&mut expected);
        assert_eq!(expected, frames);
    }

    #[test]
    fn test_mono_chain_goes_to_both_sides() {
        let mixer = AudioMixer::new(2);
        let source = chain(BeatMode::Pulsed);
        source.lock().glide_output_gain(1.0);
        mixer.add_source(ActiveSource::new(1, source));

        let frames = mixer.process_frames(100);
        for frame in frames.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(2);
        mixer.add_source(ActiveSource::new(1, chain(BeatMode::DualChannel)));
        mixer.add_source(ActiveSource::new(2, chain(BeatMode::DualChannel)));
        assert_eq!(2, mixer.source_count());

        let mut single = vec![0.0; 20];
        chain(BeatMode::DualChannel).lock().render(&mut single);

        let frames = mixer.process_frames(10);
        for (mixed, single) in frames.iter().zip(single.iter()) {
            assert!((mixed - 2.0 * single).abs() < 1e-6);
        }
    }

    #[test]
    fn test_remove_source() {
        let mixer = AudioMixer::new(2);
        let source = chain(BeatMode::DualChannel);
        mixer.add_source(ActiveSource::new(7, source.clone()));
        mixer.remove_source(7);
        assert_eq!(0, mixer.source_count());

        let frames = mixer.process_frames(10);
        assert!(frames.iter().all(|sample| *sample == 0.0));
        assert_eq!(0, source.lock().frames_rendered());
    }
}
