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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use crate::{audio::OutputHandle, chain::SignalChain, playsync::CancelHandle};

/// Length of each block the mock renders.
const BLOCK: Duration = Duration::from_millis(10);

/// A mock device. Renders chains paced to the wall clock without touching any hardware.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    open_outputs: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    captured: Option<Arc<Mutex<Vec<f32>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            open_outputs: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
            captured: None,
        }
    }

    /// Gets a mock device that keeps everything it renders.
    #[cfg(test)]
    pub fn capturing(name: &str, sample_rate: u32) -> Device {
        Device {
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
            ..Device::get(name, sample_rate)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while any chain is connected.
    pub fn is_playing(&self) -> bool {
        self.open_outputs.load(Ordering::Relaxed) > 0
    }

    /// Makes subsequent opens fail, as a missing or busy device would.
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Everything rendered so far, interleaved in the chains' own layout.
    #[cfg(test)]
    pub fn captured(&self) -> Vec<f32> {
        match &self.captured {
            Some(captured) => captured.lock().clone(),
            None => Vec::new(),
        }
    }
}

impl crate::audio::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, chain: Arc<Mutex<SignalChain>>) -> Result<OutputHandle, Box<dyn Error>> {
        let span = span!(Level::INFO, "open output (mock)");
        let _enter = span.enter();

        if self.unavailable.load(Ordering::Relaxed) {
            return Err(format!("mock device {} is unavailable", self.name).into());
        }

        let channels = chain.lock().channels() as usize;
        let block_frames = (self.sample_rate as u64 * BLOCK.as_millis() as u64 / 1000).max(1);
        info!(device = self.name, channels, "Opening output.");

        let cancel_handle = CancelHandle::new();
        self.open_outputs.fetch_add(1, Ordering::Relaxed);
        {
            let cancel_handle = cancel_handle.clone();
            let open_outputs = self.open_outputs.clone();
            let captured = self.captured.clone();
            let spawned = thread::Builder::new()
                .name("bwsync-mock-output".to_string())
                .spawn(move || {
                    let mut block = vec![0.0f32; block_frames as usize * channels];
                    let start = Instant::now();
                    let mut blocks: u32 = 0;

                    while !cancel_handle.is_cancelled() {
                        chain.lock().render(&mut block);
                        if let Some(captured) = &captured {
                            captured.lock().extend_from_slice(&block);
                        }

                        blocks += 1;
                        let deadline = start + BLOCK * blocks;
                        spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
                    }

                    open_outputs.fetch_sub(1, Ordering::Relaxed);
                    debug!("Mock output stopped");
                });
            if let Err(e) = spawned {
                self.open_outputs.fetch_sub(1, Ordering::Relaxed);
                return Err(e.into());
            }
        }

        Ok(OutputHandle::new(&self.name, move || cancel_handle.cancel()))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
