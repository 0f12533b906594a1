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
use std::{any::Any, error::Error, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::chain::SignalChain;
use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;
mod thread_priority;

pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// The rate chains opened on this device must render at.
    fn sample_rate(&self) -> u32;

    /// Starts pulling audio from the chain. The chain keeps rendering to the device until
    /// the returned handle is dropped.
    fn open(&self, chain: Arc<Mutex<SignalChain>>) -> Result<OutputHandle, Box<dyn Error>>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Keeps a chain connected to a device. Dropping the handle disconnects it.
pub struct OutputHandle {
    device: String,
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl OutputHandle {
    pub(crate) fn new<F>(device: &str, close: F) -> OutputHandle
    where
        F: FnOnce() + Send + 'static,
    {
        OutputHandle {
            device: device.to_string(),
            close: Some(Box::new(close)),
        }
    }

    /// The name of the device the chain is connected to.
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            debug!(device = self.device, "Closing output");
            close();
        }
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name.
pub fn get_device(config: config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config.sample_rate())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
