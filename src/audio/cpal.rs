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
    cell::UnsafeCell,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use crate::audio::mixer::{ActiveSource, AudioMixer};
use crate::audio::thread_priority;
use crate::{
    audio::{Device as AudioDevice, OutputHandle},
    chain::SignalChain,
    config,
    options::DEFAULT_SAMPLE_RATE,
    playsync::CancelHandle,
};

/// How long to wait for the stream to come up before giving up on the device.
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames rendered per producer iteration.
const BLOCK_FRAMES: usize = 512;

/// Lock-free single-producer single-consumer ring of samples.
struct CircularBuffer {
    /// Backing buffer
    buffer: Box<[UnsafeCell<f32>]>,
    /// Capacity (must be power of 2)
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
}

// SAFETY: one thread writes and one thread reads. The producer only touches slots outside
// [read, write) and the consumer only touches slots inside it, and the positions are
// published with release/acquire ordering.
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        // Round up to next power of 2 for efficient modulo
        let cap = capacity.next_power_of_two();
        Self {
            buffer: (0..cap).map(|_| UnsafeCell::new(0.0)).collect(),
            capacity: cap,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Get number of samples available to read
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    /// Get space available to write
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Returns number of samples actually written
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            // SAFETY: the slot is free until write_pos is published below.
            unsafe { *self.buffer[(write + offset) & mask].get() = *sample };
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Returns number of samples actually read
    fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (offset, sample) in output[..to_read].iter_mut().enumerate() {
            // SAFETY: the slot was published by the producer and isn't reused until
            // read_pos moves past it.
            *sample = unsafe { *self.buffer[(read + offset) & mask].get() };
        }

        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

/// Global atomic counter for generating unique source IDs
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The rate the stream runs at.
    sample_rate: u32,
    /// The output stream, once the device has been opened for playback.
    output_manager: Option<OutputManager>,
}

/// Owns the continuous output stream and the mixer that feeds it.
struct OutputManager {
    /// The core audio mixer
    mixer: AudioMixer,
    /// Set if the stream reported an error.
    failed: Arc<AtomicBool>,
    /// Stops both threads.
    stop: CancelHandle,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the producer thread (fills ring buffer).
    producer_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// f32 callback: read directly into the cpal buffer.
fn create_f32_callback(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.read(data);
        // Zero-fill any shortfall
        data[read..].fill(0.0);
    }
}

/// Integer callback: read from ring and convert
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut temp: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        temp.resize(data.len(), 0.0);
        let read = ring.read(&mut temp);

        // Zero-fill any shortfall
        temp[read..].fill(0.0);

        for (dst, &src) in data.iter_mut().zip(temp.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.stop.cancel();

        // Wait for threads to finish
        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl OutputManager {
    /// Starts the producer thread and the output stream, and waits for the stream to
    /// report that it is running.
    fn start(
        device: cpal::Device,
        num_channels: u16,
        sample_rate: u32,
    ) -> Result<OutputManager, Box<dyn Error>> {
        let mixer = AudioMixer::new(num_channels);
        let failed = Arc::new(AtomicBool::new(false));
        let stop = CancelHandle::new();

        // Create shared circular buffer (~100ms of audio)
        let capacity_samples = (sample_rate as usize * num_channels as usize) / 10;
        let ring = Arc::new(CircularBuffer::new(capacity_samples.max(4096)));

        let sample_format = device.default_output_config()?.sample_format();
        let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        // Start the output thread - the stream isn't Send, so it's created inside the thread.
        let output_thread = {
            let ring = ring.clone();
            let failed = failed.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("bwsync-output".to_string())
                .spawn(move || {
                    let config = cpal::StreamConfig {
                        channels: num_channels,
                        sample_rate: sample_rate,
                        buffer_size: cpal::BufferSize::Default,
                    };
                    let on_error = {
                        let failed = failed.clone();
                        move |err: cpal::StreamError| {
                            error!(err = err.to_string(), "CPAL output stream error");
                            failed.store(true, Ordering::Relaxed);
                        }
                    };

                    let stream_result = match sample_format {
                        cpal::SampleFormat::F32 => device.build_output_stream(
                            &config,
                            create_f32_callback(ring),
                            on_error,
                            None,
                        ),
                        cpal::SampleFormat::I16 => device.build_output_stream(
                            &config,
                            create_converting_callback::<i16>(ring),
                            on_error,
                            None,
                        ),
                        cpal::SampleFormat::I32 => device.build_output_stream(
                            &config,
                            create_converting_callback::<i32>(ring),
                            on_error,
                            None,
                        ),
                        other => {
                            let _ = started_tx
                                .send(Err(format!("unsupported sample format {:?}", other)));
                            return;
                        }
                    };

                    let stream = match stream_result {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = started_tx.send(Err(format!("unable to create stream: {}", e)));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = started_tx.send(Err(format!("unable to start stream: {}", e)));
                        return;
                    }
                    info!("CPAL output stream started successfully");
                    let _ = started_tx.send(Ok(()));

                    // Keep the stream alive until the manager goes away.
                    while !stop.wait_timeout(Duration::from_millis(100)) {}
                    drop(stream);
                })?
        };

        // Producer thread: render the mixer into the ring buffer.
        let producer_thread = {
            let mixer = mixer.clone();
            let producer_stop = stop.clone();
            let priority = thread_priority::producer_thread_priority();
            let rt_audio = thread_priority::rt_audio_enabled();
            let spawned = thread::Builder::new()
                .name("bwsync-producer".to_string())
                .spawn(move || {
                    thread_priority::configure_audio_thread_priority(priority, rt_audio);

                    let block_samples = BLOCK_FRAMES * num_channels as usize;
                    let mut scratch = vec![0.0f32; block_samples];

                    while !producer_stop.is_cancelled() {
                        if ring.space() >= block_samples {
                            mixer.process_into_output(&mut scratch, BLOCK_FRAMES);
                            ring.write(&scratch);
                        } else {
                            // Ring full, yield briefly
                            spin_sleep::sleep(Duration::from_micros(500));
                        }
                    }
                });
            match spawned {
                Ok(producer_thread) => producer_thread,
                Err(e) => {
                    stop.cancel();
                    let _ = output_thread.join();
                    return Err(e.into());
                }
            }
        };

        let manager = OutputManager {
            mixer,
            failed,
            stop,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        };

        match started_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(manager),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("timed out waiting for the output stream to start".into()),
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        sample_rate: DEFAULT_SAMPLE_RATE,
                        output_manager: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device and starts its output stream.
    pub fn get(config: config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        match Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(mut device) => {
                device.sample_rate = config.sample_rate();
                let output_manager = OutputManager::start(
                    device.device.clone(),
                    device.max_channels.min(2),
                    device.sample_rate,
                )?;
                info!(
                    device = device.name,
                    sample_rate = device.sample_rate,
                    "Output stream ready."
                );
                device.output_manager = Some(output_manager);
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }
}

impl AudioDevice for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, chain: Arc<Mutex<SignalChain>>) -> Result<OutputHandle, Box<dyn Error>> {
        let span = span!(Level::INFO, "play (cpal)");
        let _enter = span.enter();

        let output_manager = match &self.output_manager {
            Some(output_manager) => output_manager,
            None => return Err(format!("device {} has no output stream", self.name).into()),
        };
        if output_manager.failed.load(Ordering::Relaxed) {
            return Err(format!("output stream for {} has failed", self.name).into());
        }

        let source_id = SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        info!(device = self.name, source_id, "Connecting chain.");
        output_manager
            .mixer
            .add_source(ActiveSource::new(source_id, chain));

        let mixer = output_manager.mixer.clone();
        Ok(OutputHandle::new(&self.name, move || {
            mixer.remove_source(source_id)
        }))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_circular_buffer_capacity() {
        let ring = CircularBuffer::new(1000);
        assert_eq!(1024, ring.capacity);
        assert_eq!(0, ring.available());
        assert_eq!(1023, ring.space());
    }

    #[test]
    fn test_circular_buffer_wraps() {
        let ring = CircularBuffer::new(8);
        let samples: Vec<f32> = (0..6).map(|n| n as f32).collect();
        assert_eq!(6, ring.write(&samples));

        let mut output = [0.0; 4];
        assert_eq!(4, ring.read(&mut output));
        assert_eq!([0.0, 1.0, 2.0, 3.0], output);

        // Wraps around the end of the backing buffer.
        assert_eq!(5, ring.write(&[6.0, 7.0, 8.0, 9.0, 10.0]));
        assert_eq!(7, ring.available());
        let mut output = [0.0; 8];
        assert_eq!(7, ring.read(&mut output));
        assert_eq!(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0], &output[..7]);
    }

    #[test]
    fn test_circular_buffer_full() {
        let ring = CircularBuffer::new(4);
        assert_eq!(3, ring.write(&[1.0; 10]));
        assert_eq!(0, ring.write(&[1.0]));
        assert_eq!(0, ring.space());
    }
}
