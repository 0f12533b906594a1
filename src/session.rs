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
    fmt,
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level, Span};

use crate::{
    audio::{self, OutputHandle},
    chain::SignalChain,
    options::Options,
    playsync::CancelHandle,
    program::Program,
    scheduler::Scheduler,
};

mod error;

pub use self::error::EngineError;

/// How long the output keeps running after a stop so the fade can finish.
pub const RELEASE_DELAY: Duration = Duration::from_millis(200);

/// Where a session is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Playing => write!(f, "playing"),
            Phase::Paused => write!(f, "paused"),
            Phase::Stopped => write!(f, "stopped"),
        }
    }
}

/// A snapshot of the session's state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    /// The chain time corresponding to elapsed = 0 for the current play segment.
    pub anchor_time: Option<f64>,
    /// Where playback stopped on the last pause.
    pub paused_elapsed: f64,
}

/// Published to subscribers as the session changes phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionEvent {
    Started { offset: f64 },
    Paused { elapsed: f64 },
    Stopped,
    /// The program ran out with `end_action: stop`. Followed by `Stopped`.
    Finished,
}

/// Everything that belongs to one play segment.
struct Playback {
    generation: u64,
    anchor: f64,
    chain: Arc<Mutex<SignalChain>>,
    cancel_handle: CancelHandle,
    output: OutputHandle,
}

struct Inner {
    phase: Phase,
    options: Options,
    paused_elapsed: f64,
    playback: Option<Playback>,
    generation: u64,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Inner {
    fn publish(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    fn elapsed(&self) -> f64 {
        match (&self.phase, &self.playback) {
            (Phase::Playing, Some(playback)) => {
                playback.chain.lock().current_time() - playback.anchor
            }
            (Phase::Paused, _) => self.paused_elapsed,
            _ => 0.0,
        }
    }
}

/// Plays a program through an audio device.
///
/// The session is a small state machine: `Idle -> Playing <-> Paused -> Stopped`. Resuming
/// from a pause is `start(paused_elapsed)`. Each play segment gets a fresh signal chain and
/// its own scheduler thread; stopping or pausing cancels the scheduler, fades the chain
/// out, and releases it in the background.
pub struct Session {
    program: Program,
    device: Arc<dyn audio::Device>,
    inner: Arc<Mutex<Inner>>,
    span: Span,
}

impl Session {
    /// Creates a new idle session.
    pub fn new(program: Program, options: Options, device: Arc<dyn audio::Device>) -> Session {
        Session {
            program,
            device,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                options,
                paused_elapsed: 0.0,
                playback: None,
                generation: 0,
                subscribers: Vec::new(),
            })),
            span: span!(Level::INFO, "session"),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn options(&self) -> Options {
        self.inner.lock().options.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    pub fn state(&self) -> SessionState {
        let inner = self.inner.lock();
        SessionState {
            phase: inner.phase,
            anchor_time: inner.playback.as_ref().map(|playback| playback.anchor),
            paused_elapsed: inner.paused_elapsed,
        }
    }

    /// Seconds into the program. Zero when idle or stopped, frozen while paused.
    pub fn elapsed(&self) -> f64 {
        self.inner.lock().elapsed()
    }

    /// The beat frequency at the current position.
    pub fn beat_now(&self) -> f64 {
        self.program.beat_at(self.elapsed())
    }

    /// Returns a channel that receives every event published from now on.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Starts playing `offset` seconds into the program. Valid from any phase but Playing.
    pub fn start(&self, offset: f64) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let offset = if offset.is_nan() { 0.0 } else { offset.max(0.0) };

        let mut inner = self.inner.lock();
        if inner.phase == Phase::Playing {
            return Err(EngineError::InvalidTransition {
                phase: inner.phase,
                operation: "start",
            });
        }

        let options = inner.options.clone();
        let chain = Arc::new(Mutex::new(SignalChain::new(
            &self.program,
            &options,
            self.device.sample_rate(),
            offset,
            0.0,
        )));
        let anchor = -offset;
        let mut scheduler = Scheduler::new(self.program.clone(), &options, anchor, offset);
        {
            let mut chain = chain.lock();
            chain.glide_output_gain(options.target_gain());
            // Fill the first window before the device starts pulling audio.
            scheduler.tick(&mut chain);
        }

        let output = self
            .device
            .open(chain.clone())
            .map_err(|e| EngineError::CouldNotStart(e.to_string()))?;

        let generation = inner.generation + 1;
        let cancel_handle = CancelHandle::new();
        let on_finish = {
            let inner = Arc::downgrade(&self.inner);
            let span = self.span.clone();
            move || Session::finish(inner, generation, span)
        };
        scheduler
            .spawn(chain.clone(), cancel_handle.clone(), on_finish)
            .map_err(|e| EngineError::CouldNotStart(e.to_string()))?;

        info!(
            offset,
            beat_mode = options.beat_mode().to_string(),
            device = output.device(),
            "Playback started."
        );
        inner.generation = generation;
        inner.playback = Some(Playback {
            generation,
            anchor,
            chain,
            cancel_handle,
            output,
        });
        inner.phase = Phase::Playing;
        inner.publish(SessionEvent::Started { offset });
        Ok(())
    }

    /// Pauses playback, remembering where it was.
    pub fn pause(&self) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let mut inner = self.inner.lock();
        if inner.phase != Phase::Playing {
            return Err(EngineError::InvalidTransition {
                phase: inner.phase,
                operation: "pause",
            });
        }

        let elapsed = inner.elapsed();
        inner.paused_elapsed = elapsed;
        if let Some(playback) = inner.playback.take() {
            Session::halt(playback);
        }
        inner.phase = Phase::Paused;
        info!(elapsed, "Playback paused.");
        inner.publish(SessionEvent::Paused { elapsed });
        Ok(())
    }

    /// Stops the session. Valid from any phase but Idle; stopping twice is harmless.
    pub fn stop(&self) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::Idle => Err(EngineError::InvalidTransition {
                phase: inner.phase,
                operation: "stop",
            }),
            Phase::Stopped => Ok(()),
            Phase::Playing | Phase::Paused => {
                if let Some(playback) = inner.playback.take() {
                    Session::halt(playback);
                }
                inner.phase = Phase::Stopped;
                inner.paused_elapsed = 0.0;
                info!("Playback stopped.");
                inner.publish(SessionEvent::Stopped);
                Ok(())
            }
        }
    }

    /// Sets the volume, clamped to [0, 1]. Takes effect immediately when playing.
    pub fn set_volume(&self, volume: f32) {
        let mut inner = self.inner.lock();
        inner.options.set_volume(volume);
        Session::apply_gain(&inner);
    }

    /// Mutes or unmutes. The volume is kept for when the session is unmuted.
    pub fn set_muted(&self, muted: bool) {
        let mut inner = self.inner.lock();
        inner.options.set_muted(muted);
        Session::apply_gain(&inner);
    }

    fn apply_gain(inner: &Inner) {
        if let Some(playback) = &inner.playback {
            let target = inner.options.target_gain();
            if !playback.chain.lock().glide_output_gain(target) {
                debug!(target, "Chain already released, ignoring gain change");
            }
        }
    }

    /// Ends a play segment. Cancellation happens first so the scheduler can't add anything
    /// after the fade starts; the output is released once the fade is done.
    fn halt(playback: Playback) {
        playback.cancel_handle.cancel();
        playback.chain.lock().fade_out();

        let generation = playback.generation;
        let spawned = thread::Builder::new()
            .name("bwsync-release".to_string())
            .spawn(move || {
                thread::sleep(RELEASE_DELAY);
                playback.chain.lock().release();
                drop(playback.output);
                debug!(generation, "Released play segment");
            });
        if let Err(e) = spawned {
            warn!(err = e.to_string(), "Unable to defer release, releasing now");
        }
    }

    /// Called from the scheduler thread once the program is over.
    fn finish(inner: Weak<Mutex<Inner>>, generation: u64, span: Span) {
        let _enter = span.enter();
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        let current = inner
            .playback
            .as_ref()
            .is_some_and(|playback| playback.generation == generation);
        if !current {
            return;
        }

        if let Some(playback) = inner.playback.take() {
            Session::halt(playback);
        }
        inner.phase = Phase::Stopped;
        inner.paused_elapsed = 0.0;
        info!("Program finished, playback stopped.");
        inner.publish(SessionEvent::Finished);
        inner.publish(SessionEvent::Stopped);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(playback) = self.inner.lock().playback.take() {
            Session::halt(playback);
        }
    }
}
