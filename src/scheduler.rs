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
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info, span, trace, Level};

use crate::{
    chain::SignalChain,
    envelope::Planner,
    options::{EndAction, Options},
    playsync::CancelHandle,
    program::Program,
};

/// How far ahead of the chain's clock events are kept scheduled.
pub const LOOK_AHEAD: f64 = 0.2;

/// How often the scheduler tops up the look-ahead window.
pub const CADENCE: Duration = Duration::from_millis(100);

/// The result of one scheduler invocation.
#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    /// The window was topped up with this many events.
    Scheduled(usize),
    /// The program is over and the session should stop.
    Finished,
}

/// Keeps a live signal chain supplied with automation, a little ahead of its clock.
pub struct Scheduler {
    program: Program,
    planner: Planner,
    anchor: f64,
    end_action: EndAction,
    total_duration: f64,
}

impl Scheduler {
    /// Creates a scheduler for a play segment that started `offset` seconds into the
    /// program, at chain time `anchor + offset`.
    pub fn new(program: Program, options: &Options, anchor: f64, offset: f64) -> Scheduler {
        let total_duration = program.total_duration();
        Scheduler {
            program,
            planner: Planner::new(options, offset),
            anchor,
            end_action: options.end_action(),
            total_duration,
        }
    }

    /// The chain time that corresponds to elapsed = 0.
    pub fn anchor(&self) -> f64 {
        self.anchor
    }

    /// Runs one invocation against the chain: either reports the end of the program or
    /// schedules every event that starts within the look-ahead window.
    pub fn tick(&mut self, chain: &mut SignalChain) -> Tick {
        let elapsed = chain.current_time() - self.anchor;

        if self.end_action == EndAction::Stop && elapsed > self.total_duration {
            return Tick::Finished;
        }

        let anchor = self.anchor;
        let mut scheduled = 0;
        self.planner.plan_until(
            &self.program,
            elapsed + LOOK_AHEAD,
            f64::INFINITY,
            |event| {
                if chain.apply(&event.shifted(anchor)) {
                    scheduled += 1;
                }
            },
        );
        Tick::Scheduled(scheduled)
    }

    /// Runs the scheduler on its own thread, invoking it every [CADENCE] until the cancel
    /// handle fires or the program finishes. `on_finish` runs on the scheduler thread after
    /// it has let go of the chain.
    pub fn spawn<F>(
        mut self,
        chain: Arc<Mutex<SignalChain>>,
        cancel_handle: CancelHandle,
        on_finish: F,
    ) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name("bwsync-scheduler".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "scheduler");
                let _enter = span.enter();

                loop {
                    {
                        let mut chain = chain.lock();
                        // Checked under the chain lock so nothing lands after a stop.
                        if cancel_handle.is_cancelled() {
                            debug!("Scheduler cancelled");
                            return;
                        }

                        match self.tick(&mut chain) {
                            Tick::Scheduled(count) => {
                                trace!(count, time = chain.current_time(), "Scheduled events")
                            }
                            Tick::Finished => {
                                drop(chain);
                                info!("Program finished.");
                                on_finish();
                                return;
                            }
                        }
                    }

                    if cancel_handle.wait_timeout(CADENCE) {
                        debug!("Scheduler cancelled");
                        return;
                    }
                }
            })
    }
}
