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
//! Turns a program into gain and frequency automation.
//!
//! The planner works in program time (seconds since elapsed = 0). The realtime scheduler
//! shifts the events onto the playback clock, the offline renderer uses them as they are,
//! so both consumers see exactly the same sequence.

use crate::options::{BeatMode, Options};
use crate::program::Program;

/// How far the pulse cursor moves when the beat frequency is zero or negative.
pub const ZERO_BEAT_STEP: f64 = 0.5;

/// Spacing of frequency updates in dual-channel mode.
pub const UPDATE_INTERVAL: f64 = 0.1;

/// How long each dual-channel frequency update glides for.
pub const GLIDE_TIME: f64 = 0.1;

/// What an automation event does to the signal chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventKind {
    /// The pulse gain jumps to `from` at the event time and ramps linearly to `to`,
    /// arriving at `end`.
    GainRamp { from: f32, to: f32, end: f64 },
    /// The moving oscillator glides linearly to `hz`, arriving at `end`.
    FrequencySet { hz: f64, end: f64 },
}

/// A single timed change to the signal chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationEvent {
    time: f64,
    kind: EventKind,
}

impl AutomationEvent {
    pub fn new(time: f64, kind: EventKind) -> AutomationEvent {
        AutomationEvent { time, kind }
    }

    /// When the event takes effect.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// When the event's ramp completes.
    pub fn end(&self) -> f64 {
        match self.kind {
            EventKind::GainRamp { end, .. } | EventKind::FrequencySet { end, .. } => end,
        }
    }

    /// Returns true if this event opens a pulse (the rising half).
    pub fn is_pulse_start(&self) -> bool {
        matches!(self.kind, EventKind::GainRamp { from, to, .. } if from == 0.0 && to == 1.0)
    }

    /// Moves the event by `offset` seconds, e.g. from program time onto a playback clock.
    pub fn shifted(self, offset: f64) -> AutomationEvent {
        let kind = match self.kind {
            EventKind::GainRamp { from, to, end } => EventKind::GainRamp {
                from,
                to,
                end: end + offset,
            },
            EventKind::FrequencySet { hz, end } => EventKind::FrequencySet {
                hz,
                end: end + offset,
            },
        };
        AutomationEvent {
            time: self.time + offset,
            kind,
        }
    }
}

/// Emits triangular gain pulses, one per beat period.
#[derive(Clone, Debug)]
pub struct PulsePlanner {
    next_pulse: f64,
}

/// Emits frequency glides for the moving channel on a fixed grid.
#[derive(Clone, Debug)]
pub struct GlidePlanner {
    carrier_hz: f64,
    next_update: u64,
}

/// The envelope planner, selected once per session from the beat mode.
#[derive(Clone, Debug)]
pub enum Planner {
    Pulsed(PulsePlanner),
    DualChannel(GlidePlanner),
}

impl Planner {
    /// Creates a planner whose first event falls at or after `from` (program time).
    pub fn new(options: &Options, from: f64) -> Planner {
        let from = from.max(0.0);
        match options.beat_mode() {
            BeatMode::Pulsed => Planner::Pulsed(PulsePlanner { next_pulse: from }),
            BeatMode::DualChannel => Planner::DualChannel(GlidePlanner {
                carrier_hz: options.carrier_hz(),
                // Snap to the grid, tolerating rounding noise in `from`.
                next_update: ((from / UPDATE_INTERVAL) - 1e-9).ceil().max(0.0) as u64,
            }),
        }
    }

    /// The program time of the next event the planner would consider.
    pub fn cursor(&self) -> f64 {
        match self {
            Planner::Pulsed(pulsed) => pulsed.next_pulse,
            Planner::DualChannel(glide) => glide.next_update as f64 * UPDATE_INTERVAL,
        }
    }

    /// Emits, in order, every event that starts before `until`. Events whose effect would
    /// run past `cutoff` are withheld and planning stops there for good, which is how a
    /// finite rendering ends.
    ///
    /// Returns false once the cutoff has been reached.
    pub fn plan_until<F>(
        &mut self,
        program: &Program,
        until: f64,
        cutoff: f64,
        mut emit: F,
    ) -> bool
    where
        F: FnMut(AutomationEvent),
    {
        match self {
            Planner::Pulsed(pulsed) => {
                while pulsed.next_pulse < until {
                    let start = pulsed.next_pulse;
                    let beat_hz = program.beat_at(start);
                    if beat_hz <= 0.0 {
                        pulsed.next_pulse += ZERO_BEAT_STEP;
                        if pulsed.next_pulse >= cutoff {
                            return false;
                        }
                        continue;
                    }

                    // The period is sampled at the start of each pulse.
                    let period = 1.0 / beat_hz;
                    if start + period <= start {
                        // Too short to move the cursor at this time; step past it.
                        pulsed.next_pulse += ZERO_BEAT_STEP;
                        if pulsed.next_pulse >= cutoff {
                            return false;
                        }
                        continue;
                    }
                    let width = period / 2.0;
                    let peak = start + width / 2.0;
                    let end = start + width;
                    if end > cutoff {
                        pulsed.next_pulse = f64::INFINITY;
                        return false;
                    }

                    emit(AutomationEvent::new(
                        start,
                        EventKind::GainRamp {
                            from: 0.0,
                            to: 1.0,
                            end: peak,
                        },
                    ));
                    emit(AutomationEvent::new(
                        peak,
                        EventKind::GainRamp {
                            from: 1.0,
                            to: 0.0,
                            end,
                        },
                    ));
                    pulsed.next_pulse = start + period;
                }
                true
            }
            Planner::DualChannel(glide) => loop {
                let time = glide.next_update as f64 * UPDATE_INTERVAL;
                if time >= cutoff {
                    return false;
                }
                if time >= until {
                    return true;
                }
                emit(AutomationEvent::new(
                    time,
                    EventKind::FrequencySet {
                        hz: glide.carrier_hz + program.beat_at(time),
                        end: time + GLIDE_TIME,
                    },
                ));
                glide.next_update += 1;
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::options::EndAction;
    use crate::program::{Stage, MAX_BEAT_HZ};

    const EPSILON: f64 = 1e-9;

    fn collect(planner: &mut Planner, program: &Program, until: f64) -> Vec<AutomationEvent> {
        let mut events = Vec::new();
        planner.plan_until(program, until, f64::INFINITY, |event| events.push(event));
        events
    }

    fn pulsed() -> Options {
        Options::default().with_beat_mode(BeatMode::Pulsed)
    }

    fn dual() -> Options {
        Options::default().with_beat_mode(BeatMode::DualChannel)
    }

    #[test]
    fn test_infinite_beat_terminates() {
        let program = Program::new(f64::INFINITY, vec![Stage::new(f64::INFINITY, 1.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let mut events = Vec::new();
        assert!(!planner.plan_until(&program, 1.0, 1.0, |event| events.push(event)));
        assert!(events.is_empty());
    }

    #[test]
    fn test_fastest_beat_is_bounded() {
        let program = Program::new(1e300, vec![Stage::new(1e300, 1.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 0.01);
        // 200 pulses of two events each, give or take rounding at the window edge.
        assert!((398..=402).contains(&events.len()), "{} events", events.len());
    }

    #[test]
    fn test_cursor_advances_when_period_underflows() {
        // At this distance from zero a 50us period no longer changes the cursor.
        let from = 1e15;
        let program = Program::new(MAX_BEAT_HZ, vec![]);
        let mut planner = Planner::new(&pulsed(), from);
        let events = collect(&mut planner, &program, from + 1.0);
        assert!(events.is_empty());
        assert!(planner.cursor() >= from + 1.0);
    }

    #[test]
    fn test_constant_four_hz_pulses() {
        let program = Program::new(4.0, vec![Stage::new(4.0, 60.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 10.0);

        let starts: Vec<&AutomationEvent> =
            events.iter().filter(|event| event.is_pulse_start()).collect();
        assert_eq!(40, starts.len());
        assert_eq!(80, events.len());

        for pair in events.chunks(2) {
            let (rise, fall) = (pair[0], pair[1]);
            assert!(rise.is_pulse_start());
            assert!((fall.end() - rise.time() - 0.125).abs() < EPSILON);
            assert!((rise.end() - fall.time()).abs() < EPSILON);
        }
        for window in starts.windows(2) {
            assert!((window[1].time() - window[0].time() - 0.25).abs() < EPSILON);
        }
    }

    #[test]
    fn test_events_are_ordered_and_pulses_do_not_overlap() {
        let program = Program::new(2.0, vec![Stage::new(40.0, 5.0), Stage::new(1.0, 5.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 10.0);

        for window in events.windows(2) {
            assert!(window[0].time() <= window[1].time());
            assert!(window[0].end() <= window[1].time() + EPSILON);
        }
    }

    #[test]
    fn test_period_sampled_at_pulse_start() {
        let program = Program::new(1.0, vec![Stage::new(11.0, 10.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 2.0);
        let starts: Vec<f64> = events
            .iter()
            .filter(|event| event.is_pulse_start())
            .map(|event| event.time())
            .collect();

        // 1Hz at t=0, so the second pulse starts exactly one second later.
        assert_eq!(0.0, starts[0]);
        assert!((starts[1] - 1.0).abs() < EPSILON);
        // 2Hz at t=1.
        assert!((starts[2] - 1.5).abs() < EPSILON);
    }

    #[test]
    fn test_zero_beat_skips_ahead() {
        let program = Program::new(0.0, vec![Stage::new(0.0, 2.0), Stage::new(0.0, 0.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 2.0);
        assert!(events.is_empty());
        assert!((planner.cursor() - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_beat_recovers() {
        // Silent for a second, then 2Hz.
        let program = Program::new(0.0, vec![Stage::new(0.0, 1.0), Stage::new(2.0, 0.0)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let events = collect(&mut planner, &program, 3.0);
        let first = events.first().expect("expected a pulse");
        assert!((first.time() - 1.5).abs() < EPSILON);
    }

    #[test]
    fn test_planning_resumes_where_it_left_off() {
        let program = Program::new(3.0, vec![Stage::new(9.0, 20.0)]);

        let mut whole = Planner::new(&pulsed(), 0.0);
        let expected = collect(&mut whole, &program, 10.0);

        let mut pieces = Planner::new(&pulsed(), 0.0);
        let mut actual = Vec::new();
        let mut until: f64 = 0.0;
        while until < 10.0 {
            until += 0.1;
            pieces.plan_until(&program, until.min(10.0), f64::INFINITY, |event| {
                actual.push(event)
            });
        }

        assert_eq!(expected, actual);
    }

    #[test]
    fn test_cutoff_withholds_truncated_pulse() {
        // 3Hz: pulses at 0, 1/3, 2/3; the one at 2/3 would end at 5/6 < 1 so it fits,
        // the pulse starting at 1.0 would end past the cutoff.
        let program = Program::new(3.0, vec![Stage::new(3.0, 1.1)]);
        let mut planner = Planner::new(&pulsed(), 0.0);
        let mut events = Vec::new();
        let more = planner.plan_until(&program, 10.0, 1.1, |event| events.push(event));
        assert!(!more);
        assert_eq!(3, events.iter().filter(|e| e.is_pulse_start()).count());
        assert!(events.iter().all(|event| event.end() <= 1.1));
    }

    #[test]
    fn test_dual_channel_grid() {
        let program = Program::new(10.0, vec![Stage::new(5.0, 1800.0)]);
        let mut planner = Planner::new(&dual(), 0.0);
        let events = collect(&mut planner, &program, 1.0);

        assert_eq!(10, events.len());
        for (index, event) in events.iter().enumerate() {
            let time = index as f64 * UPDATE_INTERVAL;
            assert!((event.time() - time).abs() < EPSILON);
            match event.kind() {
                EventKind::FrequencySet { hz, end } => {
                    assert!((hz - (400.0 + program.beat_at(time))).abs() < EPSILON);
                    assert!((end - time - GLIDE_TIME).abs() < EPSILON);
                }
                _ => panic!("expected a frequency update"),
            }
        }
    }

    #[test]
    fn test_dual_channel_starts_on_grid_after_offset() {
        let program = Program::new(10.0, vec![Stage::new(5.0, 60.0)]);
        let mut planner = Planner::new(&dual(), 12.34);
        assert!((planner.cursor() - 12.4).abs() < EPSILON);

        let mut planner = Planner::new(&dual(), 12.3);
        assert!((planner.cursor() - 12.3).abs() < EPSILON);

        let events = collect(&mut planner, &program, 12.45);
        assert_eq!(2, events.len());
    }

    #[test]
    fn test_dual_channel_cutoff() {
        let program = Program::new(10.0, vec![Stage::new(5.0, 1.0)]);
        let options = dual().with_end_action(EndAction::Stop);
        let mut planner = Planner::new(&options, 0.0);
        let mut events = Vec::new();
        assert!(!planner.plan_until(&program, 5.0, 1.0, |event| events.push(event)));
        assert_eq!(10, events.len());
    }

    #[test]
    fn test_shifted() {
        let event = AutomationEvent::new(
            1.0,
            EventKind::GainRamp {
                from: 0.0,
                to: 1.0,
                end: 1.5,
            },
        )
        .shifted(10.0);
        assert_eq!(11.0, event.time());
        assert_eq!(11.5, event.end());
    }
}
