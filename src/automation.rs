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
use std::collections::VecDeque;

/// A scheduled change to a parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ParamEvent {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },
    /// Ramp linearly from the previous event to `value`, arriving at `time`.
    LinearRamp { value: f32, time: f64 },
    /// Approach `target` exponentially from `time` onwards.
    SetTarget {
        target: f32,
        time: f64,
        time_constant: f64,
    },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match self {
            ParamEvent::SetValue { time, .. }
            | ParamEvent::LinearRamp { time, .. }
            | ParamEvent::SetTarget { time, .. } => *time,
        }
    }
}

/// The shape the parameter follows after the most recently consumed event.
#[derive(Clone, Copy, Debug)]
enum Curve {
    Hold(f32),
    Approach {
        target: f32,
        start: f32,
        time: f64,
        time_constant: f64,
    },
}

impl Curve {
    fn value_at(&self, t: f64) -> f32 {
        match *self {
            Curve::Hold(value) => value,
            Curve::Approach {
                target,
                start,
                time,
                time_constant,
            } => {
                let decay = (-(t - time).max(0.0) / time_constant).exp() as f32;
                target + (start - target) * decay
            }
        }
    }
}

/// A time-indexed parameter timeline, such as a gain or an oscillator frequency.
///
/// Events are kept sorted by time. Sampling must move forward in time: events are
/// discarded once they are in the past, so the queue only ever holds what is still to
/// come.
#[derive(Clone, Debug)]
pub struct Param {
    curve: Curve,
    last_event_time: f64,
    events: VecDeque<ParamEvent>,
}

impl Param {
    /// Creates a parameter holding `value`.
    pub fn new(value: f32) -> Param {
        Param {
            curve: Curve::Hold(value),
            last_event_time: 0.0,
            events: VecDeque::new(),
        }
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::SetValue { value, time });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::LinearRamp { value, time });
    }

    /// Starts an exponential approach towards `target` at `time`. A time constant of zero
    /// jumps straight to the target.
    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        if time_constant <= 0.0 {
            self.set_value_at_time(target, time);
            return;
        }
        self.insert(ParamEvent::SetTarget {
            target,
            time,
            time_constant,
        });
    }

    /// Drops every event scheduled at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|event| event.time() < from);
    }

    /// Number of events still waiting to take effect.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Returns the value at `t`, consuming the events that have started by then.
    pub fn sample(&mut self, t: f64) -> f32 {
        while let Some(event) = self.events.front().copied() {
            if event.time() > t {
                break;
            }
            self.consume(event);
            self.events.pop_front();
        }

        match self.events.front() {
            Some(ParamEvent::LinearRamp { value, time }) => {
                let start_time = self.last_event_time;
                let start = self.curve.value_at(start_time);
                if *time <= start_time {
                    return *value;
                }
                let k = ((t - start_time) / (time - start_time)).clamp(0.0, 1.0) as f32;
                start + (value - start) * k
            }
            _ => self.curve.value_at(t),
        }
    }

    fn consume(&mut self, event: ParamEvent) {
        self.curve = match event {
            ParamEvent::SetValue { value, .. } | ParamEvent::LinearRamp { value, .. } => {
                Curve::Hold(value)
            }
            ParamEvent::SetTarget {
                target,
                time,
                time_constant,
            } => Curve::Approach {
                target,
                start: self.curve.value_at(time),
                time,
                time_constant,
            },
        };
        self.last_event_time = event.time();
    }

    fn insert(&mut self, event: ParamEvent) {
        // Events at the same instant apply in the order they were scheduled.
        let index = self
            .events
            .partition_point(|queued| queued.time() <= event.time());
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn assert_near(expected: f32, actual: f32) {
        assert!(
            (expected - actual).abs() <= EPSILON * expected.abs().max(1.0),
            "expected {} but got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_holds_initial_value() {
        let mut param = Param::new(0.5);
        assert_near(0.5, param.sample(0.0));
        assert_near(0.5, param.sample(100.0));
    }

    #[test]
    fn test_triangle() {
        let mut param = Param::new(0.0);
        param.set_value_at_time(0.0, 0.0);
        param.linear_ramp_to_value_at_time(1.0, 0.5);
        param.set_value_at_time(1.0, 0.5);
        param.linear_ramp_to_value_at_time(0.0, 1.0);

        assert_near(0.0, param.sample(0.0));
        assert_near(0.5, param.sample(0.25));
        assert_near(1.0, param.sample(0.5));
        assert_near(0.5, param.sample(0.75));
        assert_near(0.0, param.sample(1.0));
        assert_near(0.0, param.sample(2.0));
        assert_eq!(0, param.pending());
    }

    #[test]
    fn test_ramp_starts_at_previous_event() {
        let mut param = Param::new(100.0);
        param.set_value_at_time(100.0, 1.0);
        param.linear_ramp_to_value_at_time(200.0, 2.0);

        assert_near(100.0, param.sample(0.5));
        assert_near(100.0, param.sample(1.0));
        assert_near(150.0, param.sample(1.5));
        assert_near(200.0, param.sample(3.0));
    }

    #[test]
    fn test_chained_ramps() {
        let mut param = Param::new(400.0);
        param.linear_ramp_to_value_at_time(410.0, 0.1);
        param.linear_ramp_to_value_at_time(420.0, 0.2);

        assert_near(405.0, param.sample(0.05));
        assert_near(410.0, param.sample(0.1));
        assert_near(415.0, param.sample(0.15));
        assert_near(420.0, param.sample(0.25));
    }

    #[test]
    fn test_set_target_approaches_exponentially() {
        let mut param = Param::new(0.0);
        param.set_target_at_time(1.0, 1.0, 0.05);

        assert_near(0.0, param.sample(1.0));
        let one_tau = param.sample(1.05);
        assert_near(1.0 - (-1.0f32).exp(), one_tau);
        assert!(param.sample(2.0) > 0.9999);
    }

    #[test]
    fn test_set_target_zero_time_constant() {
        let mut param = Param::new(0.0);
        param.set_target_at_time(0.7, 0.5, 0.0);
        assert_near(0.0, param.sample(0.25));
        assert_near(0.7, param.sample(0.5));
    }

    #[test]
    fn test_out_of_order_scheduling_is_sorted() {
        let mut param = Param::new(0.0);
        param.set_value_at_time(3.0, 3.0);
        param.set_value_at_time(1.0, 1.0);
        param.set_value_at_time(2.0, 2.0);

        assert_near(1.0, param.sample(1.5));
        assert_near(2.0, param.sample(2.5));
        assert_near(3.0, param.sample(3.5));
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut param = Param::new(0.0);
        param.set_value_at_time(1.0, 1.0);
        param.set_value_at_time(2.0, 2.0);
        param.set_value_at_time(3.0, 3.0);
        param.cancel_scheduled_values(2.0);

        assert_eq!(1, param.pending());
        assert_near(1.0, param.sample(5.0));
    }
}
