// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! A controlled fan: smoothing, debounce, curve evaluation and PWM writes.

use crate::control::PwmControl;
use crate::curve::{Curve, pwm_value};
use crate::error::Result;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Debounce state: the temperature the current command is based on, and
/// when a candidate change was first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Debounce {
    last_accepted: Option<f64>,
    pending_since: Option<Instant>,
}

impl Debounce {
    /// Offer a reading. Returns `true` when it is accepted and the curve
    /// should be re-evaluated.
    ///
    /// The very first reading is always accepted. After that a reading
    /// within `hysteresis` of the last accepted value (or equal to it) is
    /// dropped and cancels any pending change. With a non-zero
    /// `response_time` a change must persist that long before acceptance.
    pub fn offer(
        &mut self,
        value: f64,
        now: Instant,
        hysteresis: f64,
        response_time: Duration,
    ) -> bool {
        let Some(last) = self.last_accepted else {
            self.accept(value);
            return true;
        };

        let delta = (value - last).abs();
        if delta == 0.0 || (hysteresis > 0.0 && delta < hysteresis) {
            self.pending_since = None;
            return false;
        }

        if !response_time.is_zero() {
            match self.pending_since {
                None => {
                    self.pending_since = Some(now);
                    return false;
                }
                Some(since) if now.saturating_duration_since(since) < response_time => {
                    return false;
                }
                Some(_) => {}
            }
        }

        self.accept(value);
        true
    }

    fn accept(&mut self, value: f64) {
        self.last_accepted = Some(value);
        self.pending_since = None;
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }
}

/// Fixed-window moving average, pre-filled with the first sample.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    samples: VecDeque<f64>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, value: f64) -> f64 {
        if self.samples.is_empty() {
            self.samples.extend(std::iter::repeat_n(value, self.window));
        } else {
            self.samples.pop_front();
            self.samples.push_back(value);
        }
        self.samples.iter().sum::<f64>() / self.window as f64
    }
}

/// Static per-fan settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmRange {
    pub min_pwm: u8,
    pub max_pwm: u8,
    pub zero_rpm: bool,
}

pub struct Fan {
    name: String,
    /// Pool index of the driving sensor
    sensor: usize,
    /// Index of the curve
    curve: usize,
    range: PwmRange,
    control: Box<dyn PwmControl>,
    smoothing: MovingAverage,
    debounce: Debounce,
    temperature: Option<f64>,
    fan_percent: Option<f64>,
    /// Duty value derived from the last accepted temperature
    target: Option<u8>,
    /// Duty value last written successfully
    pwm_value: Option<u8>,
}

impl Fan {
    pub fn new(
        name: impl Into<String>,
        sensor: usize,
        curve: usize,
        range: PwmRange,
        average: usize,
        control: Box<dyn PwmControl>,
    ) -> Self {
        Self {
            name: name.into(),
            sensor,
            curve,
            range,
            control,
            smoothing: MovingAverage::new(average),
            debounce: Debounce::default(),
            temperature: None,
            fan_percent: None,
            target: None,
            pwm_value: None,
        }
    }

    /// Feed this tick's reading. Returns the duty value written, if any.
    ///
    /// Nothing is written when the debounce holds the reading back or the
    /// resulting duty value equals the one already committed. A failed
    /// write is retried on the next tick.
    pub fn update(&mut self, reading: f64, curve: &Curve, now: Instant) -> Result<Option<u8>> {
        let smoothed = self.smoothing.push(reading);
        self.temperature = Some(smoothed);

        if self
            .debounce
            .offer(smoothed, now, curve.hysteresis(), curve.response_time())
        {
            let percent = curve.evaluate(smoothed);
            self.fan_percent = Some(percent);
            self.target = Some(pwm_value(
                percent,
                self.range.min_pwm,
                self.range.max_pwm,
                self.range.zero_rpm,
            ));
        }

        match self.target {
            Some(target) if self.pwm_value != Some(target) => {
                self.control.write_pwm(target)?;
                self.pwm_value = Some(target);
                Ok(Some(target))
            }
            _ => Ok(None),
        }
    }

    pub fn engage(&mut self) -> Result<()> {
        self.control.engage()
    }

    pub fn restore(&mut self) -> Result<()> {
        self.control.restore()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sensor(&self) -> usize {
        self.sensor
    }

    pub fn curve(&self) -> usize {
        self.curve
    }

    /// Smoothed temperature fed to the debounce on the latest update.
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn fan_percent(&self) -> Option<f64> {
        self.fan_percent
    }

    pub fn pwm_value(&self) -> Option<u8> {
        self.pwm_value
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }
}

impl std::fmt::Debug for Fan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fan")
            .field("name", &self.name)
            .field("control", &self.control.describe())
            .field("sensor", &self.sensor)
            .field("curve", &self.curve)
            .field("range", &self.range)
            .field("debounce", &self.debounce)
            .field("pwm_value", &self.pwm_value)
            .finish()
    }
}
