// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definitions and interpolation.
//!
//! A curve maps a temperature to a fan percentage (0-100). Points are
//! linearly interpolated between defined thresholds and clamped outside
//! them. [`pwm_value`] then maps the percentage onto a fan's duty range.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single point on a fan curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct CurvePoint {
    /// Temperature in degrees Celsius
    pub temp_c: f64,
    /// Fan speed, 0-100
    pub percent: f64,
}

impl CurvePoint {
    pub const fn new(temp_c: f64, percent: f64) -> Self {
        Self { temp_c, percent }
    }
}

impl From<(f64, f64)> for CurvePoint {
    fn from((temp_c, percent): (f64, f64)) -> Self {
        Self { temp_c, percent }
    }
}

impl From<CurvePoint> for (f64, f64) {
    fn from(p: CurvePoint) -> Self {
        (p.temp_c, p.percent)
    }
}

/// An immutable, validated fan curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    name: String,
    points: Vec<CurvePoint>,
    hysteresis: f64,
    response_time: Duration,
}

impl Curve {
    /// Build a curve from points already in ascending temperature order.
    ///
    /// Rejects empty point lists, unsorted or duplicate temperatures,
    /// percentages outside 0-100 and negative hysteresis.
    pub fn new(
        name: &str,
        points: Vec<CurvePoint>,
        hysteresis: f64,
        response_time: Duration,
    ) -> Result<Self> {
        let entry = format!("curve '{name}'");

        if points.is_empty() {
            return Err(Error::config(entry, "curve must have at least 1 point"));
        }
        for (i, p) in points.iter().enumerate() {
            if !p.temp_c.is_finite() || !p.percent.is_finite() {
                return Err(Error::config(entry, format!("point {i} is not finite")));
            }
            if !(0.0..=100.0).contains(&p.percent) {
                return Err(Error::config(
                    entry,
                    format!("point {i} has fan percent {} outside 0-100", p.percent),
                ));
            }
            if i > 0 && p.temp_c <= points[i - 1].temp_c {
                return Err(Error::config(
                    entry,
                    format!("points must have strictly increasing temperatures (point {i})"),
                ));
            }
        }
        if !hysteresis.is_finite() || hysteresis < 0.0 {
            return Err(Error::config(entry, "hysteresis must be >= 0"));
        }

        Ok(Self {
            name: name.to_string(),
            points,
            hysteresis,
            response_time,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    pub fn response_time(&self) -> Duration {
        self.response_time
    }

    /// Fan percentage for a temperature.
    ///
    /// - At or below the first point: the first point's percent
    /// - At or above the last point: the last point's percent
    /// - Exactly on a point: that point's percent, without interpolation
    /// - Between two points: linear interpolation
    pub fn evaluate(&self, temp_c: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if temp_c <= first.temp_c {
            return first.percent;
        }
        // NaN fails every comparison; treat it as hot.
        if temp_c >= last.temp_c || temp_c.is_nan() {
            return last.percent;
        }

        match self
            .points
            .binary_search_by(|p| p.temp_c.total_cmp(&temp_c))
        {
            Ok(i) => self.points[i].percent,
            // `i` is the first point above temp_c; the clamps above
            // guarantee 0 < i < len.
            Err(i) => interpolate(&self.points[i - 1], &self.points[i], temp_c),
        }
    }
}

fn interpolate(start: &CurvePoint, end: &CurvePoint, temp_c: f64) -> f64 {
    start.percent
        + (temp_c - start.temp_c) * (end.percent - start.percent) / (end.temp_c - start.temp_c)
}

/// Map a fan percentage onto `[min_pwm, max_pwm]`.
///
/// With `zero_rpm` a percentage of exactly 0 stops the fan (duty 0)
/// regardless of `min_pwm`. Rounds half up. Callers guarantee
/// `min_pwm <= max_pwm` and a percentage within 0-100.
pub fn pwm_value(percent: f64, min_pwm: u8, max_pwm: u8, zero_rpm: bool) -> u8 {
    if zero_rpm && percent == 0.0 {
        return 0;
    }
    let range = f64::from(max_pwm) - f64::from(min_pwm);
    let step = (percent / 100.0 * range + 0.5).floor();
    (f64::from(min_pwm) + step).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_curve() -> Curve {
        Curve::new(
            "scenario",
            vec![
                CurvePoint::new(20.0, 0.0),
                CurvePoint::new(40.0, 30.0),
                CurvePoint::new(60.0, 70.0),
                CurvePoint::new(80.0, 100.0),
            ],
            0.0,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn test_clamps_below_and_above_range() {
        let curve = scenario_curve();
        for t in [-40.0, 0.0, 19.99, 20.0] {
            assert_eq!(curve.evaluate(t), 0.0);
        }
        for t in [80.0, 80.01, 120.0] {
            assert_eq!(curve.evaluate(t), 100.0);
        }
    }

    #[test]
    fn test_exact_points_have_no_drift() {
        let curve = Curve::new(
            "odd",
            vec![
                CurvePoint::new(33.3, 12.7),
                CurvePoint::new(41.1, 33.3),
                CurvePoint::new(57.7, 61.9),
                CurvePoint::new(71.9, 88.1),
            ],
            0.0,
            Duration::ZERO,
        )
        .unwrap();
        for p in curve.points() {
            assert_eq!(curve.evaluate(p.temp_c), p.percent);
        }
    }

    #[test]
    fn test_interpolation_midpoint() {
        assert_eq!(scenario_curve().evaluate(50.0), 50.0);
        assert_eq!(scenario_curve().evaluate(30.0), 15.0);
    }

    #[test]
    fn test_interpolation_is_monotonic() {
        let curve = scenario_curve();
        let mut prev = curve.evaluate(0.0);
        let mut t = 0.0;
        while t <= 100.0 {
            let v = curve.evaluate(t);
            assert!(v >= prev, "evaluate({t}) = {v} < {prev}");
            prev = v;
            t += 0.25;
        }
    }

    #[test]
    fn test_single_point_curve() {
        let curve =
            Curve::new("flat", vec![CurvePoint::new(50.0, 40.0)], 0.0, Duration::ZERO).unwrap();
        assert_eq!(curve.evaluate(10.0), 40.0);
        assert_eq!(curve.evaluate(50.0), 40.0);
        assert_eq!(curve.evaluate(90.0), 40.0);
    }

    #[test]
    fn test_validation_rejects_bad_curves() {
        let z = Duration::ZERO;
        assert!(Curve::new("empty", vec![], 0.0, z).is_err());
        assert!(
            Curve::new(
                "dup",
                vec![CurvePoint::new(40.0, 10.0), CurvePoint::new(40.0, 20.0)],
                0.0,
                z
            )
            .is_err()
        );
        assert!(
            Curve::new(
                "unsorted",
                vec![CurvePoint::new(60.0, 10.0), CurvePoint::new(40.0, 20.0)],
                0.0,
                z
            )
            .is_err()
        );
        assert!(Curve::new("pct", vec![CurvePoint::new(40.0, 101.0)], 0.0, z).is_err());
        assert!(Curve::new("hyst", vec![CurvePoint::new(40.0, 10.0)], -1.0, z).is_err());
    }

    #[test]
    fn test_pwm_value_reference_points() {
        assert_eq!(pwm_value(0.0, 50, 200, true), 0);
        assert_eq!(pwm_value(100.0, 50, 200, true), 200);
        assert_eq!(pwm_value(100.0, 50, 200, false), 200);
        assert_eq!(pwm_value(50.0, 0, 100, false), 50);
        assert_eq!(pwm_value(0.0, 50, 200, false), 50);
    }

    #[test]
    fn test_pwm_value_rounds_half_up() {
        // 50% of 205 = 102.5
        assert_eq!(pwm_value(50.0, 50, 255, false), 153);
        // 10% of 255 = 25.5
        assert_eq!(pwm_value(10.0, 0, 255, false), 26);
    }

    #[test]
    fn test_end_to_end_scenarios() {
        let curve = scenario_curve();
        assert_eq!(pwm_value(curve.evaluate(50.0), 50, 255, false), 153);
        assert_eq!(pwm_value(curve.evaluate(10.0), 50, 255, false), 50);
        assert_eq!(pwm_value(curve.evaluate(20.0), 50, 255, true), 0);
    }

    #[test]
    fn test_points_deserialize_from_pairs() {
        #[derive(Deserialize)]
        struct Wrapper {
            points: Vec<CurvePoint>,
        }
        let w: Wrapper = toml::from_str("points = [[20, 0], [40.5, 30]]").unwrap();
        assert_eq!(
            w.points,
            vec![CurvePoint::new(20.0, 0.0), CurvePoint::new(40.5, 30.0)]
        );
    }
}
