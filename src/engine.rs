// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control engine.
//!
//! Lifecycle: [`Engine::initialize`] resolves every sensor and fan
//! (Ready), [`Engine::start`] switches fans to manual control (Running),
//! [`Engine::tick`] runs one update pass, and [`Engine::shutdown`] hands
//! every fan back to its original mode and releases all handles.
//!
//! Dropping a Running engine without calling `shutdown` performs the same
//! best-effort restoration, so an early return or a panic never leaves a
//! fan in manual mode.

use crate::config::{Config, FanConfig, SensorConfig};
use crate::control::{PwmControl, SysfsPwm};
use crate::curve::Curve;
use crate::error::{Error, Result};
use crate::fan::{Fan, PwmRange};
use crate::hwmon::{Device, Hwmon};
use crate::sensor::{self, MaxInput, Sensor};
use crate::status::{FanStatus, SensorStatus, Snapshot};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Running,
    ShuttingDown,
    Destroyed,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::ShuttingDown => "shutting down",
            EngineState::Destroyed => "destroyed",
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    state: EngineState,
    sensors: Vec<Sensor>,
    curves: Vec<Curve>,
    fans: Vec<Fan>,
    ticks: u64,
}

impl Engine {
    /// Resolve all sources, sensors and fans against `hwmon`, using sysfs
    /// PWM attributes for the fans.
    ///
    /// Nothing is written to hardware. On failure every handle opened so
    /// far is closed before the error is returned.
    pub fn initialize(config: &Config, hwmon: &Hwmon) -> Result<Self> {
        Self::initialize_with(config, hwmon, |device, fan| {
            let pwm = SysfsPwm::open(device, &fan.pwm_file)?;
            Ok(Box::new(pwm) as Box<dyn PwmControl>)
        })
    }

    /// Like [`initialize`](Self::initialize), with the fan control surface
    /// supplied by `open_pwm` for each resolved fan device.
    pub fn initialize_with<F>(config: &Config, hwmon: &Hwmon, mut open_pwm: F) -> Result<Self>
    where
        F: FnMut(&Device, &FanConfig) -> Result<Box<dyn PwmControl>>,
    {
        config.validate()?;

        let curves = config
            .curves
            .iter()
            .map(|c| c.build())
            .collect::<Result<Vec<_>>>()?;
        let sensors = build_sensors(config, hwmon)?;

        let mut fans = Vec::with_capacity(config.fans.len());
        let mut outputs: HashSet<(PathBuf, &str)> = HashSet::new();
        for fan_cfg in &config.fans {
            let entry = format!("fan '{}'", fan_cfg.name);
            let curve = config
                .curves
                .iter()
                .position(|c| c.name == fan_cfg.curve)
                .ok_or_else(|| Error::config(&entry, format!("unknown curve '{}'", fan_cfg.curve)))?;
            let curve_cfg = &config.curves[curve];
            let sensor = position(&sensors, &curve_cfg.sensor).ok_or_else(|| {
                Error::config(&entry, format!("unknown sensor '{}'", curve_cfg.sensor))
            })?;

            let device = hwmon
                .resolve(&fan_cfg.driver, fan_cfg.pci_device.as_deref())
                .map_err(|e| e.during(&entry))?;
            // Differently qualified entries can still land on one device.
            if !outputs.insert((device.path.clone(), fan_cfg.pwm_file.as_str())) {
                return Err(Error::config(
                    &entry,
                    format!(
                        "{} is already driven by another fan",
                        device.path.join(&fan_cfg.pwm_file).display()
                    ),
                ));
            }
            let control = open_pwm(&device, fan_cfg).map_err(|e| e.during(&entry))?;
            log::info!(
                "Fan '{}' -> {} (curve '{}', sensor '{}')",
                fan_cfg.name,
                control.describe(),
                curve_cfg.name,
                curve_cfg.sensor
            );

            let range = PwmRange {
                min_pwm: fan_cfg.min_pwm,
                max_pwm: fan_cfg.max_pwm,
                zero_rpm: fan_cfg.zero_rpm,
            };
            fans.push(Fan::new(
                fan_cfg.name.clone(),
                sensor,
                curve,
                range,
                curve_cfg.average,
                control,
            ));
        }

        log::info!(
            "Initialized {} sensor(s), {} curve(s), {} fan(s)",
            sensors.len(),
            curves.len(),
            fans.len()
        );

        Ok(Self {
            state: EngineState::Ready,
            sensors,
            curves,
            fans,
            ticks: 0,
        })
    }

    /// Switch every fan to manual control, capturing its original mode.
    ///
    /// If any fan refuses, the fans already switched are restored and the
    /// engine stays Ready.
    pub fn start(&mut self) -> Result<()> {
        self.require_state(EngineState::Ready)?;

        for i in 0..self.fans.len() {
            if let Err(e) = self.fans[i].engage() {
                let entry = format!("fan '{}'", self.fans[i].name());
                for fan in self.fans[..=i].iter_mut().rev() {
                    if let Err(re) = fan.restore() {
                        log::error!("Failed to restore fan '{}': {re}", fan.name());
                    }
                }
                return Err(e.during(entry));
            }
            log::info!("Fan '{}' switched to manual control", self.fans[i].name());
        }

        self.state = EngineState::Running;
        Ok(())
    }

    pub fn tick(&mut self) -> Result<()> {
        self.tick_at(Instant::now())
    }

    /// Run one update pass with `now` as the debounce clock.
    ///
    /// Sensor and fan failures are logged and skipped for this tick; only
    /// calling this outside the Running state is an error.
    pub fn tick_at(&mut self, now: Instant) -> Result<()> {
        self.require_state(EngineState::Running)?;
        self.ticks += 1;

        sensor::read_all(&mut self.sensors);

        for fan in &mut self.fans {
            let sensor = &self.sensors[fan.sensor()];
            let Some(reading) = sensor.fresh_value() else {
                log::debug!(
                    "Fan '{}': no reading from '{}' this tick, skipping",
                    fan.name(),
                    sensor.name()
                );
                continue;
            };

            match fan.update(reading, &self.curves[fan.curve()], now) {
                Ok(Some(pwm)) => log::debug!("Fan '{}': wrote pwm {pwm}", fan.name()),
                Ok(None) => {}
                Err(e) => log::warn!("Fan '{}': {e}", fan.name()),
            }

            log::debug!(
                "Fan '{}': {} {reading:.1}C avg {:.1}C -> {:.1}% pwm {}",
                fan.name(),
                sensor.name(),
                fan.temperature().unwrap_or(reading),
                fan.fan_percent().unwrap_or_default(),
                fan.pwm_value().map_or_else(|| "-".to_string(), |p| p.to_string())
            );
        }

        Ok(())
    }

    /// Restore every fan and release all handles. Restoration errors are
    /// collected and returned; a failure on one fan never stops the rest.
    pub fn shutdown(mut self) -> Vec<Error> {
        let errors = if self.state == EngineState::Running {
            self.state = EngineState::ShuttingDown;
            self.restore_all()
        } else {
            Vec::new()
        };

        // Fans first: their handles are the ones that matter.
        self.fans.clear();
        self.sensors.clear();
        self.state = EngineState::Destroyed;
        errors
    }

    /// Restore in reverse engage order.
    fn restore_all(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();
        for fan in self.fans.iter_mut().rev() {
            match fan.restore() {
                Ok(()) => log::info!("Fan '{}' restored to its original mode", fan.name()),
                Err(e) => {
                    log::error!("Failed to restore fan '{}': {e}", fan.name());
                    errors.push(e.during(format!("fan '{}'", fan.name())));
                }
            }
        }
        errors
    }

    fn require_state(&self, expected: EngineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::State {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    pub fn fans(&self) -> &[Fan] {
        &self.fans
    }

    /// Plain-data view of the state after the latest tick.
    pub fn snapshot(&self) -> Snapshot {
        let sensors = self
            .sensors
            .iter()
            .map(|s| SensorStatus {
                name: s.name().to_string(),
                kind: s.kind_name().to_string(),
                value: s.current_value(),
                ok: s.fresh_value().is_some(),
                hottest: s.hottest().map(|i| self.sensors[i].name().to_string()),
            })
            .collect();

        let fans = self
            .fans
            .iter()
            .map(|f| FanStatus {
                name: f.name().to_string(),
                sensor: self.sensors[f.sensor()].name().to_string(),
                curve: self.curves[f.curve()].name().to_string(),
                temperature: f.temperature(),
                fan_percent: f.fan_percent(),
                pwm: f.pwm_value(),
                pending: f.debounce().is_pending(),
            })
            .collect();

        Snapshot {
            tick: self.ticks,
            sensors,
            fans,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if matches!(
            self.state,
            EngineState::Running | EngineState::ShuttingDown
        ) {
            log::warn!("Engine dropped while {}, restoring fans", self.state.as_str());
            self.restore_all();
            self.state = EngineState::Destroyed;
        }
    }
}

/// Build the sensor pool: for each source its channels and then its own
/// max sensor, followed by the derived sensors.
fn build_sensors(config: &Config, hwmon: &Hwmon) -> Result<Vec<Sensor>> {
    let mut pool: Vec<Sensor> = Vec::new();

    for source in &config.sources {
        let entry = format!("source '{}'", source.name);
        let device = hwmon
            .resolve(&source.driver, source.pci_device.as_deref())
            .map_err(|e| e.during(&entry))?;
        log::info!("Source '{}' -> {}", source.name, device.path.display());

        let first = pool.len();
        for channel in &source.channels {
            let sensor = Sensor::hardware(
                channel.sensor_name(&source.name),
                &device,
                &channel.label,
                source.scale,
                channel.offset,
            )
            .map_err(|e| e.during(&entry))?;
            pool.push(sensor);
        }
        let inputs = (first..pool.len())
            .map(|sensor| MaxInput {
                sensor,
                offset: 0.0,
            })
            .collect();
        pool.push(Sensor::max(source.name.clone(), inputs));
    }

    for sensor_cfg in &config.sensors {
        let entry = format!("sensor '{}'", sensor_cfg.name());
        let sensor = match sensor_cfg {
            SensorConfig::Max { name, inputs } => {
                let inputs = inputs
                    .iter()
                    .map(|input| {
                        position(&pool, &input.sensor)
                            .map(|sensor| MaxInput {
                                sensor,
                                offset: input.offset,
                            })
                            .ok_or_else(|| {
                                Error::config(&entry, format!("unknown input '{}'", input.sensor))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Sensor::max(name.clone(), inputs)
            }
            SensorConfig::File { name, path } => {
                Sensor::file(name.clone(), path).map_err(|e| e.during(&entry))?
            }
        };
        pool.push(sensor);
    }

    Ok(pool)
}

fn position(pool: &[Sensor], name: &str) -> Option<usize> {
    pool.iter().position(|s| s.name() == name)
}
