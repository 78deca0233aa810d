// src/drive.rs
//
// Time-dependent drive generators: external field, current, temperature.
//
// These replace the injected generator source strings of older
// OpenCL-style engines with a closed menu of parameterized variants.
// Every variant is a pure function of time — deterministic, no side
// effects — and is evaluated once per integration stage on the host, so
// the host and device backends always see identical drive values.

use crate::params::Current;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// External-field generator H(t), in Tesla. Per-site scaling happens
/// through `SiteParams::field_mult`, not here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum FieldDrive {
    Zero,
    Constant([f64; 3]),
    /// Static bias plus a sinusoidal component along `axis`:
    /// H(t) = base + axis · amplitude · sin(omega · t).
    Sinusoid {
        base: [f64; 3],
        axis: [f64; 3],
        amplitude: f64,
        omega: f64,
    },
}

impl FieldDrive {
    pub fn evaluate(&self, time: f64) -> [f64; 3] {
        match *self {
            Self::Zero => [0.0, 0.0, 0.0],
            Self::Constant(h) => h,
            Self::Sinusoid {
                base,
                axis,
                amplitude,
                omega,
            } => {
                let osc = amplitude * (omega * time).sin();
                [
                    base[0] + axis[0] * osc,
                    base[1] + axis[1] * osc,
                    base[2] + axis[2] * osc,
                ]
            }
        }
    }

    /// Centered time derivative of the drive, for the diagnostics stream.
    pub fn derivative(&self, time: f64, dt: f64) -> [f64; 3] {
        let a = self.evaluate(time + dt);
        let b = self.evaluate(time - dt);
        [
            (a[0] - b[0]) / (2.0 * dt),
            (a[1] - b[1]) / (2.0 * dt),
            (a[2] - b[2]) / (2.0 * dt),
        ]
    }
}

/// Current generator. The `base` descriptor fixes kind, polarization,
/// β and thickness; only the density vector may vary in time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CurrentDrive {
    None,
    Constant(Current),
    /// In-plane rotation of the base density: the x-amplitude is spun
    /// around ẑ with the given period (in the same units as `time`).
    RotatingInPlane { base: Current, period: f64 },
}

impl CurrentDrive {
    pub fn evaluate(&self, time: f64) -> Current {
        match *self {
            Self::None => Current::none(),
            Self::Constant(cur) => cur,
            Self::RotatingInPlane { base, period } => {
                let phase = TAU / period * time;
                let mut cur = base;
                cur.j[1] = base.j[0] * phase.sin();
                cur.j[0] = base.j[0] * phase.cos();
                cur
            }
        }
    }
}

/// Scalar temperature generator (collaborator contract; the
/// deterministic integrator itself applies no thermal noise).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TemperatureDrive {
    Zero,
    Constant(f64),
    /// Linear ramp from `start` at t=0 to `end` at t=duration.
    Ramp { start: f64, end: f64, duration: f64 },
}

impl TemperatureDrive {
    pub fn evaluate(&self, time: f64) -> f64 {
        match *self {
            Self::Zero => 0.0,
            Self::Constant(t) => t,
            Self::Ramp {
                start,
                end,
                duration,
            } => {
                let s = (time / duration).clamp(0.0, 1.0);
                start + (end - start) * s
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Self::Zero => true,
            Self::Constant(t) => t == 0.0,
            Self::Ramp { start, end, .. } => start == 0.0 && end == 0.0,
        }
    }
}

/// Drive values sampled at one integration-stage time.
#[derive(Debug, Clone, Copy)]
pub struct DriveSample {
    pub field: [f64; 3],
    pub current: Current,
    pub temperature: f64,
}

/// The three distinct stage times any of the supported integrators can
/// touch within one step: t, t + dt/2, t + dt.
pub fn sample_stages(
    field: &FieldDrive,
    current: &CurrentDrive,
    temperature: &TemperatureDrive,
    time: f64,
    dt: f64,
) -> [DriveSample; 3] {
    let sample = |t: f64| DriveSample {
        field: field.evaluate(t),
        current: current.evaluate(t),
        temperature: temperature.evaluate(t),
    };
    [sample(time), sample(time + 0.5 * dt), sample(time + dt)]
}
