//! Thermocouple EMF/temperature conversion with cold-junction compensation.
//!
//! The thermocouple only sees the temperature *difference* between its hot
//! and cold junctions.  The absolute hot-junction temperature is recovered by
//! converting the cold-junction temperature to its reference EMF, adding the
//! measured voltage, and inverting the sum.

use serde::{Deserialize, Serialize};

use super::nist::{self, Segment, Tables};

/// Thermocouple letter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThermocoupleType {
    B,
    E,
    J,
    K,
    N,
    R,
    S,
    T,
}

impl ThermocoupleType {
    fn tables(self) -> &'static Tables {
        match self {
            Self::B => &nist::B,
            Self::E => &nist::E,
            Self::J => &nist::J,
            Self::K => &nist::K,
            Self::N => &nist::N,
            Self::R => &nist::R,
            Self::S => &nist::S,
            Self::T => &nist::T,
        }
    }

    /// Reference EMF in volts for a junction at `celsius`.
    pub fn c2e(self, celsius: f64) -> f64 {
        let seg = select(self.tables().forward, celsius);
        let mut mv = horner(seg.coeffs, celsius);
        if self == Self::K && celsius >= 0.0 {
            let [a0, a1, a2] = nist::K_EXP;
            let dt = celsius - a2;
            mv += a0 * (a1 * dt * dt).exp();
        }
        mv / 1000.0
    }

    /// Junction temperature in °C for a reference EMF of `volts`.
    pub fn e2c(self, volts: f64) -> f64 {
        let mv = volts * 1000.0;
        let seg = select(self.tables().inverse, mv);
        horner(seg.coeffs, mv)
    }

    /// Hot-junction temperature from the measured voltage and the
    /// cold-junction temperature.
    pub fn compensate(self, measured_volts: f64, cold_junction_c: f64) -> f64 {
        self.e2c(self.c2e(cold_junction_c) + measured_volts)
    }
}

impl core::str::FromStr for ThermocoupleType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "B" | "b" => Self::B,
            "E" | "e" => Self::E,
            "J" | "j" => Self::J,
            "K" | "k" => Self::K,
            "N" | "n" => Self::N,
            "R" | "r" => Self::R,
            "S" | "s" => Self::S,
            "T" | "t" => Self::T,
            _ => return Err(crate::error::Error::InvalidParameter("unknown thermocouple type")),
        })
    }
}

/// First segment whose upper bound exceeds `x`, else the last one.
fn select(segments: &'static [Segment], x: f64) -> &'static Segment {
    segments
        .iter()
        .find(|s| s.upper > x)
        .unwrap_or(&segments[segments.len() - 1])
}

fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}
