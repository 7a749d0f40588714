//! Platinum RTD resistance/temperature conversion (IEC 751, α = 0.00385).
//!
//! Callendar–Van Dusen above 0 °C: `R = R0 (1 + A·T + B·T²)`.  The inverse
//! is the positive root of that quadratic.  The C coefficient used below
//! 0 °C is ignored, so readings under freezing drift slightly; smoker
//! temperatures never get there.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorFault};

pub const A: f64 = 3.9083e-3;
pub const B: f64 = -5.775e-7;

/// Nominal resistance at 0 °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RtdType {
    Pt100,
    Pt1000,
    /// Any other element, by R0 in ohms.
    Custom(f64),
}

impl RtdType {
    pub const fn r0(self) -> f64 {
        match self {
            Self::Pt100 => 100.0,
            Self::Pt1000 => 1000.0,
            Self::Custom(r0) => r0,
        }
    }

    pub fn to_celsius(self, ohms: f64) -> Result<f64> {
        resistance_to_celsius(ohms, self.r0())
    }
}

/// Temperature for a measured resistance.
pub fn resistance_to_celsius(ohms: f64, r0: f64) -> Result<f64> {
    let disc = A * A - 4.0 * B * (1.0 - ohms / r0);
    if !disc.is_finite() || disc < 0.0 {
        return Err(SensorFault::OutOfRange.into());
    }
    Ok((-A + disc.sqrt()) / (2.0 * B))
}

/// Resistance at `celsius` (same quadratic, for calibration and tests).
pub fn celsius_to_resistance(celsius: f64, r0: f64) -> f64 {
    r0 * (1.0 + A * celsius + B * celsius * celsius)
}
