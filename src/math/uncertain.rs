//! Values with a standard uncertainty and first-order error propagation.
//!
//! Inputs are treated as uncorrelated; derived values carry the linearized
//! uncertainty `sqrt(sum (df/dx_i * s_i)^2)`.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    pub value: f64,
    pub std: f64,
}

impl Measured {
    pub fn new(value: f64, std: f64) -> Self {
        Self {
            value,
            std: std.abs(),
        }
    }

    /// Exact value (zero uncertainty).
    pub fn exact(value: f64) -> Self {
        Self { value, std: 0.0 }
    }

    /// Value with a relative uncertainty `rel` (e.g. 0.05 for 5 %).
    pub fn with_relative(value: f64, rel: f64) -> Self {
        Self::new(value, value * rel)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.value * k, self.std * k)
    }

    pub fn powi(self, n: i32) -> Self {
        let d = n as f64 * self.value.powi(n - 1);
        Self::new(self.value.powi(n), d * self.std)
    }

    pub fn ln(self) -> Self {
        Self::new(self.value.ln(), self.std / self.value)
    }

    pub fn recip(self) -> Self {
        Self::new(1.0 / self.value, self.std / (self.value * self.value))
    }

    /// Apply a one-variable function given its derivative.
    ///
    /// Use this when a quantity appears more than once in an expression
    /// (`a / (1 - a)`), where chaining operators would treat the copies as
    /// independent.
    pub fn map(self, f: impl Fn(f64) -> f64, df: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.value), df(self.value) * self.std)
    }

    pub fn relative_std(self) -> f64 {
        self.std / self.value
    }
}

impl Add for Measured {
    type Output = Measured;
    fn add(self, rhs: Measured) -> Measured {
        Measured::new(self.value + rhs.value, self.std.hypot(rhs.std))
    }
}

impl Sub for Measured {
    type Output = Measured;
    fn sub(self, rhs: Measured) -> Measured {
        Measured::new(self.value - rhs.value, self.std.hypot(rhs.std))
    }
}

impl Mul for Measured {
    type Output = Measured;
    fn mul(self, rhs: Measured) -> Measured {
        let std = (rhs.value * self.std).hypot(self.value * rhs.std);
        Measured::new(self.value * rhs.value, std)
    }
}

impl Div for Measured {
    type Output = Measured;
    fn div(self, rhs: Measured) -> Measured {
        let value = self.value / rhs.value;
        let std = (self.std / rhs.value).hypot(self.value * rhs.std / (rhs.value * rhs.value));
        Measured::new(value, std)
    }
}

impl Sub<Measured> for f64 {
    type Output = Measured;
    fn sub(self, rhs: Measured) -> Measured {
        Measured::new(self - rhs.value, rhs.std)
    }
}

impl fmt::Display for Measured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*} ± {:.*}", p, self.value, p, self.std),
            None => write!(f, "{} ± {}", self.value, self.std),
        }
    }
}
