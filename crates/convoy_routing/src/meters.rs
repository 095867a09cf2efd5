use std::{
    iter::Sum,
    ops::{Add, AddAssign, Div, Mul, Sub},
};

use jiff::SignedDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kmh::Kmh;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
pub struct Meters(f64);

impl Meters {
    pub const ZERO: Meters = Meters(0.0);

    pub fn new(value: f64) -> Self {
        Meters(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn kilometers(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl PartialOrd for Meters {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl From<f64> for Meters {
    fn from(value: f64) -> Self {
        Meters::new(value)
    }
}

impl Add for Meters {
    type Output = Meters;

    fn add(self, other: Meters) -> Meters {
        Meters(self.0 + other.0)
    }
}

impl AddAssign for Meters {
    fn add_assign(&mut self, other: Meters) {
        self.0 += other.0;
    }
}

impl Sub for Meters {
    type Output = Meters;

    fn sub(self, other: Meters) -> Meters {
        Meters(self.0 - other.0)
    }
}

impl Mul<f64> for Meters {
    type Output = Meters;

    fn mul(self, rhs: f64) -> Meters {
        Meters(self.0 * rhs)
    }
}

impl Div<Kmh> for Meters {
    type Output = SignedDuration;

    fn div(self, speed: Kmh) -> SignedDuration {
        let seconds = self.0 * 3.6 / speed.value();
        SignedDuration::from_secs_f64(seconds)
    }
}

impl Div<Meters> for Meters {
    type Output = f64;

    fn div(self, other: Meters) -> f64 {
        self.0 / other.0
    }
}

impl Sum for Meters {
    fn sum<I: Iterator<Item = Meters>>(iter: I) -> Meters {
        iter.fold(Meters::ZERO, |acc, x| acc + x)
    }
}

impl std::fmt::Display for Meters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 >= 1000.0 {
            write!(f, "{:.1} km", self.kilometers())
        } else {
            write!(f, "{:.0} m", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_time_at_speed() {
        let duration = Meters::new(60_000.0) / Kmh::new(60.0);
        assert_eq!(duration, SignedDuration::from_secs(3600));
    }

    #[test]
    fn test_display() {
        assert_eq!(Meters::new(950.0).to_string(), "950 m");
        assert_eq!(Meters::new(12_345.0).to_string(), "12.3 km");
    }
}
