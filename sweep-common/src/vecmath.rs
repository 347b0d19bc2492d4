use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul};

/// A point or direction in the practice plane: `x` along the proxy axis, `y` orthogonal to it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Euclidean length; the mean resultant length for averaged unit vectors.
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Projection length onto `axis` when `axis` is a unit vector.
    pub fn dot(&self, axis: Vec2) -> f64 {
        self.x * axis.x + self.y * axis.y
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, factor: f64) -> Self {
        Vec2::new(self.x * factor, self.y * factor)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;
    fn div(self, divisor: f64) -> Self {
        Vec2::new(self.x / divisor, self.y / divisor)
    }
}

/// Unit vector pointing at `angle_rad`, measured from the proxy axis.
pub fn angle_to_vec(angle_rad: f64) -> Vec2 {
    let (sin, cos) = angle_rad.sin_cos();
    Vec2::new(cos, sin)
}

/// Direction of `vec` in `(-π, π]`.
pub fn vec_to_angle(vec: Vec2) -> f64 {
    vec.y.atan2(vec.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn angle_round_trips_through_unit_vector() {
        let v = angle_to_vec(FRAC_PI_2);
        assert!((v.length() - 1.0).abs() < 1e-12);
        assert!((vec_to_angle(v) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn projection_onto_goal_axis() {
        let output = angle_to_vec(0.0) * 2.0;
        let goal = output.dot(angle_to_vec(FRAC_PI_4));
        assert!((goal - 2.0 * FRAC_PI_4.cos()).abs() < 1e-12);
        assert_eq!((Vec2::new(1.0, 2.0) + Vec2::new(3.0, -1.0)) / 2.0, Vec2::new(2.0, 0.5));
    }
}
