//! Numbers and numerics.

use nalgebra as na;
use num_traits as nt;

/// Gathers traits useful for working with generic floating point types.
pub trait Float: Copy + nt::FloatConst + nt::FromPrimitive + na::RealField + na::Scalar {
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;
    const ONE_HALF: Self;
    const TWO_PI: Self;
}

macro_rules! impl_float {
    ($f:ty, $pi:expr) => {
        impl Float for $f {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const TWO: Self = 2.0;
            const ONE_HALF: Self = 0.5;
            const TWO_PI: Self = 2.0 * $pi;
        }
    };
}

impl_float!(f32, std::f32::consts::PI);
impl_float!(f64, std::f64::consts::PI);
