//! Light accumulation stage of a deferred renderer.

#[macro_use]
mod macros;

pub mod camera;
pub mod combine;
pub mod config;
pub mod error;
pub mod frame;
pub mod gbuffer;
pub mod gpu;
pub mod io;
pub mod light;
mod num;
pub mod shadow;
pub mod ssao;

pub use config::LightingConfig;
pub use error::LightingError;

/// Floating point type used for lighting computations.
#[allow(non_camel_case_types)]
pub type fre = f32;
