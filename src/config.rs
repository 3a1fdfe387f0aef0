//! Configuration of the lighting stage.

use crate::{error::LightingError, fre, io};
use anyhow::Result;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest supported number of SSAO kernel samples.
pub const MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT: u32 = 64;

/// Largest supported number of simultaneously bound environment maps.
pub const MAX_ENVIRONMENT_MAP_COUNT: u32 = 4;

/// Configuration options for the lighting stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient_occlusion: AmbientOcclusionConfig,
    pub fog: FogConfig,
    pub fresnel: FresnelConfig,
    pub shadows: ShadowConfig,
    /// Number of environment map slots materials can refer to.
    pub environment_map_count: u32,
    /// Colour written to pixels not covered by any geometry.
    pub background_colour: Vector3<fre>,
    /// Colour of the uniform ambient light of the scene.
    pub scene_ambient_colour: Vector3<fre>,
    /// Upper limit on the effective distance of local lights.
    pub max_light_distance: fre,
}

/// Configuration options for screen-space ambient occlusion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientOcclusionConfig {
    /// Whether ambient occlusion is computed. When disabled, occlusion is
    /// taken to be one everywhere.
    pub enabled: bool,
    /// Number of kernel samples per pixel.
    pub sample_count: u32,
    /// Radius of the sampling hemisphere in view space.
    pub radius: fre,
    /// Depth bias avoiding self-occlusion.
    pub bias: fre,
    /// Seed of the random number generator producing the kernel and noise.
    pub seed: u64,
}

/// The fog models that can be applied in the combine pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FogType {
    Disabled,
    Linear,
    Exponential,
    SquaredExponential,
}

/// Configuration options for fog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    pub fog_type: FogType,
    pub colour: Vector3<fre>,
    /// Density for the exponential fog models.
    pub density: fre,
    /// View-space distance where linear fog starts.
    pub start_distance: fre,
    /// View-space distance where linear fog fully covers the scene.
    pub end_distance: fre,
}

/// Parameters of the Fresnel term blending reflection and refraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FresnelConfig {
    pub bias: fre,
    pub scale: fre,
    pub power: fre,
}

/// How shadow maps are sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowFilter {
    /// A single depth comparison.
    Raw,
    /// Percentage-closer filtering over several comparisons.
    Pcf,
}

/// Configuration options for shadowed lights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub filter: ShadowFilter,
}

impl LightingConfig {
    /// Reads a configuration from the RON file at the given path and
    /// validates it.
    ///
    /// # Errors
    /// Returns an error if the file can not be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = io::parse_ron_file(file_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a RON string and validates it.
    ///
    /// # Errors
    /// Returns an error if the string can not be parsed or the resulting
    /// configuration is invalid.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = io::from_ron_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all options are within their supported ranges.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] describing the first
    /// invalid option.
    pub fn validate(&self) -> Result<()> {
        self.ambient_occlusion.validate()?;
        self.fog.validate()?;

        if self.environment_map_count > MAX_ENVIRONMENT_MAP_COUNT {
            return Err(LightingError::contract_violation(format!(
                "environment map count {} exceeds maximum of {}",
                self.environment_map_count, MAX_ENVIRONMENT_MAP_COUNT
            ))
            .into());
        }
        if !(self.max_light_distance > 0.0) {
            return Err(LightingError::contract_violation(format!(
                "maximum light distance must be positive, got {}",
                self.max_light_distance
            ))
            .into());
        }
        Ok(())
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient_occlusion: AmbientOcclusionConfig::default(),
            fog: FogConfig::default(),
            fresnel: FresnelConfig::default(),
            shadows: ShadowConfig::default(),
            environment_map_count: 0,
            background_colour: Vector3::zeros(),
            scene_ambient_colour: Vector3::zeros(),
            max_light_distance: 1000.0,
        }
    }
}

impl AmbientOcclusionConfig {
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if the sample count,
    /// radius or bias is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.sample_count == 0 || self.sample_count > MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT {
            return Err(LightingError::contract_violation(format!(
                "ambient occlusion sample count must be in 1..={}, got {}",
                MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT, self.sample_count
            ))
            .into());
        }
        if !(self.radius > 0.0) {
            return Err(LightingError::contract_violation(format!(
                "ambient occlusion radius must be positive, got {}",
                self.radius
            ))
            .into());
        }
        if !(self.bias >= 0.0) {
            return Err(LightingError::contract_violation(format!(
                "ambient occlusion bias must be non-negative, got {}",
                self.bias
            ))
            .into());
        }
        Ok(())
    }
}

impl Default for AmbientOcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_count: 16,
            radius: 0.5,
            bias: 0.025,
            seed: 0,
        }
    }
}

impl FogConfig {
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if the parameters of the
    /// selected fog model are invalid.
    pub fn validate(&self) -> Result<()> {
        match self.fog_type {
            FogType::Disabled => {}
            FogType::Linear => {
                if !(self.end_distance > self.start_distance) {
                    return Err(LightingError::contract_violation(format!(
                        "linear fog end distance {} must exceed start distance {}",
                        self.end_distance, self.start_distance
                    ))
                    .into());
                }
            }
            FogType::Exponential | FogType::SquaredExponential => {
                if !(self.density >= 0.0) {
                    return Err(LightingError::contract_violation(format!(
                        "fog density must be non-negative, got {}",
                        self.density
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            fog_type: FogType::Disabled,
            colour: Vector3::new(0.5, 0.5, 0.5),
            density: 0.05,
            start_distance: 10.0,
            end_distance: 100.0,
        }
    }
}

impl Default for FresnelConfig {
    fn default() -> Self {
        Self {
            bias: 0.0,
            scale: 1.0,
            power: 2.0,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            filter: ShadowFilter::Pcf,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::lighting_error;

    #[test]
    fn should_accept_default_config() {
        assert!(LightingConfig::default().validate().is_ok());
    }

    #[test]
    fn should_fill_in_missing_options_with_defaults() {
        let config = LightingConfig::from_ron_str(
            "(ambient_occlusion: (enabled: false), fog: (fog_type: Exponential, density: 0.1))",
        )
        .unwrap();
        assert!(!config.ambient_occlusion.enabled);
        assert_eq!(
            config.ambient_occlusion.sample_count,
            AmbientOcclusionConfig::default().sample_count
        );
        assert_eq!(config.fog.fog_type, FogType::Exponential);
        assert_eq!(config.fog.density, 0.1);
        assert_eq!(config.shadows, ShadowConfig::default());
    }

    #[test]
    fn should_round_trip_through_ron() {
        let mut config = LightingConfig::default();
        config.environment_map_count = 2;
        config.shadows.filter = ShadowFilter::Raw;
        let text = io::to_ron_string(&config).unwrap();
        assert_eq!(LightingConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn should_reject_too_many_ambient_occlusion_samples() {
        let mut config = LightingConfig::default();
        config.ambient_occlusion.sample_count = MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT + 1;
        let error = config.validate().unwrap_err();
        assert!(matches!(
            lighting_error(&error),
            Some(LightingError::ContractViolation(_))
        ));
    }

    #[test]
    fn should_reject_too_many_environment_maps() {
        let mut config = LightingConfig::default();
        config.environment_map_count = MAX_ENVIRONMENT_MAP_COUNT + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_linear_fog_with_inverted_distances() {
        let mut config = LightingConfig::default();
        config.fog.fog_type = FogType::Linear;
        config.fog.start_distance = 50.0;
        config.fog.end_distance = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_ignore_linear_distances_for_disabled_fog() {
        let mut config = LightingConfig::default();
        config.fog.start_distance = 50.0;
        config.fog.end_distance = 10.0;
        assert!(config.validate().is_ok());
    }
}
