//! Light sources lit by the deferred lighting stage.

pub mod shading;
pub mod volume;

use crate::{camera::Camera, fre};
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, UnitVector3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Maximum number of shadow cascades for a directional light.
pub const MAX_SHADOW_CASCADES: usize = 4;

/// Distance returned by [`max_effective_distance`] for lights whose
/// attenuation is constant.
pub const CONSTANT_ATTENUATION_DISTANCE: fre = 4000.0;

/// Value in `[0, 1]` below which a light contribution is considered
/// invisible (one step of an 8-bit channel).
pub const MIN_VISIBLE_CONTRIBUTION: fre = 1.0 / 256.0;

/// Largest outer cutoff angle supported for spot lights, in radians.
pub const MAX_SPOT_CUTOFF_ANGLE: fre = 89.0 * std::f32::consts::PI / 180.0;

const ATTENUATION_COEFFICIENT_THRESHOLD: fre = 1e-6;

/// The three kinds of light source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// Intensity scales for the diffuse and specular response to a light.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightIntensity {
    pub diffuse: fre,
    pub specular: fre,
}

/// Coefficients of the distance attenuation `1 / (c + l*d + q*d²)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub constant: fre,
    pub linear: fre,
    pub quadratic: fre,
}

/// Handle to a shadow map rendered by the shadow map collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowMapId(pub u32);

/// Emission properties shared by all light kinds.
#[derive(Clone, Debug, PartialEq)]
pub struct LightEmission {
    pub colour: Vector3<fre>,
    pub intensity: LightIntensity,
    /// Whether the light produces shadows and should be lit with the
    /// shadow-aware light pass.
    pub produces_shadows: bool,
    pub shadow_map: Option<ShadowMapId>,
}

/// One cascade of a directional light's shadow map.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowCascade {
    /// View-space depth of the far end of the cascade.
    pub split_distance: fre,
    /// Transform from world space to the cascade's clip space.
    pub light_clip_transform: Matrix4<fre>,
}

/// A light infinitely far away, affecting every pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    pub emission: LightEmission,
    /// World-space direction the light travels in.
    pub direction: UnitVector3<fre>,
    pub cascades: Vec<ShadowCascade>,
}

/// A light radiating equally in all directions from a point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub emission: LightEmission,
    pub position: Point3<fre>,
    pub attenuation: Attenuation,
    /// Distance the shadow cube map's depths are normalized by.
    pub shadow_far_distance: fre,
}

/// A light radiating from a point within a cone.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    pub emission: LightEmission,
    pub position: Point3<fre>,
    /// World-space direction of the cone axis.
    pub direction: UnitVector3<fre>,
    pub attenuation: Attenuation,
    /// Angle from the axis (radians) inside which the light is at full
    /// strength.
    pub inner_cutoff: fre,
    /// Angle from the axis (radians) beyond which the light has no effect.
    pub outer_cutoff: fre,
    /// Exponent applied to the falloff between the cutoff angles.
    pub falloff_exponent: fre,
    /// Transform from world space to the light's shadow clip space.
    pub light_clip_transform: Matrix4<fre>,
}

/// A light descriptor of any kind.
#[derive(Clone, Debug, PartialEq)]
pub enum LightDescriptor {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// Identifies a light within a [`SceneLights`] collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId {
    pub kind: LightKind,
    pub index: usize,
}

/// The lights of a scene, partitioned by kind. The collection is owned by the
/// scene and only borrowed by the lighting pipeline for the duration of a
/// frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneLights {
    directional: Vec<DirectionalLight>,
    point: Vec<PointLight>,
    spot: Vec<SpotLight>,
}

/// Borrowed view of a single light in a [`SceneLights`] collection.
#[derive(Clone, Copy, Debug)]
pub enum LightRef<'a> {
    Directional(&'a DirectionalLight),
    Point(&'a PointLight),
    Spot(&'a SpotLight),
}

/// Uniform holding the parameters of one light, with positions and
/// directions in view space.
///
/// The size of this struct has to be a multiple of 16 bytes as required for
/// uniforms.
#[repr(C)]
#[derive(Copy, Clone, Debug, Zeroable, Pod)]
pub struct LightUniform {
    volume_transform: Matrix4<fre>,
    light_space_transforms: [Matrix4<fre>; MAX_SHADOW_CASCADES],
    cascade_split_distances: Vector4<fre>,
    colour: Vector3<fre>,
    diffuse_intensity: fre,
    view_position: Vector3<fre>,
    specular_intensity: fre,
    view_direction: Vector3<fre>,
    cos_inner_cutoff: fre,
    attenuation: Vector3<fre>,
    cos_outer_cutoff: fre,
    falloff_exponent: fre,
    max_distance: fre,
    shadow_far_distance: fre,
    cascade_count: u32,
}

assert_uniform_valid!(LightUniform);

impl LightKind {
    pub const ALL: [Self; 3] = [Self::Directional, Self::Point, Self::Spot];

    /// Whether lights of this kind have a bounded volume and use the stencil
    /// volume pass.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Directional)
    }
}

impl std::fmt::Display for LightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
        };
        write!(f, "{name}")
    }
}

impl LightIntensity {
    /// Uses the same intensity for the diffuse and specular response.
    pub fn uniform(intensity: fre) -> Self {
        Self {
            diffuse: intensity,
            specular: intensity,
        }
    }
}

impl Default for LightIntensity {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl Attenuation {
    pub fn new(constant: fre, linear: fre, quadratic: fre) -> Self {
        Self {
            constant,
            linear,
            quadratic,
        }
    }

    /// Whether all coefficients are effectively zero, which would make the
    /// light infinitely bright.
    pub fn is_degenerate(&self) -> bool {
        self.constant.abs() < ATTENUATION_COEFFICIENT_THRESHOLD
            && self.linear.abs() < ATTENUATION_COEFFICIENT_THRESHOLD
            && self.quadratic.abs() < ATTENUATION_COEFFICIENT_THRESHOLD
    }

    /// Returns the attenuation factor at the given distance.
    pub fn factor(&self, distance: fre) -> fre {
        let denominator =
            self.constant + self.linear * distance + self.quadratic * distance * distance;
        1.0 / denominator.max(ATTENUATION_COEFFICIENT_THRESHOLD)
    }

    fn as_vector(&self) -> Vector3<fre> {
        Vector3::new(self.constant, self.linear, self.quadratic)
    }
}

impl Default for Attenuation {
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0)
    }
}

impl LightEmission {
    pub fn new(colour: Vector3<fre>, intensity: LightIntensity) -> Self {
        Self {
            colour,
            intensity,
            produces_shadows: false,
            shadow_map: None,
        }
    }

    /// Marks the light as shadow producing with the given shadow map.
    pub fn with_shadow_map(mut self, shadow_map: ShadowMapId) -> Self {
        self.produces_shadows = true;
        self.shadow_map = Some(shadow_map);
        self
    }
}

impl DirectionalLight {
    pub fn new(emission: LightEmission, direction: UnitVector3<fre>) -> Self {
        Self {
            emission,
            direction,
            cascades: Vec::new(),
        }
    }
}

impl PointLight {
    pub fn new(emission: LightEmission, position: Point3<fre>, attenuation: Attenuation) -> Self {
        Self {
            emission,
            position,
            attenuation,
            shadow_far_distance: 100.0,
        }
    }
}

impl SpotLight {
    /// Creates a spot light. The outer cutoff is limited to
    /// [`MAX_SPOT_CUTOFF_ANGLE`] and the inner cutoff to the outer cutoff.
    pub fn new(
        emission: LightEmission,
        position: Point3<fre>,
        direction: UnitVector3<fre>,
        attenuation: Attenuation,
        inner_cutoff: fre,
        outer_cutoff: fre,
        falloff_exponent: fre,
    ) -> Self {
        let outer_cutoff = outer_cutoff.clamp(0.0, MAX_SPOT_CUTOFF_ANGLE);
        let inner_cutoff = inner_cutoff.clamp(0.0, outer_cutoff);
        Self {
            emission,
            position,
            direction,
            attenuation,
            inner_cutoff,
            outer_cutoff,
            falloff_exponent: falloff_exponent.max(0.0),
            light_clip_transform: Matrix4::identity(),
        }
    }

    /// Outer cutoff limited to the supported range.
    pub fn clamped_outer_cutoff(&self) -> fre {
        self.outer_cutoff.clamp(0.0, MAX_SPOT_CUTOFF_ANGLE)
    }
}

impl LightDescriptor {
    pub fn kind(&self) -> LightKind {
        self.as_ref().kind()
    }

    pub fn as_ref(&self) -> LightRef<'_> {
        match self {
            Self::Directional(light) => LightRef::Directional(light),
            Self::Point(light) => LightRef::Point(light),
            Self::Spot(light) => LightRef::Spot(light),
        }
    }
}

impl<'a> LightRef<'a> {
    pub fn kind(&self) -> LightKind {
        match self {
            Self::Directional(_) => LightKind::Directional,
            Self::Point(_) => LightKind::Point,
            Self::Spot(_) => LightKind::Spot,
        }
    }

    pub fn emission(&self) -> &'a LightEmission {
        match self {
            Self::Directional(light) => &light.emission,
            Self::Point(light) => &light.emission,
            Self::Spot(light) => &light.emission,
        }
    }

    /// Whether the light should be lit by the shadow-aware light pass.
    pub fn produces_shadows(&self) -> bool {
        self.emission().produces_shadows
    }

    pub fn attenuation(&self) -> Option<&'a Attenuation> {
        match self {
            Self::Directional(_) => None,
            Self::Point(light) => Some(&light.attenuation),
            Self::Spot(light) => Some(&light.attenuation),
        }
    }

    /// World-space position of local lights.
    pub fn position(&self) -> Option<&'a Point3<fre>> {
        match self {
            Self::Directional(_) => None,
            Self::Point(light) => Some(&light.position),
            Self::Spot(light) => Some(&light.position),
        }
    }

    /// Returns the distance beyond which the light has no visible effect,
    /// limited to `max_distance`. Directional lights always return
    /// `max_distance`.
    pub fn max_effective_distance(&self, max_distance: fre) -> fre {
        match self.attenuation() {
            Some(attenuation) => {
                let emission = self.emission();
                max_effective_distance(
                    &emission.colour,
                    &emission.intensity,
                    attenuation,
                    max_distance,
                )
            }
            None => max_distance,
        }
    }
}

impl SceneLights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given light and returns its ID.
    pub fn add(&mut self, light: LightDescriptor) -> LightId {
        let (kind, index) = match light {
            LightDescriptor::Directional(light) => {
                self.directional.push(light);
                (LightKind::Directional, self.directional.len() - 1)
            }
            LightDescriptor::Point(light) => {
                self.point.push(light);
                (LightKind::Point, self.point.len() - 1)
            }
            LightDescriptor::Spot(light) => {
                self.spot.push(light);
                (LightKind::Spot, self.spot.len() - 1)
            }
        };
        LightId { kind, index }
    }

    pub fn directional_lights(&self) -> &[DirectionalLight] {
        &self.directional
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point
    }

    pub fn spot_lights(&self) -> &[SpotLight] {
        &self.spot
    }

    pub fn get(&self, id: LightId) -> Option<LightRef<'_>> {
        match id.kind {
            LightKind::Directional => self.directional.get(id.index).map(LightRef::Directional),
            LightKind::Point => self.point.get(id.index).map(LightRef::Point),
            LightKind::Spot => self.spot.get(id.index).map(LightRef::Spot),
        }
    }

    pub fn len(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all lights, directional lights first, then point and
    /// spot lights.
    pub fn iter(&self) -> impl Iterator<Item = (LightId, LightRef<'_>)> {
        let directional = self.directional.iter().enumerate().map(|(index, light)| {
            (
                LightId {
                    kind: LightKind::Directional,
                    index,
                },
                LightRef::Directional(light),
            )
        });
        let point = self.point.iter().enumerate().map(|(index, light)| {
            (
                LightId {
                    kind: LightKind::Point,
                    index,
                },
                LightRef::Point(light),
            )
        });
        let spot = self.spot.iter().enumerate().map(|(index, light)| {
            (
                LightId {
                    kind: LightKind::Spot,
                    index,
                },
                LightRef::Spot(light),
            )
        });
        directional.chain(point).chain(spot)
    }
}

impl LightUniform {
    /// Gathers the parameters of the given light, transforming positions and
    /// directions into the view space of the camera. `volume_transform` maps
    /// the light volume mesh to clip space (identity for directional lights)
    /// and `max_distance` is the light's effective distance.
    pub fn new(
        light: LightRef<'_>,
        camera: &Camera,
        volume_transform: Matrix4<fre>,
        max_distance: fre,
    ) -> Self {
        let emission = light.emission();
        let inverse_view = camera.inverse_view_matrix();

        let mut uniform = Self {
            volume_transform,
            light_space_transforms: [Matrix4::identity(); MAX_SHADOW_CASCADES],
            cascade_split_distances: Vector4::zeros(),
            colour: emission.colour,
            diffuse_intensity: emission.intensity.diffuse,
            view_position: Vector3::zeros(),
            specular_intensity: emission.intensity.specular,
            view_direction: -Vector3::z(),
            cos_inner_cutoff: 1.0,
            attenuation: Vector3::new(1.0, 0.0, 0.0),
            cos_outer_cutoff: 0.0,
            falloff_exponent: 1.0,
            max_distance,
            shadow_far_distance: 1.0,
            cascade_count: 0,
        };

        match light {
            LightRef::Directional(light) => {
                uniform.view_direction = camera.world_to_view_direction(&light.direction);
                let cascade_count = light.cascades.len().min(MAX_SHADOW_CASCADES);
                for (idx, cascade) in light.cascades.iter().take(cascade_count).enumerate() {
                    uniform.light_space_transforms[idx] =
                        cascade.light_clip_transform * inverse_view;
                    uniform.cascade_split_distances[idx] = cascade.split_distance;
                }
                // A shadowed light without cascades samples the first layer
                uniform.cascade_count = cascade_count.max(1) as u32;
            }
            LightRef::Point(light) => {
                uniform.view_position = camera.world_to_view_point(&light.position).coords;
                uniform.attenuation = light.attenuation.as_vector();
                uniform.shadow_far_distance = light.shadow_far_distance.max(fre::EPSILON);
                // Rotates view-space offsets back into the world-aligned cube
                // map frame
                uniform.light_space_transforms[0] = inverse_view;
            }
            LightRef::Spot(light) => {
                uniform.view_position = camera.world_to_view_point(&light.position).coords;
                uniform.view_direction = camera.world_to_view_direction(&light.direction);
                uniform.attenuation = light.attenuation.as_vector();
                uniform.cos_inner_cutoff = fre::cos(light.inner_cutoff);
                uniform.cos_outer_cutoff = fre::cos(light.clamped_outer_cutoff());
                uniform.falloff_exponent = light.falloff_exponent;
                uniform.light_space_transforms[0] = light.light_clip_transform * inverse_view;
            }
        }

        uniform
    }

    pub fn max_distance(&self) -> fre {
        self.max_distance
    }

    pub fn volume_transform(&self) -> &Matrix4<fre> {
        &self.volume_transform
    }
}

/// Computes the distance at which a light with the given colour, intensity
/// and attenuation falls below [`MIN_VISIBLE_CONTRIBUTION`], limited to
/// `max_distance`.
///
/// Lights whose attenuation does not depend on distance get
/// [`CONSTANT_ATTENUATION_DISTANCE`]. Lights that are never bright enough to
/// be visible get zero.
pub fn max_effective_distance(
    colour: &Vector3<fre>,
    intensity: &LightIntensity,
    attenuation: &Attenuation,
    max_distance: fre,
) -> fre {
    if attenuation.is_degenerate() {
        log::error!("Light has zero attenuation coefficients, using maximum light distance");
        return max_distance;
    }

    let Attenuation {
        constant,
        linear,
        quadratic,
    } = *attenuation;

    let threshold = colour.max() * intensity.diffuse / MIN_VISIBLE_CONTRIBUTION;

    let distance = if quadratic.abs() >= ATTENUATION_COEFFICIENT_THRESHOLD {
        if linear.abs() < ATTENUATION_COEFFICIENT_THRESHOLD {
            fre::sqrt((threshold - constant) / quadratic)
        } else {
            (-linear + fre::sqrt(linear * linear - 4.0 * quadratic * (constant - threshold)))
                / (2.0 * quadratic)
        }
    } else if linear.abs() >= ATTENUATION_COEFFICIENT_THRESHOLD {
        (threshold - constant) / linear
    } else {
        CONSTANT_ATTENUATION_DISTANCE
    };

    if distance.is_nan() {
        0.0
    } else {
        distance.clamp(0.0, max_distance)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn white_emission() -> LightEmission {
        LightEmission::new(Vector3::new(1.0, 1.0, 1.0), LightIntensity::uniform(1.0))
    }

    #[test]
    fn should_compute_quadratic_only_distance() {
        let distance = max_effective_distance(
            &Vector3::new(1.0, 1.0, 1.0),
            &LightIntensity::uniform(1.0),
            &Attenuation::new(1.0, 0.0, 1.0),
            1000.0,
        );
        assert_abs_diff_eq!(distance, fre::sqrt(255.0), epsilon = 1e-4);
    }

    #[test]
    fn should_compute_linear_only_distance() {
        let distance = max_effective_distance(
            &Vector3::new(0.5, 1.0, 0.25),
            &LightIntensity::uniform(2.0),
            &Attenuation::new(2.0, 0.5, 0.0),
            1000.0,
        );
        assert_abs_diff_eq!(distance, (512.0 - 2.0) / 0.5, epsilon = 1e-3);
    }

    #[test]
    fn should_give_constant_attenuation_distance_when_capped_above() {
        let distance = max_effective_distance(
            &Vector3::new(1.0, 1.0, 1.0),
            &LightIntensity::uniform(1.0),
            &Attenuation::new(1.0, 0.0, 0.0),
            1e6,
        );
        assert_eq!(distance, CONSTANT_ATTENUATION_DISTANCE);
    }

    #[test]
    fn should_limit_distance_to_maximum() {
        let light = PointLight::new(
            white_emission(),
            Point3::origin(),
            Attenuation::new(1.0, 0.0, 1e-5),
        );
        assert_eq!(LightRef::Point(&light).max_effective_distance(50.0), 50.0);
    }

    #[test]
    fn should_give_zero_distance_for_light_too_dim_to_be_visible() {
        let distance = max_effective_distance(
            &Vector3::new(0.001, 0.001, 0.001),
            &LightIntensity::uniform(1.0),
            &Attenuation::new(10.0, 0.0, 1.0),
            100.0,
        );
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn should_use_maximum_distance_for_degenerate_attenuation() {
        let distance = max_effective_distance(
            &Vector3::new(1.0, 1.0, 1.0),
            &LightIntensity::uniform(1.0),
            &Attenuation::new(0.0, 0.0, 0.0),
            42.0,
        );
        assert_eq!(distance, 42.0);
    }

    proptest! {
        #[test]
        fn should_reach_visibility_threshold_at_effective_distance(
            colour in 0.1_f32..10.0,
            constant in 0.0_f32..2.0,
            linear in 0.0_f32..1.0,
            quadratic in 0.01_f32..1.0,
        ) {
            let attenuation = Attenuation::new(constant, linear, quadratic);
            let intensity = LightIntensity::uniform(1.0);
            let distance = max_effective_distance(
                &Vector3::new(colour, colour, colour),
                &intensity,
                &attenuation,
                fre::MAX,
            );
            prop_assume!(distance > 0.0);
            let contribution = colour * attenuation.factor(distance);
            prop_assert!((contribution - MIN_VISIBLE_CONTRIBUTION).abs() < 1e-4);
        }
    }

    #[test]
    fn should_partition_lights_by_kind_in_iteration_order() {
        let mut lights = SceneLights::new();
        let spot = lights.add(LightDescriptor::Spot(SpotLight::new(
            white_emission(),
            Point3::origin(),
            Vector3::z_axis(),
            Attenuation::default(),
            0.2,
            0.4,
            1.0,
        )));
        let directional = lights.add(LightDescriptor::Directional(DirectionalLight::new(
            white_emission(),
            -Vector3::y_axis(),
        )));
        let point = lights.add(LightDescriptor::Point(PointLight::new(
            white_emission(),
            Point3::origin(),
            Attenuation::default(),
        )));

        let ids: Vec<_> = lights.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![directional, point, spot]);
        assert_eq!(lights.len(), 3);
        assert_eq!(lights.get(point).map(|light| light.kind()), Some(LightKind::Point));
    }

    #[test]
    fn should_limit_spot_cutoffs() {
        let light = SpotLight::new(
            white_emission(),
            Point3::origin(),
            Vector3::z_axis(),
            Attenuation::default(),
            2.0,
            3.0,
            1.0,
        );
        assert_eq!(light.outer_cutoff, MAX_SPOT_CUTOFF_ANGLE);
        assert_eq!(light.inner_cutoff, MAX_SPOT_CUTOFF_ANGLE);
    }

    #[test]
    fn should_transform_point_light_into_view_space_for_uniform() {
        let view = Camera::look_at(
            &Point3::new(0.0, 0.0, 10.0),
            &Point3::origin(),
            &Vector3::y(),
        );
        let camera = Camera::perspective(view, 1.0, 1.0, 0.1, 100.0);
        let light = PointLight::new(
            white_emission(),
            Point3::new(0.0, 2.0, 0.0),
            Attenuation::default(),
        );
        let uniform = LightUniform::new(LightRef::Point(&light), &camera, Matrix4::identity(), 5.0);
        assert_abs_diff_eq!(uniform.view_position, Vector3::new(0.0, 2.0, -10.0), epsilon = 1e-5);
        assert_eq!(uniform.max_distance(), 5.0);
    }

    #[test]
    fn should_give_uniform_size_multiple_of_sixteen() {
        assert_eq!(std::mem::size_of::<LightUniform>() % 16, 0);
    }
}
