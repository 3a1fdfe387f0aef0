//! Planning of the passes making up one lit frame.

use crate::{
    camera::Camera,
    error::LightingError,
    fre,
    light::{
        LightId, LightKind, SceneLights,
        volume::{LightVolumeMesh, ScissorRect, ScreenBounds, light_volume_to_world_transform, screen_bounds},
    },
    ssao::BlurDirection,
};
use anyhow::Result;
use nalgebra::{Matrix4, Point3};

/// Key selecting the light pass strategy for a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightStrategyKey {
    pub kind: LightKind,
    pub shadowed: bool,
}

/// How a light pass blends into the accumulation buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blending {
    /// Overwrites the buffer, used for the first light of a frame.
    Replace,
    /// Adds to the buffer.
    Additive,
}

/// A light that survived culling, with the geometry it is drawn with.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedLight {
    pub id: LightId,
    pub strategy: LightStrategyKey,
    /// Distance beyond which the light has no visible effect.
    pub effective_distance: fre,
    /// Transform from the model space of the light's volume mesh to world
    /// space, absent for directional lights.
    pub volume_to_world: Option<Matrix4<fre>>,
    /// Pixels the light can affect.
    pub scissor: ScissorRect,
}

/// One step of a frame, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    /// Clears the accumulation buffer when no light is drawn.
    ClearAccumulation,
    /// Marks the pixels inside the volume of the planned light with the given
    /// index in the stencil buffer.
    StencilVolume { light: usize },
    /// Accumulates the planned light with the given index.
    Light {
        light: usize,
        first: bool,
        strategy: LightStrategyKey,
    },
    AmbientOcclusion,
    AmbientOcclusionBlur(BlurDirection),
    Combine,
}

/// Ordered list of passes for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FramePlan {
    lights: Vec<PlannedLight>,
    steps: Vec<FrameStep>,
}

/// States of a light pass over one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightPassState {
    Uninitialised,
    /// Shared frame inputs are bound.
    Initialised,
    /// The parameters of a light are bound.
    Bound,
    /// The bound light has been drawn.
    Rendered,
    Cleanup,
}

/// Events driving a [`LightPassState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightPassEvent {
    Initialise,
    BindLight,
    Render,
    Finish,
    Reset,
}

impl LightStrategyKey {
    pub fn new(kind: LightKind, shadowed: bool) -> Self {
        Self { kind, shadowed }
    }

    /// All strategies, in the order lights are drawn in.
    pub fn all() -> impl Iterator<Item = Self> {
        LightKind::ALL
            .into_iter()
            .flat_map(|kind| [false, true].map(|shadowed| Self::new(kind, shadowed)))
    }

    pub fn uses_stencil_volume(&self) -> bool {
        self.kind.is_local()
    }
}

impl Blending {
    pub fn for_light(first: bool) -> Self {
        if first { Self::Replace } else { Self::Additive }
    }
}

impl FramePlan {
    /// Plans the passes for rendering the given lights from the given camera.
    /// Lights are drawn with directional lights first, then point and spot
    /// lights. Local lights whose volume covers no pixels are left out.
    pub fn build(
        lights: &SceneLights,
        camera: &Camera,
        screen_size: (u32, u32),
        max_light_distance: fre,
        sphere: &LightVolumeMesh<fre>,
        cone: &LightVolumeMesh<fre>,
        ambient_occlusion_enabled: bool,
    ) -> Self {
        let full_screen = ScissorRect {
            x: 0,
            y: 0,
            width: screen_size.0,
            height: screen_size.1,
        };

        let mut planned = Vec::with_capacity(lights.len());
        let mut steps = Vec::with_capacity(2 * lights.len() + 4);

        for (id, light) in lights.iter() {
            let strategy = LightStrategyKey::new(id.kind, light.produces_shadows());
            let effective_distance = light.max_effective_distance(max_light_distance);
            let volume_to_world =
                light_volume_to_world_transform(light, effective_distance, sphere, cone);

            let scissor = match (&volume_to_world, id.kind) {
                (Some(volume_to_world), LightKind::Point) => {
                    screen_bounds(&sphere.bounding_box_corners(), volume_to_world, camera, screen_size)
                }
                (Some(volume_to_world), LightKind::Spot) => {
                    screen_bounds(&cone.bounding_box_corners(), volume_to_world, camera, screen_size)
                }
                _ => ScreenBounds::Region(full_screen),
            };

            let ScreenBounds::Region(scissor) = scissor else {
                log::trace!("Culled {} light {} outside view", id.kind, id.index);
                continue;
            };

            let light_idx = planned.len();
            if strategy.uses_stencil_volume() {
                steps.push(FrameStep::StencilVolume { light: light_idx });
            }
            steps.push(FrameStep::Light {
                light: light_idx,
                first: light_idx == 0,
                strategy,
            });

            planned.push(PlannedLight {
                id,
                strategy,
                effective_distance,
                volume_to_world,
                scissor,
            });
        }

        if planned.is_empty() {
            steps.push(FrameStep::ClearAccumulation);
        }

        if ambient_occlusion_enabled {
            steps.push(FrameStep::AmbientOcclusion);
            steps.push(FrameStep::AmbientOcclusionBlur(BlurDirection::Horizontal));
            steps.push(FrameStep::AmbientOcclusionBlur(BlurDirection::Vertical));
        }

        steps.push(FrameStep::Combine);

        Self {
            lights: planned,
            steps,
        }
    }

    pub fn lights(&self) -> &[PlannedLight] {
        &self.lights
    }

    pub fn steps(&self) -> &[FrameStep] {
        &self.steps
    }

    /// Number of lights that will be drawn.
    pub fn n_drawn_lights(&self) -> usize {
        self.lights.len()
    }
}

impl PlannedLight {
    /// Transform from the light volume's model space to clip space, or the
    /// identity for directional lights, which are drawn as a full-screen
    /// triangle pair.
    pub fn volume_to_clip(&self, camera: &Camera) -> Matrix4<fre> {
        self.volume_to_world.map_or_else(Matrix4::identity, |volume_to_world| {
            camera.projection() * camera.view_transform().to_homogeneous() * volume_to_world
        })
    }

    /// World-space center of the light volume, if any.
    pub fn volume_origin(&self) -> Option<Point3<fre>> {
        self.volume_to_world
            .map(|volume_to_world| volume_to_world.transform_point(&Point3::origin()))
    }
}

impl LightPassState {
    /// Returns the state after the given event.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if the event is not
    /// valid in the current state.
    pub fn transition(self, event: LightPassEvent) -> Result<Self> {
        use LightPassEvent as E;
        use LightPassState as S;

        let next = match (self, event) {
            (S::Uninitialised, E::Initialise) => S::Initialised,
            (S::Initialised | S::Rendered, E::BindLight) => S::Bound,
            (S::Bound, E::Render) => S::Rendered,
            (S::Initialised | S::Rendered, E::Finish) => S::Cleanup,
            (S::Cleanup, E::Reset) => S::Uninitialised,
            (state, event) => {
                return Err(LightingError::contract_violation(format!(
                    "invalid light pass transition {event:?} in state {state:?}"
                ))
                .into());
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        error::lighting_error,
        light::{
            Attenuation, DirectionalLight, LightDescriptor, LightEmission, LightIntensity, PointLight, ShadowMapId,
            SpotLight,
        },
    };
    use nalgebra::{Isometry3, Vector3};

    fn emission() -> LightEmission {
        LightEmission::new(Vector3::new(1.0, 1.0, 1.0), LightIntensity::uniform(1.0))
    }

    fn camera() -> Camera {
        Camera::perspective(Isometry3::identity(), 1.0, 1.0, 0.1, 100.0)
    }

    fn plan(lights: &SceneLights, ambient_occlusion_enabled: bool) -> FramePlan {
        FramePlan::build(
            lights,
            &camera(),
            (64, 64),
            1000.0,
            &LightVolumeMesh::create_sphere(4),
            &LightVolumeMesh::create_cone(12),
            ambient_occlusion_enabled,
        )
    }

    fn point_light_at(position: Point3<fre>) -> LightDescriptor {
        LightDescriptor::Point(PointLight::new(
            emission(),
            position,
            Attenuation::new(1.0, 0.0, 4.0),
        ))
    }

    #[test]
    fn should_clear_accumulation_without_lights() {
        let plan = plan(&SceneLights::new(), false);
        assert_eq!(plan.steps(), &[FrameStep::ClearAccumulation, FrameStep::Combine]);
    }

    #[test]
    fn should_order_lights_by_kind_with_first_flag_on_first_light_only() {
        let mut lights = SceneLights::new();
        lights.add(LightDescriptor::Spot(SpotLight::new(
            emission(),
            Point3::new(0.0, 0.0, 0.0),
            -Vector3::z_axis(),
            Attenuation::new(1.0, 0.0, 1.0),
            0.2,
            0.4,
            1.0,
        )));
        lights.add(point_light_at(Point3::new(0.0, 0.0, -5.0)));
        lights.add(LightDescriptor::Directional(DirectionalLight::new(
            LightEmission::new(Vector3::new(1.0, 1.0, 1.0), LightIntensity::uniform(1.0))
                .with_shadow_map(ShadowMapId(0)),
            -Vector3::y_axis(),
        )));

        let plan = plan(&lights, true);
        assert_eq!(
            plan.steps(),
            &[
                FrameStep::Light {
                    light: 0,
                    first: true,
                    strategy: LightStrategyKey::new(LightKind::Directional, true),
                },
                FrameStep::StencilVolume { light: 1 },
                FrameStep::Light {
                    light: 1,
                    first: false,
                    strategy: LightStrategyKey::new(LightKind::Point, false),
                },
                FrameStep::StencilVolume { light: 2 },
                FrameStep::Light {
                    light: 2,
                    first: false,
                    strategy: LightStrategyKey::new(LightKind::Spot, false),
                },
                FrameStep::AmbientOcclusion,
                FrameStep::AmbientOcclusionBlur(BlurDirection::Horizontal),
                FrameStep::AmbientOcclusionBlur(BlurDirection::Vertical),
                FrameStep::Combine,
            ]
        );
        assert!(plan.lights()[0].volume_to_world.is_none());
        assert_eq!(plan.lights()[0].scissor.width, 64);
    }

    #[test]
    fn should_move_first_flag_past_culled_light() {
        let mut lights = SceneLights::new();
        lights.add(point_light_at(Point3::new(0.0, 0.0, 50.0)));
        lights.add(point_light_at(Point3::new(0.0, 0.0, -5.0)));

        let plan = plan(&lights, false);
        assert_eq!(plan.n_drawn_lights(), 1);
        assert_eq!(plan.lights()[0].id.index, 1);
        assert!(matches!(
            plan.steps()[1],
            FrameStep::Light { light: 0, first: true, .. }
        ));
    }

    #[test]
    fn should_blend_first_light_by_replacement() {
        assert_eq!(Blending::for_light(true), Blending::Replace);
        assert_eq!(Blending::for_light(false), Blending::Additive);
    }

    #[test]
    fn should_enumerate_all_six_strategies() {
        let keys: Vec<_> = LightStrategyKey::all().collect();
        assert_eq!(keys.len(), 6);
        assert_eq!(keys.iter().filter(|key| key.uses_stencil_volume()).count(), 4);
    }

    #[test]
    fn should_walk_light_pass_states_for_two_lights() {
        let mut state = LightPassState::Uninitialised;
        for event in [
            LightPassEvent::Initialise,
            LightPassEvent::BindLight,
            LightPassEvent::Render,
            LightPassEvent::BindLight,
            LightPassEvent::Render,
            LightPassEvent::Finish,
            LightPassEvent::Reset,
        ] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, LightPassState::Uninitialised);
    }

    #[test]
    fn should_reject_rendering_without_bound_light() {
        let error = LightPassState::Initialised
            .transition(LightPassEvent::Render)
            .unwrap_err();
        assert!(matches!(
            lighting_error(&error),
            Some(LightingError::ContractViolation(_))
        ));
        assert!(LightPassState::Bound.transition(LightPassEvent::Finish).is_err());
    }

    #[test]
    fn should_place_volume_at_light_position() {
        let mut lights = SceneLights::new();
        lights.add(point_light_at(Point3::new(1.0, 2.0, -5.0)));
        let plan = plan(&lights, false);
        let origin = plan.lights()[0].volume_origin().unwrap();
        assert!((origin - Point3::new(1.0, 2.0, -5.0)).norm() < 1e-5);
    }
}
