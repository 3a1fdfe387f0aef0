//! Lights a synthetic G-buffer on the GPU and checks the result against the
//! CPU reference.
//!
//! Usage: `deferred_lighting [config.ron]`

use anyhow::{Result, bail};
use deferred_lighting::{
    LightingConfig,
    camera::{Camera, pixel_center_texture_coords},
    combine::combine_pixel,
    fre,
    frame::{FramePlan, FrameStep},
    gbuffer::{GBufferImage, GBufferTexel},
    gpu::{
        self,
        rendering::{CONE_CIRCUMFERENCE_VERTEX_COUNT, DeferredLightingPipeline, SPHERE_RING_COUNT},
        texture::{GBufferTextures, read_half_float_texels},
    },
    light::{
        Attenuation, DirectionalLight, LightDescriptor, LightEmission, LightIntensity,
        LightUniform, PointLight, SceneLights, ShadowMapId, SpotLight,
        shading::{LightAccumulation, LightContribution, shade_image},
        volume::LightVolumeMesh,
    },
};
use nalgebra::{Isometry3, Point3, UnitVector3, Vector2, Vector3};
use std::{collections::HashMap, env};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
/// View-space distance from the camera to the lit wall.
const WALL_DISTANCE: fre = 5.0;
const TOLERANCE: fre = 2e-2;

fn main() -> Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => LightingConfig::from_ron_file(path)?,
        None => LightingConfig {
            scene_ambient_colour: Vector3::new(0.05, 0.05, 0.05),
            ..LightingConfig::default()
        },
    };

    let camera = Camera::perspective(
        Isometry3::identity(),
        fre::to_radians(60.0),
        WIDTH as fre / HEIGHT as fre,
        0.1,
        100.0,
    );
    let gbuffer_image = create_wall(&camera);
    let lights = create_lights();

    let graphics_device = gpu::connect_headless()?;

    let gbuffer = GBufferTextures::new(&graphics_device, WIDTH, HEIGHT)?;
    gbuffer.upload_image(&graphics_device, &gbuffer_image)?;

    let mut pipeline =
        DeferredLightingPipeline::new(graphics_device.clone(), config.clone(), (WIDTH, HEIGHT))?;

    // The directional light's shadow map is never provided, so it is lit
    // with the fallback map
    let shadow_maps: HashMap<ShadowMapId, wgpu::TextureView> = HashMap::new();
    pipeline.render_frame(&gbuffer, &lights, &camera, &shadow_maps, &[])?;

    let gpu_diffuse = read_half_float_texels(&graphics_device, &pipeline.accumulation_textures().diffuse)?;
    let gpu_specular = read_half_float_texels(&graphics_device, &pipeline.accumulation_textures().specular)?;
    let gpu_output = read_half_float_texels(&graphics_device, pipeline.output_texture())?;
    let gpu_occlusion = match pipeline.occlusion_texture() {
        Some(texture) => Some(read_half_float_texels(&graphics_device, texture)?),
        None => None,
    };

    let reference = accumulate_reference(&lights, &camera, &gbuffer_image, &config);

    let screen_size = Vector2::new(WIDTH as fre, HEIGHT as fre);
    let mut max_light_error: fre = 0.0;
    let mut max_output_error: fre = 0.0;

    for ((x, y), texel) in gbuffer_image.pixels() {
        let idx = (y * WIDTH + x) as usize;

        let expected_light = reference.get(x, y);
        let light_error = (gpu_diffuse[idx].xyz() - expected_light.diffuse)
            .abs()
            .max()
            .max((gpu_specular[idx].xyz() - expected_light.specular).abs().max());
        max_light_error = max_light_error.max(light_error);

        let ambient_occlusion = gpu_occlusion.as_ref().map_or(1.0, |occlusion| occlusion[idx].x);
        let view_position = camera
            .reconstruct_view_position(&pixel_center_texture_coords((x, y), screen_size), texel.depth);
        let expected_colour = combine_pixel(
            &config,
            texel,
            &view_position,
            expected_light,
            ambient_occlusion,
            &|_, _| Vector3::zeros(),
        );
        max_output_error = max_output_error.max((gpu_output[idx].xyz() - expected_colour).abs().max());
    }

    log::info!(
        "Maximum deviation from CPU reference: {max_light_error:.5} (accumulated light), {max_output_error:.5} (output)"
    );

    if max_light_error > TOLERANCE || max_output_error > TOLERANCE {
        bail!(
            "GPU lighting deviates from CPU reference by more than {TOLERANCE} \
             (light {max_light_error}, output {max_output_error})"
        );
    }

    println!("GPU and CPU lighting agree within {TOLERANCE}");
    Ok(())
}

/// A grey wall facing the camera and filling the view.
fn create_wall(camera: &Camera) -> GBufferImage {
    let (_, depth) = camera.project_to_texture_coords(&Point3::new(0.0, 0.0, -WALL_DISTANCE));
    let mut texel = GBufferTexel::diffuse(depth, Vector3::z(), Vector3::new(0.8, 0.8, 0.8));
    texel.specular = Vector3::new(0.3, 0.3, 0.3);
    texel.shininess = 32.0;
    texel.ambient = Vector3::new(0.2, 0.2, 0.2);
    GBufferImage::filled(WIDTH, HEIGHT, texel)
}

fn create_lights() -> SceneLights {
    let mut lights = SceneLights::new();

    lights.add(LightDescriptor::Directional(DirectionalLight::new(
        LightEmission::new(Vector3::new(1.0, 0.95, 0.9), LightIntensity::uniform(0.3))
            .with_shadow_map(ShadowMapId(0)),
        UnitVector3::new_normalize(Vector3::new(0.3, -0.2, -1.0)),
    )));

    lights.add(LightDescriptor::Point(PointLight::new(
        LightEmission::new(Vector3::new(1.0, 0.4, 0.2), LightIntensity::uniform(2.0)),
        Point3::new(-1.0, 0.5, -WALL_DISTANCE + 1.0),
        Attenuation::new(1.0, 0.5, 2.0),
    )));

    lights.add(LightDescriptor::Spot(SpotLight::new(
        LightEmission::new(Vector3::new(0.2, 0.5, 1.0), LightIntensity::uniform(3.0)),
        Point3::new(1.0, -0.5, -WALL_DISTANCE + 2.0),
        UnitVector3::new_normalize(Vector3::new(0.0, 0.0, -1.0)),
        Attenuation::new(1.0, 0.2, 0.5),
        fre::to_radians(15.0),
        fre::to_radians(25.0),
        2.0,
    )));

    lights
}

/// Accumulates the lights on the CPU in the order the GPU draws them.
fn accumulate_reference(
    lights: &SceneLights,
    camera: &Camera,
    gbuffer_image: &GBufferImage,
    config: &LightingConfig,
) -> LightAccumulation {
    let sphere = LightVolumeMesh::create_sphere(SPHERE_RING_COUNT);
    let cone = LightVolumeMesh::create_cone(CONE_CIRCUMFERENCE_VERTEX_COUNT);
    let plan = FramePlan::build(
        lights,
        camera,
        (WIDTH, HEIGHT),
        config.max_light_distance,
        &sphere,
        &cone,
        false,
    );

    let mut accumulation = LightAccumulation::new(WIDTH, HEIGHT);

    for step in plan.steps() {
        let FrameStep::Light { light, first, .. } = *step else {
            continue;
        };
        let planned = &plan.lights()[light];
        let Some(light_ref) = lights.get(planned.id) else {
            continue;
        };
        let uniform = LightUniform::new(
            light_ref,
            camera,
            planned.volume_to_clip(camera),
            planned.effective_distance,
        );
        let contributions = shade_image(planned.id.kind, &uniform, gbuffer_image, camera, |_, _| 1.0);

        accumulation.render_light(first, |x, y| {
            let contribution = if planned.scissor.contains((x, y)) {
                contributions[(y * WIDTH + x) as usize].unwrap_or_default()
            } else {
                LightContribution::zero()
            };
            Some(contribution)
        });
    }

    accumulation
}
