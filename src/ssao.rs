//! Screen-space ambient occlusion.

use crate::{
    camera::{Camera, pixel_center_texture_coords},
    config::{AmbientOcclusionConfig, MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT},
    error::LightingError,
    fre,
    gbuffer::GBufferImage,
    light::shading::safe_normalize,
};
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Vector2, Vector3, Vector4};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Width and height of the tiled random rotation texture.
pub const NOISE_TEXTURE_SIZE: u32 = 4;

/// Offsets of the box blur taps along each axis.
pub const BLUR_OFFSETS: [i32; 4] = [-2, -1, 0, 1];

const MAX_SAMPLE_COUNT: usize = MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT as usize;
const NOISE_TEXEL_COUNT: usize = (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE) as usize;

/// Sample offsets within the unit hemisphere around the surface normal,
/// concentrated towards the origin, together with the random rotation
/// vectors tiled over the screen.
#[derive(Clone, Debug, PartialEq)]
pub struct SsaoKernel {
    samples: Vec<Vector3<fre>>,
    noise: [Vector3<fre>; NOISE_TEXEL_COUNT],
}

/// Uniform holding the kernel and sampling parameters.
///
/// The size of this struct has to be a multiple of 16 bytes as required for
/// uniforms.
#[repr(C)]
#[derive(Copy, Clone, Debug, Zeroable, Pod)]
pub struct AmbientOcclusionUniform {
    sample_offsets: [Vector4<fre>; MAX_SAMPLE_COUNT],
    sample_count: u32,
    sample_radius: fre,
    bias: fre,
    sample_normalization: fre,
}

assert_uniform_valid!(AmbientOcclusionUniform);

/// Single-channel image of ambient occlusion values, where one means
/// unoccluded.
#[derive(Clone, Debug, PartialEq)]
pub struct OcclusionImage {
    width: u32,
    height: u32,
    values: Vec<fre>,
}

/// The axis a blur pass filters along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl SsaoKernel {
    /// Generates a kernel with the given number of samples from a random
    /// number generator seeded with `seed`.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if the sample count is
    /// zero or exceeds [`MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT`].
    pub fn new(sample_count: u32, seed: u64) -> Result<Self> {
        if sample_count == 0 || sample_count > MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT {
            return Err(LightingError::contract_violation(format!(
                "ambient occlusion kernel needs 1..={} samples, got {}",
                MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT, sample_count
            ))
            .into());
        }

        let mut rng = StdRng::seed_from_u64(seed);

        let samples = (0..sample_count)
            .map(|idx| {
                let direction = safe_normalize(&Vector3::new(
                    rng.random::<fre>() * 2.0 - 1.0,
                    rng.random::<fre>() * 2.0 - 1.0,
                    rng.random::<fre>(),
                ));
                let direction = if direction == Vector3::zeros() {
                    Vector3::z()
                } else {
                    direction
                };
                // Concentrate samples near the center
                let fraction = idx as fre / sample_count as fre;
                let scale = 0.1 + 0.9 * fraction * fraction;
                direction * rng.random::<fre>() * scale
            })
            .collect();

        let noise = std::array::from_fn(|_| {
            Vector3::new(
                rng.random::<fre>() * 2.0 - 1.0,
                rng.random::<fre>() * 2.0 - 1.0,
                0.0,
            )
        });

        Ok(Self { samples, noise })
    }

    /// Generates the kernel described by the given configuration.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn from_config(config: &AmbientOcclusionConfig) -> Result<Self> {
        Self::new(config.sample_count, config.seed)
    }

    pub fn samples(&self) -> &[Vector3<fre>] {
        &self.samples
    }

    pub fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }

    /// Rotation vectors of the noise texture, row by row.
    pub fn noise(&self) -> &[Vector3<fre>; NOISE_TEXEL_COUNT] {
        &self.noise
    }

    /// Returns the rotation vector tiled onto the given pixel.
    pub fn noise_for_pixel(&self, pixel: (u32, u32)) -> &Vector3<fre> {
        let x = pixel.0 % NOISE_TEXTURE_SIZE;
        let y = pixel.1 % NOISE_TEXTURE_SIZE;
        &self.noise[(y * NOISE_TEXTURE_SIZE + x) as usize]
    }

    /// Noise texel data as four-component floats, ready for upload to an
    /// `Rgba32Float` texture.
    pub fn noise_texels(&self) -> Vec<[fre; 4]> {
        self.noise.iter().map(|v| [v.x, v.y, v.z, 0.0]).collect()
    }

    pub fn create_uniform(&self, config: &AmbientOcclusionConfig) -> AmbientOcclusionUniform {
        let mut sample_offsets = [Vector4::zeros(); MAX_SAMPLE_COUNT];
        for (offset, sample) in sample_offsets.iter_mut().zip(&self.samples) {
            *offset = sample.push(0.0);
        }
        AmbientOcclusionUniform {
            sample_offsets,
            sample_count: self.sample_count(),
            sample_radius: config.radius,
            bias: config.bias,
            sample_normalization: 1.0 / self.sample_count() as fre,
        }
    }
}

impl OcclusionImage {
    pub fn filled(width: u32, height: u32, value: fre) -> Self {
        Self {
            width,
            height,
            values: vec![value; (width * height) as usize],
        }
    }

    pub fn from_values(width: u32, height: u32, values: Vec<fre>) -> Self {
        assert_eq!(values.len(), (width * height) as usize);
        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[fre] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> fre {
        self.values[(y * self.width + x) as usize]
    }

    fn get_clamped(&self, x: i64, y: i64) -> fre {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.get(x, y)
    }

    /// Applies one pass of the separable box blur.
    pub fn blurred(&self, direction: BlurDirection) -> Self {
        let mut values = Vec::with_capacity(self.values.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let sum: fre = BLUR_OFFSETS
                    .iter()
                    .map(|&offset| {
                        let offset = i64::from(offset);
                        match direction {
                            BlurDirection::Horizontal => self.get_clamped(i64::from(x) + offset, i64::from(y)),
                            BlurDirection::Vertical => self.get_clamped(i64::from(x), i64::from(y) + offset),
                        }
                    })
                    .sum();
                values.push(sum / BLUR_OFFSETS.len() as fre);
            }
        }
        Self {
            width: self.width,
            height: self.height,
            values,
        }
    }

    /// Applies the full box blur as a horizontal followed by a vertical
    /// pass.
    pub fn box_blurred(&self) -> Self {
        self.blurred(BlurDirection::Horizontal)
            .blurred(BlurDirection::Vertical)
    }
}

pub fn smoothstep(edge0: fre, edge1: fre, x: fre) -> fre {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Computes the unblurred ambient occlusion of every pixel in the geometry
/// buffer image. Pixels without geometry are unoccluded.
pub fn compute_occlusion(
    gbuffer: &GBufferImage,
    camera: &Camera,
    kernel: &SsaoKernel,
    config: &AmbientOcclusionConfig,
) -> OcclusionImage {
    let screen_size = Vector2::new(gbuffer.width() as fre, gbuffer.height() as fre);

    let values = gbuffer
        .pixels()
        .map(|(pixel, texel)| {
            if !texel.is_covered() {
                return 1.0;
            }
            let position = camera
                .reconstruct_view_position(&pixel_center_texture_coords(pixel, screen_size), texel.depth);
            let normal = safe_normalize(&texel.normal);

            let random = kernel.noise_for_pixel(pixel);
            let mut tangent = safe_normalize(&(random - normal * random.dot(&normal)));
            if tangent == Vector3::zeros() {
                tangent = safe_normalize(&normal.cross(&Vector3::x()));
                if tangent == Vector3::zeros() {
                    tangent = safe_normalize(&normal.cross(&Vector3::y()));
                }
            }
            let bitangent = normal.cross(&tangent);

            let mut occlusion = 0.0;
            for sample in kernel.samples() {
                let sample_position = position
                    + (tangent * sample.x + bitangent * sample.y + normal * sample.z) * config.radius;

                let (texture_coords, _) = camera.project_to_texture_coords(&sample_position);
                let sample_x = (texture_coords.x * screen_size.x).floor() as i64;
                let sample_y = (texture_coords.y * screen_size.y).floor() as i64;
                let surface_depth = gbuffer.texel_clamped(sample_x, sample_y).depth;
                let surface_z = camera
                    .reconstruct_view_position(&texture_coords, surface_depth)
                    .z;

                let range_check =
                    smoothstep(0.0, 1.0, config.radius / (position.z - surface_z).abs().max(1e-6));
                if surface_z >= sample_position.z + config.bias {
                    occlusion += range_check;
                }
            }
            1.0 - occlusion / kernel.sample_count() as fre
        })
        .collect();

    OcclusionImage {
        width: gbuffer.width(),
        height: gbuffer.height(),
        values,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::lighting_error, gbuffer::GBufferTexel};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Point3};
    use proptest::prelude::*;

    fn camera() -> Camera {
        Camera::perspective(Isometry3::identity(), 1.0, 1.0, 0.1, 100.0)
    }

    fn depth_at(camera: &Camera, z: fre) -> fre {
        camera.project_to_texture_coords(&Point3::new(0.0, 0.0, z)).1
    }

    #[test]
    fn should_generate_samples_within_unit_hemisphere() {
        let kernel = SsaoKernel::new(64, 7).unwrap();
        assert_eq!(kernel.sample_count(), 64);
        for sample in kernel.samples() {
            assert!(sample.z >= 0.0);
            assert!(sample.norm() <= 1.0 + 1e-6);
        }
        for noise in kernel.noise() {
            assert_eq!(noise.z, 0.0);
            assert!(noise.x.abs() <= 1.0 && noise.y.abs() <= 1.0);
        }
    }

    #[test]
    fn should_generate_same_kernel_for_same_seed() {
        assert_eq!(SsaoKernel::new(16, 3).unwrap(), SsaoKernel::new(16, 3).unwrap());
        assert_ne!(SsaoKernel::new(16, 3).unwrap(), SsaoKernel::new(16, 4).unwrap());
    }

    #[test]
    fn should_reject_invalid_sample_counts() {
        for count in [0, MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT + 1] {
            let error = SsaoKernel::new(count, 0).unwrap_err();
            assert!(matches!(
                lighting_error(&error),
                Some(LightingError::ContractViolation(_))
            ));
        }
    }

    #[test]
    fn should_fill_uniform_with_kernel_samples() {
        let config = AmbientOcclusionConfig {
            sample_count: 8,
            ..AmbientOcclusionConfig::default()
        };
        let kernel = SsaoKernel::from_config(&config).unwrap();
        let uniform = kernel.create_uniform(&config);
        assert_eq!(uniform.sample_count, 8);
        assert_eq!(uniform.sample_offsets[7].xyz(), kernel.samples()[7]);
        assert_eq!(uniform.sample_offsets[8], Vector4::zeros());
        assert_abs_diff_eq!(uniform.sample_normalization, 0.125);
    }

    #[test]
    fn should_not_occlude_flat_wall_facing_camera() {
        let camera = camera();
        let gbuffer = GBufferImage::filled(
            16,
            16,
            GBufferTexel::diffuse(depth_at(&camera, -5.0), Vector3::z(), Vector3::new(1.0, 1.0, 1.0)),
        );
        let kernel = SsaoKernel::new(16, 0).unwrap();
        let occlusion = compute_occlusion(&gbuffer, &camera, &kernel, &AmbientOcclusionConfig::default());
        for &value in occlusion.values() {
            assert_abs_diff_eq!(value, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn should_occlude_pixels_next_to_closer_surface() {
        let camera = camera();
        let near_depth = depth_at(&camera, -4.0);
        let far_depth = depth_at(&camera, -5.0);
        let gbuffer = GBufferImage::from_fn(32, 32, |x, _| {
            GBufferTexel::diffuse(
                if x < 16 { near_depth } else { far_depth },
                Vector3::z(),
                Vector3::new(1.0, 1.0, 1.0),
            )
        });
        let config = AmbientOcclusionConfig {
            radius: 1.5,
            sample_count: 32,
            ..AmbientOcclusionConfig::default()
        };
        let kernel = SsaoKernel::from_config(&config).unwrap();
        let occlusion = compute_occlusion(&gbuffer, &camera, &kernel, &config);
        assert!(occlusion.get(16, 16) < 1.0);
        assert_abs_diff_eq!(occlusion.get(31, 16), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn should_leave_uncovered_pixels_unoccluded() {
        let gbuffer = GBufferImage::filled(4, 4, GBufferTexel::default());
        let kernel = SsaoKernel::new(4, 0).unwrap();
        let occlusion = compute_occlusion(&gbuffer, &camera(), &kernel, &AmbientOcclusionConfig::default());
        assert!(occlusion.values().iter().all(|&value| value == 1.0));
    }

    #[test]
    fn should_keep_constant_image_unchanged_by_blur() {
        let image = OcclusionImage::filled(5, 3, 0.7);
        for &value in image.box_blurred().values() {
            assert_abs_diff_eq!(value, 0.7, epsilon = 1e-6);
        }
    }

    proptest! {
        #[test]
        fn should_blur_separably_like_full_box_filter(
            values in prop::collection::vec(0.0_f32..1.0, 35),
        ) {
            let image = OcclusionImage::from_values(7, 5, values);
            let separable = image.box_blurred();

            for y in 0..5_i64 {
                for x in 0..7_i64 {
                    let mut sum = 0.0;
                    for dy in BLUR_OFFSETS {
                        for dx in BLUR_OFFSETS {
                            sum += image.get_clamped(x + i64::from(dx), y + i64::from(dy));
                        }
                    }
                    let expected = sum / 16.0;
                    prop_assert!((separable.get(x as u32, y as u32) - expected).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn should_follow_smoothstep_shape() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_abs_diff_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
    }
}
