//! Layout of the geometry buffer consumed by the lighting stage and the
//! encoding of material flags stored in it.

use crate::fre;
use nalgebra::{Vector3, Vector4};

/// Texture format of the depth-stencil channel.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Largest environment map index that can be encoded in the material flags.
/// Index zero means "no environment map", so the largest usable slot is
/// `MAX_ENCODED_ENVIRONMENT_MAP_INDEX - 1`.
pub const MAX_ENCODED_ENVIRONMENT_MAP_INDEX: u8 = 0x1F;

pub(crate) const RECEIVER_MASK: u32 = 0x80;
pub(crate) const REFRACTION_MASK: u32 = 0x40;
pub(crate) const REFLECTION_MASK: u32 = 0x20;
pub(crate) const ENVIRONMENT_MAP_INDEX_MASK: u32 = 0x1F;

/// The channels making up the geometry buffer.
///
/// All channels share the same pixel dimensions and are written exactly once
/// per frame by the geometry pass before any lighting pass reads them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GBufferChannel {
    /// Depth and stencil.
    Depth,
    /// View-space normal (xyz) and encoded material flags (w).
    Data1,
    /// Diffuse albedo (xyz) and shininess (w).
    Data2,
    /// Specular colour (xyz) and material ambient occlusion (w).
    Data3,
    /// Emissive colour (xyz) and refraction ratio (w).
    Data4,
    /// Material ambient colour (xyz).
    Data5,
}

/// Flags describing how a pixel's material interacts with shadows and
/// environment maps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaterialFlags {
    /// Whether the pixel receives shadows.
    pub receiver: bool,
    /// Whether the pixel reflects its environment map.
    pub reflection: bool,
    /// Whether the pixel refracts its environment map.
    pub refraction: bool,
    /// Environment map index, where zero means no environment map and `n`
    /// refers to environment map slot `n - 1`.
    pub environment_map_index: u8,
}

/// All data the geometry pass stores for a single pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct GBufferTexel {
    pub depth: fre,
    pub normal: Vector3<fre>,
    pub flags: MaterialFlags,
    pub albedo: Vector3<fre>,
    pub shininess: fre,
    pub specular: Vector3<fre>,
    pub occlusion: fre,
    pub emissive: Vector3<fre>,
    pub refraction_ratio: fre,
    pub ambient: Vector3<fre>,
}

impl GBufferChannel {
    /// All channels, depth first.
    pub const ALL: [Self; 6] = [
        Self::Depth,
        Self::Data1,
        Self::Data2,
        Self::Data3,
        Self::Data4,
        Self::Data5,
    ];

    /// The colour channels in binding order.
    pub const COLOR: [Self; 5] = [Self::Data1, Self::Data2, Self::Data3, Self::Data4, Self::Data5];

    /// Returns the texture format used for the channel.
    pub const fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Depth => DEPTH_STENCIL_FORMAT,
            Self::Data1 => wgpu::TextureFormat::Rgba32Float,
            Self::Data2 | Self::Data3 | Self::Data4 | Self::Data5 => {
                wgpu::TextureFormat::Rgba16Float
            }
        }
    }

    /// Returns the binding slot of the channel in the G-buffer bind group.
    pub const fn binding(&self) -> u32 {
        match self {
            Self::Depth => 0,
            Self::Data1 => 1,
            Self::Data2 => 2,
            Self::Data3 => 3,
            Self::Data4 => 4,
            Self::Data5 => 5,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Depth => "G-buffer depth",
            Self::Data1 => "G-buffer data 1",
            Self::Data2 => "G-buffer data 2",
            Self::Data3 => "G-buffer data 3",
            Self::Data4 => "G-buffer data 4",
            Self::Data5 => "G-buffer data 5",
        }
    }
}

impl std::fmt::Display for GBufferChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl MaterialFlags {
    pub fn new(
        receiver: bool,
        reflection: bool,
        refraction: bool,
        environment_map_index: u8,
    ) -> Self {
        Self {
            receiver,
            reflection,
            refraction,
            environment_map_index,
        }
    }

    /// Returns the environment map slot referenced by the flags, or [`None`]
    /// if no environment map is referenced.
    pub fn environment_map_slot(&self) -> Option<u32> {
        (self.environment_map_index > 0).then(|| u32::from(self.environment_map_index) - 1)
    }

    /// Whether the pixel should be shaded from its environment map.
    pub fn uses_environment_map(&self) -> bool {
        self.environment_map_index > 0 && (self.reflection || self.refraction)
    }

    /// Packs the flags into a single float, see [`encode_material`].
    pub fn encode(&self) -> fre {
        encode_material(
            self.receiver,
            self.reflection,
            self.refraction,
            self.environment_map_index,
        )
    }

    /// Unpacks flags from a single float, see [`decode_material`].
    pub fn decode(encoded: fre) -> Self {
        decode_material(encoded)
    }
}

/// Packs material flags into a single floating-point channel value.
///
/// The shadow receiver flag occupies bit 7, refraction bit 6, reflection bit 5
/// and the environment map index bits 0-4. Callers must keep the index within
/// [`MAX_ENCODED_ENVIRONMENT_MAP_INDEX`]; larger indices are clamped.
pub fn encode_material(
    receiver: bool,
    reflection: bool,
    refraction: bool,
    environment_map_index: u8,
) -> fre {
    let mut bits = u32::from(environment_map_index.min(MAX_ENCODED_ENVIRONMENT_MAP_INDEX));
    if receiver {
        bits |= RECEIVER_MASK;
    }
    if refraction {
        bits |= REFRACTION_MASK;
    }
    if reflection {
        bits |= REFLECTION_MASK;
    }
    bits as fre
}

/// Unpacks material flags packed with [`encode_material`]. The value is
/// rounded to the nearest integer first, so small errors introduced by
/// storage are tolerated.
pub fn decode_material(encoded: fre) -> MaterialFlags {
    let bits = encoded.round().clamp(0.0, 255.0) as u32;
    MaterialFlags {
        receiver: bits & RECEIVER_MASK != 0,
        reflection: bits & REFLECTION_MASK != 0,
        refraction: bits & REFRACTION_MASK != 0,
        environment_map_index: (bits & ENVIRONMENT_MAP_INDEX_MASK) as u8,
    }
}

impl GBufferTexel {
    /// Creates a texel for a diffuse surface at the given depth.
    pub fn diffuse(depth: fre, normal: Vector3<fre>, albedo: Vector3<fre>) -> Self {
        Self {
            depth,
            normal,
            albedo,
            ..Self::default()
        }
    }

    /// Returns the value stored in the given colour channel.
    ///
    /// # Panics
    /// If `channel` is [`GBufferChannel::Depth`].
    pub fn channel_value(&self, channel: GBufferChannel) -> Vector4<fre> {
        match channel {
            GBufferChannel::Depth => panic!("Depth is not a colour channel"),
            GBufferChannel::Data1 => self.normal.push(self.flags.encode()),
            GBufferChannel::Data2 => self.albedo.push(self.shininess),
            GBufferChannel::Data3 => self.specular.push(self.occlusion),
            GBufferChannel::Data4 => self.emissive.push(self.refraction_ratio),
            GBufferChannel::Data5 => self.ambient.push(0.0),
        }
    }

    /// Reassembles a texel from its depth and colour channel values, given in
    /// [`GBufferChannel::COLOR`] order.
    pub fn from_channel_values(depth: fre, values: &[Vector4<fre>; 5]) -> Self {
        let [data1, data2, data3, data4, data5] = values;
        Self {
            depth,
            normal: data1.xyz(),
            flags: decode_material(data1.w),
            albedo: data2.xyz(),
            shininess: data2.w,
            specular: data3.xyz(),
            occlusion: data3.w,
            emissive: data4.xyz(),
            refraction_ratio: data4.w,
            ambient: data5.xyz(),
        }
    }

    /// Whether the texel holds geometry, as opposed to the cleared far plane.
    pub fn is_covered(&self) -> bool {
        self.depth < 1.0
    }
}

impl Default for GBufferTexel {
    fn default() -> Self {
        Self {
            depth: 1.0,
            normal: Vector3::z(),
            flags: MaterialFlags::default(),
            albedo: Vector3::zeros(),
            shininess: 1.0,
            specular: Vector3::zeros(),
            occlusion: 1.0,
            emissive: Vector3::zeros(),
            refraction_ratio: 1.0,
            ambient: Vector3::zeros(),
        }
    }
}

/// CPU-side copy of a geometry buffer, stored row by row from the top left
/// pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct GBufferImage {
    width: u32,
    height: u32,
    texels: Vec<GBufferTexel>,
}

impl GBufferImage {
    /// Creates an image where every pixel holds the given texel.
    pub fn filled(width: u32, height: u32, texel: GBufferTexel) -> Self {
        Self {
            width,
            height,
            texels: vec![texel; (width * height) as usize],
        }
    }

    /// Gathers an image by evaluating `texel` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut texel: impl FnMut(u32, u32) -> GBufferTexel) -> Self {
        let texels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| texel(x, y))
            .collect();
        Self {
            width,
            height,
            texels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[GBufferTexel] {
        &self.texels
    }

    /// Returns the texel of the given pixel, clamping the coordinates to the
    /// image edges.
    pub fn texel_clamped(&self, x: i64, y: i64) -> &GBufferTexel {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        &self.texels[(y * self.width + x) as usize]
    }

    pub fn texel(&self, x: u32, y: u32) -> &GBufferTexel {
        &self.texels[(y * self.width + x) as usize]
    }

    pub fn texel_mut(&mut self, x: u32, y: u32) -> &mut GBufferTexel {
        &mut self.texels[(y * self.width + x) as usize]
    }

    /// Iterates over all pixel coordinates with their texels.
    pub fn pixels(&self) -> impl Iterator<Item = ((u32, u32), &GBufferTexel)> {
        let width = self.width;
        self.texels
            .iter()
            .enumerate()
            .map(move |(idx, texel)| ((idx as u32 % width, idx as u32 / width), texel))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn flags_strategy()(
            receiver in any::<bool>(),
            reflection in any::<bool>(),
            refraction in any::<bool>(),
            environment_map_index in 0..=MAX_ENCODED_ENVIRONMENT_MAP_INDEX,
        ) -> MaterialFlags {
            MaterialFlags::new(receiver, reflection, refraction, environment_map_index)
        }
    }

    proptest! {
        #[test]
        fn should_decode_to_encoded_flags(flags in flags_strategy()) {
            prop_assert_eq!(MaterialFlags::decode(flags.encode()), flags);
        }

        #[test]
        fn should_decode_despite_small_storage_error(
            flags in flags_strategy(),
            error in -0.4_f32..0.4,
        ) {
            prop_assert_eq!(decode_material(flags.encode() + error), flags);
        }

        #[test]
        fn should_keep_encoded_value_within_eight_bits(flags in flags_strategy()) {
            let encoded = flags.encode();
            prop_assert!((0.0..=255.0).contains(&encoded));
            prop_assert_eq!(encoded.fract(), 0.0);
        }
    }

    #[test]
    fn should_round_trip_receiver_with_reflection_and_index_three() {
        let encoded = encode_material(true, true, false, 3);
        assert_eq!(
            decode_material(encoded),
            MaterialFlags::new(true, true, false, 3)
        );
    }

    #[test]
    fn should_place_flags_in_expected_bits() {
        assert_eq!(encode_material(true, false, false, 0), 128.0);
        assert_eq!(encode_material(false, false, true, 0), 64.0);
        assert_eq!(encode_material(false, true, false, 0), 32.0);
        assert_eq!(encode_material(false, false, false, 7), 7.0);
        assert_eq!(encode_material(true, true, true, 31), 255.0);
    }

    #[test]
    fn should_clamp_too_large_environment_map_index() {
        let flags = decode_material(encode_material(false, true, false, 200));
        assert_eq!(flags.environment_map_index, MAX_ENCODED_ENVIRONMENT_MAP_INDEX);
        assert!(flags.reflection);
        assert!(!flags.refraction);
    }

    #[test]
    fn should_map_index_to_slot_one_below() {
        assert_eq!(MaterialFlags::new(false, true, false, 0).environment_map_slot(), None);
        assert_eq!(MaterialFlags::new(false, true, false, 1).environment_map_slot(), Some(0));
        assert_eq!(MaterialFlags::new(false, true, false, 4).environment_map_slot(), Some(3));
    }

    #[test]
    fn should_only_use_environment_map_with_index_and_reflection_or_refraction() {
        assert!(!MaterialFlags::new(false, false, false, 2).uses_environment_map());
        assert!(!MaterialFlags::new(false, true, true, 0).uses_environment_map());
        assert!(MaterialFlags::new(false, false, true, 2).uses_environment_map());
    }

    #[test]
    fn should_reassemble_texel_from_channel_values() {
        let texel = GBufferTexel {
            depth: 0.7,
            normal: Vector3::new(0.0, 1.0, 0.0),
            flags: MaterialFlags::new(true, false, true, 2),
            albedo: Vector3::new(0.1, 0.2, 0.3),
            shininess: 32.0,
            specular: Vector3::new(0.5, 0.5, 0.5),
            occlusion: 0.9,
            emissive: Vector3::new(0.0, 0.0, 0.1),
            refraction_ratio: 0.66,
            ambient: Vector3::new(0.2, 0.2, 0.2),
        };
        let values = GBufferChannel::COLOR.map(|channel| texel.channel_value(channel));
        assert_eq!(GBufferTexel::from_channel_values(0.7, &values), texel);
    }

    #[test]
    fn should_use_full_precision_for_normals_and_flags() {
        assert_eq!(
            GBufferChannel::Data1.texture_format(),
            wgpu::TextureFormat::Rgba32Float
        );
        assert!(GBufferChannel::COLOR.iter().all(|channel| channel.binding() > 0));
    }
}
