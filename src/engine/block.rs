use std::{collections::HashMap, sync::LazyLock};

use bevy::{color::ColorToComponents, prelude::*};
use log::debug;

use super::uniform::{RAY_MARCH_UNIFORMS, TextureRef, UniformField, UniformKind, UniformSink};

const ARRAY_STRIDE: usize = 16;

/// Where a uniform lives once the block is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSlot {
    /// Byte offset and size inside the uniform buffer.
    Bytes { offset: usize, size: usize },
    /// Index into the texture slots, in declaration order.
    Texture(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub kind: UniformKind,
    pub slot: UniformSlot,
}

/// Byte layout of a uniform table, using the std140 alignment rules WGSL
/// applies to the uniform address space.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    entries: HashMap<&'static str, LayoutEntry>,
    texture_names: Vec<&'static str>,
    size: usize,
}

impl UniformKind {
    /// `(align, size)` in bytes, `None` for resources bound outside the buffer.
    fn std140(self) -> Option<(usize, usize)> {
        match self {
            UniformKind::Float | UniformKind::Int => Some((4, 4)),
            UniformKind::Vec2 => Some((8, 8)),
            UniformKind::Vec3 => Some((16, 12)),
            UniformKind::Vec4 | UniformKind::Color => Some((16, 16)),
            UniformKind::Mat4 => Some((16, 64)),
            UniformKind::ColorArray(len) => Some((ARRAY_STRIDE, ARRAY_STRIDE * len)),
            UniformKind::Texture => None,
        }
    }
}

impl UniformLayout {
    pub fn new(fields: &[UniformField]) -> Self {
        let mut entries = HashMap::with_capacity(fields.len());
        let mut texture_names = Vec::new();
        let mut cursor = 0usize;

        for field in fields {
            let slot = match field.kind.std140() {
                Some((align, size)) => {
                    let offset = cursor.next_multiple_of(align);
                    cursor = offset + size;
                    UniformSlot::Bytes { offset, size }
                }
                None => {
                    texture_names.push(field.name);
                    UniformSlot::Texture(texture_names.len() - 1)
                }
            };

            entries.insert(
                field.name,
                LayoutEntry {
                    kind: field.kind,
                    slot,
                },
            );
        }

        Self {
            entries,
            texture_names,
            size: cursor.next_multiple_of(16).max(16),
        }
    }

    /// Layout of [`RAY_MARCH_UNIFORMS`], built once.
    pub fn ray_march() -> &'static Self {
        static LAYOUT: LazyLock<UniformLayout> =
            LazyLock::new(|| UniformLayout::new(RAY_MARCH_UNIFORMS));
        &LAYOUT
    }

    pub fn get(&self, name: &str) -> Option<&LayoutEntry> {
        self.entries.get(name)
    }

    /// Size of the uniform buffer in bytes, a multiple of 16.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn texture_names(&self) -> &[&'static str] {
        &self.texture_names
    }
}

/// CPU copy of the ray marching uniform buffer, filled through [`UniformSink`].
#[derive(Debug, Clone)]
pub struct UniformBlock<'l> {
    layout: &'l UniformLayout,
    bytes: Vec<u8>,
    textures: Vec<Option<TextureRef>>,
}

impl<'l> UniformBlock<'l> {
    pub fn new(layout: &'l UniformLayout) -> Self {
        Self {
            bytes: vec![0; layout.size()],
            textures: vec![None; layout.texture_names().len()],
            layout,
        }
    }

    pub fn layout(&self) -> &'l UniformLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn texture(&self, name: &str) -> Option<TextureRef> {
        match self.layout.get(name)?.slot {
            UniformSlot::Texture(index) => self.textures[index],
            UniformSlot::Bytes { .. } => None,
        }
    }

    /// Reads back `len` floats starting at the slot of `name`.
    pub fn floats(&self, name: &str, len: usize) -> Option<Vec<f32>> {
        let UniformSlot::Bytes { offset, size } = self.layout.get(name)?.slot else {
            return None;
        };
        let bytes = self.bytes.get(offset..offset + (len * 4).min(size))?;
        Some(bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect())
    }

    fn write(&mut self, name: &str, kind: UniformKind, data: &[u8]) {
        let Some(entry) = self.layout.get(name) else {
            debug!("uniform `{name}` is not part of the block, ignored");
            return;
        };
        let UniformSlot::Bytes { offset, size } = entry.slot else {
            return;
        };
        if !same_shape(entry.kind, kind) {
            debug!(
                "uniform `{name}` declared as {:?}, written as {kind:?}, ignored",
                entry.kind
            );
            return;
        }

        let len = data.len().min(size);
        self.bytes[offset..offset + len].copy_from_slice(&data[..len]);
    }
}

/// Colors and vec4 share a layout, arrays may be written shorter than declared.
fn same_shape(declared: UniformKind, written: UniformKind) -> bool {
    match (declared, written) {
        (UniformKind::Color | UniformKind::Vec4, UniformKind::Color | UniformKind::Vec4) => true,
        (UniformKind::ColorArray(cap), UniformKind::ColorArray(len)) => len <= cap,
        (a, b) => a == b,
    }
}

impl UniformSink for UniformBlock<'_> {
    fn set_float(&mut self, name: &str, value: f32) {
        self.write(name, UniformKind::Float, bytemuck::bytes_of(&value));
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.write(name, UniformKind::Int, bytemuck::bytes_of(&value));
    }

    fn set_color(&mut self, name: &str, value: LinearRgba) {
        let data = value.to_f32_array();
        self.write(name, UniformKind::Color, bytemuck::cast_slice(&data));
    }

    fn set_color_array(&mut self, name: &str, value: &[LinearRgba]) {
        // A vec4 element already matches the 16 byte array stride.
        let data: Vec<f32> = value.iter().flat_map(|c| c.to_f32_array()).collect();
        self.write(
            name,
            UniformKind::ColorArray(value.len()),
            bytemuck::cast_slice(&data),
        );
    }

    fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.write(name, UniformKind::Vec2, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.write(name, UniformKind::Vec3, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.write(name, UniformKind::Vec4, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.write(
            name,
            UniformKind::Mat4,
            bytemuck::cast_slice(&value.to_cols_array()),
        );
    }

    fn set_texture(&mut self, name: &str, value: TextureRef) {
        match self.layout.get(name).map(|e| e.slot) {
            Some(UniformSlot::Texture(index)) => self.textures[index] = Some(value),
            _ => debug!("texture `{name}` is not part of the block, ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::render::render_resource::{ShaderType, encase::UniformBuffer};

    use super::*;
    use crate::engine::{
        camera::EffectParameters,
        frustum::compute_frustum,
        gradient::PALETTE_SIZE,
        uniform::{FrameUniforms, upload},
    };

    /// The uniform block as a WGSL struct would declare it, in table order.
    #[derive(ShaderType)]
    struct RayMarchBlock {
        cam_frustum: Mat4,
        cam_to_world: Mat4,
        max_distance: f32,
        max_iterations: i32,
        accuracy: f32,
        light_color: Vec4,
        light_dir: Vec3,
        light_intensity: f32,
        shadow_penumbra: f32,
        shadow_distance: Vec2,
        shadow_intensity: f32,
        ambient_occlusion_step_size: f32,
        ambient_occlusion_intensity: f32,
        ambient_occlusion_iterations: i32,
        reflection_count: i32,
        reflection_intensity: f32,
        env_reflection_intensity: f32,
        fog_intensity: f32,
        fog_color: Vec4,
        fog_min_distance: f32,
        fog_max_distance: f32,
        ground_color: Vec4,
        color_intensity: f32,
        sphere: Vec4,
        sphere_smooth: f32,
        degree_rotate: f32,
        sphere_colors: [Vec4; PALETTE_SIZE],
        sphere_mod_interval: Vec3,
        mandelbox: Vec4,
        mandelbox_iterations: i32,
        mandelbox_color: Vec4,
        mandelbulb: Vec4,
        mandelbulb_iterations: i32,
        mandelbulb_exponent: i32,
        mandelbulb_color: Vec4,
    }

    impl From<&FrameUniforms> for RayMarchBlock {
        fn from(f: &FrameUniforms) -> Self {
            let p = &f.params;
            Self {
                cam_frustum: f.cam_frustum,
                cam_to_world: f.cam_to_world,
                max_distance: p.max_distance,
                max_iterations: p.max_iterations,
                accuracy: p.accuracy,
                light_color: p.light_color.to_vec4(),
                light_dir: f.light_dir,
                light_intensity: p.light_intensity,
                shadow_penumbra: p.shadow_penumbra,
                shadow_distance: p.shadow_distance,
                shadow_intensity: p.shadow_intensity,
                ambient_occlusion_step_size: p.ambient_occlusion_step_size,
                ambient_occlusion_intensity: p.ambient_occlusion_intensity,
                ambient_occlusion_iterations: p.ambient_occlusion_iterations,
                reflection_count: p.reflection_count,
                reflection_intensity: p.reflection_intensity,
                env_reflection_intensity: p.env_reflection_intensity,
                fog_intensity: p.fog_intensity,
                fog_color: p.fog_color.to_vec4(),
                fog_min_distance: p.fog_min_distance,
                fog_max_distance: p.fog_max_distance,
                ground_color: p.ground_color.to_vec4(),
                color_intensity: p.color_intensity,
                sphere: f.sphere,
                sphere_smooth: p.sphere_smooth,
                degree_rotate: p.degree_rotate,
                sphere_colors: f.sphere_colors.map(|c| c.to_vec4()),
                sphere_mod_interval: p.sphere_mod_interval,
                mandelbox: f.mandelbox,
                mandelbox_iterations: p.mandelbox_iterations,
                mandelbox_color: p.mandelbox_color.to_vec4(),
                mandelbulb: f.mandelbulb,
                mandelbulb_iterations: p.mandelbulb_iterations,
                mandelbulb_exponent: p.mandelbulb_exponent,
                mandelbulb_color: p.mandelbulb_color.to_vec4(),
            }
        }
    }

    fn offset(layout: &UniformLayout, name: &str) -> usize {
        match layout.get(name).map(|e| e.slot) {
            Some(UniformSlot::Bytes { offset, .. }) => offset,
            other => panic!("{name} has no byte slot: {other:?}"),
        }
    }

    #[test]
    fn ray_march_layout_is_built_once() {
        let layout = UniformLayout::ray_march();
        assert!(std::ptr::eq(layout, UniformLayout::ray_march()));

        let block = UniformBlock::new(layout);
        assert!(std::ptr::eq(block.layout(), layout));
    }

    #[test]
    fn block_matches_the_wgsl_struct_layout() {
        let frame = FrameUniforms {
            cam_frustum: compute_frustum(60., 1.5).to_matrix(),
            cam_to_world: Mat4::from_translation(Vec3::new(1., 2., 3.)),
            light_dir: Vec3::new(0.3, -0.9, 0.1),
            sphere: Vec4::new(1., -2., 3., 0.5),
            mandelbulb: Vec4::new(-4., 0., 1., 1.5),
            mandelbox: Vec4::new(4., -1., -2., 2.),
            sphere_colors: std::array::from_fn(|i| {
                LinearRgba::new(i as f32 / 8., 0.25, 1. - i as f32 / 8., 0.75)
            }),
            reflection_cube: None,
            params: EffectParameters {
                shadow_distance: Vec2::new(0.2, 30.),
                sphere_mod_interval: Vec3::new(3., 0., 3.),
                degree_rotate: 45.,
                ..default()
            },
        };
        let mut block = UniformBlock::new(UniformLayout::ray_march());
        upload(&frame, &mut block);

        let mut expected = UniformBuffer::new(Vec::<u8>::new());
        expected.write(&RayMarchBlock::from(&frame)).unwrap();

        assert_eq!(block.as_bytes(), expected.into_inner().as_slice());
    }

    #[test]
    fn camera_matrices_lead_the_block() {
        let layout = UniformLayout::ray_march();

        assert_eq!(offset(&layout, "_CamFrustum"), 0);
        assert_eq!(offset(&layout, "_CamToWorld"), 64);
        assert_eq!(offset(&layout, "_maxDistance"), 128);
        assert_eq!(offset(&layout, "_maxIterations"), 132);
        assert_eq!(offset(&layout, "_accuracy"), 136);
        // Color after three scalars realigns to 16.
        assert_eq!(offset(&layout, "_lightColor"), 144);
        assert_eq!(offset(&layout, "_lightDir"), 160);
        // A scalar may fill the tail of a vec3.
        assert_eq!(offset(&layout, "_lightIntensity"), 172);
    }

    #[test]
    fn every_slot_respects_alignment() {
        let layout = UniformLayout::ray_march();

        for field in RAY_MARCH_UNIFORMS {
            let Some((align, _)) = field.kind.std140() else {
                continue;
            };
            assert_eq!(offset(&layout, field.name) % align, 0, "{}", field.name);
        }
        assert_eq!(layout.size() % 16, 0);
    }

    #[test]
    fn palette_uses_full_array_stride() {
        let layout = UniformLayout::ray_march();
        let entry = layout.get("_sphereColors").unwrap();

        assert_eq!(
            entry.slot,
            UniformSlot::Bytes {
                offset: offset(&layout, "_sphereColors"),
                size: PALETTE_SIZE * 16,
            }
        );
    }

    #[test]
    fn textures_live_outside_the_buffer() {
        let layout = UniformLayout::ray_march();

        assert_eq!(layout.texture_names(), &["_reflectionCube", "_MainTex"]);
        assert_eq!(layout.get("_MainTex").unwrap().slot, UniformSlot::Texture(1));
    }

    #[test]
    fn values_land_at_their_offsets() {
        let mut block = UniformBlock::new(UniformLayout::ray_march());

        block.set_vec4("_sphere", Vec4::new(1., -2., 3., 3.));
        block.set_int("_maxIterations", 42);
        block.set_mat4("_CamToWorld", Mat4::from_translation(Vec3::new(5., 6., 7.)));

        assert_eq!(block.floats("_sphere", 4), Some(vec![1., -2., 3., 3.]));
        let iterations = offset(block.layout(), "_maxIterations");
        assert_eq!(&block.as_bytes()[iterations..iterations + 4], &42i32.to_ne_bytes());
        // Column major, translation in the last column.
        assert_eq!(
            block.floats("_CamToWorld", 16).map(|m| m[12..15].to_vec()),
            Some(vec![5., 6., 7.])
        );
    }

    #[test]
    fn unknown_names_leave_the_block_untouched() {
        let mut block = UniformBlock::new(UniformLayout::ray_march());
        let before = block.as_bytes().to_vec();

        block.set_float("_doesNotExist", 1.);
        block.set_texture("_doesNotExist", TextureRef::SceneColor);
        block.set_float("_sphere", 1.);

        assert_eq!(block.as_bytes(), before.as_slice());
        assert_eq!(block.texture("_doesNotExist"), None);
    }

    #[test]
    fn textures_are_recorded_by_name() {
        let mut block = UniformBlock::new(UniformLayout::ray_march());

        assert_eq!(block.texture("_MainTex"), None);
        block.set_texture("_MainTex", TextureRef::SceneColor);
        block.set_texture("_reflectionCube", TextureRef::Image(None));

        assert_eq!(block.texture("_MainTex"), Some(TextureRef::SceneColor));
        assert_eq!(block.texture("_reflectionCube"), Some(TextureRef::Image(None)));
    }

    #[test]
    fn palette_is_written_in_slot_order() {
        let mut block = UniformBlock::new(UniformLayout::ray_march());
        let palette: Vec<_> = (0..PALETTE_SIZE)
            .map(|i| LinearRgba::new(i as f32, 0., 0., 1.))
            .collect();

        block.set_color_array("_sphereColors", &palette);

        let floats = block.floats("_sphereColors", PALETTE_SIZE * 4).unwrap();
        for i in 0..PALETTE_SIZE {
            assert_eq!(floats[i * 4], i as f32);
            assert_eq!(floats[i * 4 + 3], 1.);
        }
    }
}
