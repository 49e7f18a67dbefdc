use bevy::prelude::*;

use super::{camera::EffectParameters, gradient::PALETTE_SIZE};

/// Shader-side type of a named uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Color,
    ColorArray(usize),
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Texture,
}

/// Opaque texture handle as seen from the uniform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRef {
    /// Color output captured from the camera this frame.
    SceneColor,
    Image(Option<AssetId<Image>>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Float(f32),
    Int(i32),
    Color(LinearRgba),
    ColorArray(&'a [LinearRgba]),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Texture(TextureRef),
}

impl UniformValue<'_> {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Color(_) => UniformKind::Color,
            UniformValue::ColorArray(colors) => UniformKind::ColorArray(colors.len()),
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }
}

/// Name addressed, write-only destination for shader parameters.
///
/// Writes never fail. A name the receiver does not know is dropped.
pub trait UniformSink {
    fn set_float(&mut self, name: &str, value: f32);
    fn set_int(&mut self, name: &str, value: i32);
    fn set_color(&mut self, name: &str, value: LinearRgba);
    fn set_color_array(&mut self, name: &str, value: &[LinearRgba]);
    fn set_vec2(&mut self, name: &str, value: Vec2);
    fn set_vec3(&mut self, name: &str, value: Vec3);
    fn set_vec4(&mut self, name: &str, value: Vec4);
    fn set_mat4(&mut self, name: &str, value: Mat4);
    fn set_texture(&mut self, name: &str, value: TextureRef);

    fn set(&mut self, name: &str, value: UniformValue) {
        match value {
            UniformValue::Float(v) => self.set_float(name, v),
            UniformValue::Int(v) => self.set_int(name, v),
            UniformValue::Color(v) => self.set_color(name, v),
            UniformValue::ColorArray(v) => self.set_color_array(name, v),
            UniformValue::Vec2(v) => self.set_vec2(name, v),
            UniformValue::Vec3(v) => self.set_vec3(name, v),
            UniformValue::Vec4(v) => self.set_vec4(name, v),
            UniformValue::Mat4(v) => self.set_mat4(name, v),
            UniformValue::Texture(v) => self.set_texture(name, v),
        }
    }
}

/// Every value pushed to the shader for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUniforms {
    pub cam_frustum: Mat4,
    pub cam_to_world: Mat4,
    pub light_dir: Vec3,
    pub sphere: Vec4,
    pub mandelbulb: Vec4,
    pub mandelbox: Vec4,
    pub sphere_colors: [LinearRgba; PALETTE_SIZE],
    pub reflection_cube: Option<AssetId<Image>>,
    pub params: EffectParameters,
}

pub struct UniformField {
    pub name: &'static str,
    pub kind: UniformKind,
    pub read: fn(&FrameUniforms) -> UniformValue<'_>,
}

macro_rules! field {
    ($name:literal, $kind:expr, |$f:ident| $read:expr) => {
        UniformField {
            name: $name,
            kind: $kind,
            read: |$f| $read,
        }
    };
}

use UniformKind as K;
use UniformValue as V;

/// The shader interface. Adding a uniform means adding a row here; nothing
/// else in the crate keeps its own list of names.
pub static RAY_MARCH_UNIFORMS: &[UniformField] = &[
    // Camera
    field!("_CamFrustum", K::Mat4, |f| V::Mat4(f.cam_frustum)),
    field!("_CamToWorld", K::Mat4, |f| V::Mat4(f.cam_to_world)),
    // Setup
    field!("_maxDistance", K::Float, |f| V::Float(f.params.max_distance)),
    field!("_maxIterations", K::Int, |f| V::Int(f.params.max_iterations)),
    field!("_accuracy", K::Float, |f| V::Float(f.params.accuracy)),
    // Light
    field!("_lightColor", K::Color, |f| V::Color(f.params.light_color)),
    field!("_lightDir", K::Vec3, |f| V::Vec3(f.light_dir)),
    field!("_lightIntensity", K::Float, |f| V::Float(f.params.light_intensity)),
    // Shadow
    field!("_shadowPenumbra", K::Float, |f| V::Float(f.params.shadow_penumbra)),
    field!("_shadowDistance", K::Vec2, |f| V::Vec2(f.params.shadow_distance)),
    field!("_shadowIntensity", K::Float, |f| V::Float(f.params.shadow_intensity)),
    // Ambient occlusion
    field!("_ambientOcclusionStepSize", K::Float, |f| {
        V::Float(f.params.ambient_occlusion_step_size)
    }),
    field!("_ambientOcclusionIntensity", K::Float, |f| {
        V::Float(f.params.ambient_occlusion_intensity)
    }),
    field!("_ambientOcclusionIterations", K::Int, |f| {
        V::Int(f.params.ambient_occlusion_iterations)
    }),
    // Reflection
    field!("_reflectionCount", K::Int, |f| V::Int(f.params.reflection_count)),
    field!("_reflectionIntensity", K::Float, |f| {
        V::Float(f.params.reflection_intensity)
    }),
    field!("_envReflectionIntensity", K::Float, |f| {
        V::Float(f.params.env_reflection_intensity)
    }),
    field!("_reflectionCube", K::Texture, |f| {
        V::Texture(TextureRef::Image(f.reflection_cube))
    }),
    // Fog
    field!("_fogIntensity", K::Float, |f| V::Float(f.params.fog_intensity)),
    field!("_fogColor", K::Color, |f| V::Color(f.params.fog_color)),
    field!("_fogMinDistance", K::Float, |f| V::Float(f.params.fog_min_distance)),
    field!("_fogMaxDistance", K::Float, |f| V::Float(f.params.fog_max_distance)),
    // Colors
    field!("_groundColor", K::Color, |f| V::Color(f.params.ground_color)),
    field!("_colorIntensity", K::Float, |f| V::Float(f.params.color_intensity)),
    // Spheres
    field!("_sphere", K::Vec4, |f| V::Vec4(f.sphere)),
    field!("_sphereSmooth", K::Float, |f| V::Float(f.params.sphere_smooth)),
    field!("_degreeRotate", K::Float, |f| V::Float(f.params.degree_rotate)),
    field!("_sphereColors", K::ColorArray(PALETTE_SIZE), |f| {
        V::ColorArray(&f.sphere_colors)
    }),
    field!("_sphereModInterval", K::Vec3, |f| V::Vec3(f.params.sphere_mod_interval)),
    // Mandelbox
    field!("_mandelbox", K::Vec4, |f| V::Vec4(f.mandelbox)),
    field!("_mandelboxIterations", K::Int, |f| V::Int(f.params.mandelbox_iterations)),
    field!("_mandelboxColor", K::Color, |f| V::Color(f.params.mandelbox_color)),
    // Mandelbulb
    field!("_mandelbulb", K::Vec4, |f| V::Vec4(f.mandelbulb)),
    field!("_mandelbulbIterations", K::Int, |f| V::Int(f.params.mandelbulb_iterations)),
    field!("_mandelbulbExponent", K::Int, |f| V::Int(f.params.mandelbulb_exponent)),
    field!("_mandelbulbColor", K::Color, |f| V::Color(f.params.mandelbulb_color)),
    // Captured scene
    field!("_MainTex", K::Texture, |_f| V::Texture(TextureRef::SceneColor)),
];

/// Pushes one frame worth of uniforms, each table row exactly once.
pub fn upload(frame: &FrameUniforms, sink: &mut impl UniformSink) {
    for field in RAY_MARCH_UNIFORMS {
        let value = (field.read)(frame);
        debug_assert_eq!(value.kind(), field.kind, "uniform `{}`", field.name);
        sink.set(field.name, value);
    }
}
