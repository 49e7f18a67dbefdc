use std::collections::HashMap;

use bevy::{prelude::*, render::extract_resource::ExtractResource};
use thiserror::Error;

use super::{
    camera::ExtractedRayMarchCamera,
    frustum::compute_frustum,
    gradient::sample_palette,
    uniform::FrameUniforms,
};

/// Direction used for the light when no light anchor can be found.
pub const DEFAULT_LIGHT_DIR: Vec3 = Vec3::NEG_Y;

/// Tags an entity as one of the objects the ray marching shader knows by name.
#[derive(Reflect, Component, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[reflect(Component)]
pub enum SceneAnchor {
    /// Its forward vector is the direction of the directional light.
    Light,
    Sphere,
    Mandelbulb,
    Mandelbox,
}

impl SceneAnchor {
    pub fn name(self) -> &'static str {
        match self {
            SceneAnchor::Light => "Light",
            SceneAnchor::Sphere => "Sphere",
            SceneAnchor::Mandelbulb => "Mandelbulb",
            SceneAnchor::Mandelbox => "Mandelbox",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl AnchorTransform {
    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Local -Z in world space.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl From<&GlobalTransform> for AnchorTransform {
    fn from(transform: &GlobalTransform) -> Self {
        let (_, rotation, position) = transform.to_scale_rotation_translation();
        Self { position, rotation }
    }
}

/// World transforms of every tagged anchor, rebuilt from scratch each frame.
#[derive(Resource, Debug, Default, Clone, ExtractResource)]
pub struct SceneAnchors {
    anchors: HashMap<SceneAnchor, AnchorTransform>,
}

impl SceneAnchors {
    pub fn get(&self, anchor: SceneAnchor) -> Option<&AnchorTransform> {
        self.anchors.get(&anchor)
    }

    /// Returns the transform previously stored for this anchor, if any.
    pub fn insert(&mut self, anchor: SceneAnchor, transform: AnchorTransform) -> Option<AnchorTransform> {
        self.anchors.insert(anchor, transform)
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl FromIterator<(SceneAnchor, AnchorTransform)> for SceneAnchors {
    fn from_iter<T: IntoIterator<Item = (SceneAnchor, AnchorTransform)>>(iter: T) -> Self {
        Self {
            anchors: iter.into_iter().collect(),
        }
    }
}

/// What to do when a tagged anchor is absent from the scene.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorPolicy {
    /// Substitute a fixed value: world down for the light, the origin for objects.
    UseDefault,
    /// Refuse to render the frame.
    Fail,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingAnchorPolicy {
    pub light: AnchorPolicy,
    /// Applies to the sphere, the mandelbulb and the mandelbox.
    pub objects: AnchorPolicy,
}

impl Default for MissingAnchorPolicy {
    fn default() -> Self {
        Self {
            light: AnchorPolicy::UseDefault,
            objects: AnchorPolicy::Fail,
        }
    }
}

impl MissingAnchorPolicy {
    pub fn for_anchor(&self, anchor: SceneAnchor) -> AnchorPolicy {
        match anchor {
            SceneAnchor::Light => self.light,
            _ => self.objects,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("missing scene object `{name}`, tag an entity with `SceneAnchor::{name}`")]
    MissingSceneObject { name: &'static str },
}

/// Live anchor values for one frame, before they are turned into uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedScene {
    pub light_dir: Vec3,
    pub sphere: Vec3,
    pub mandelbulb: Vec3,
    pub mandelbox: Vec3,
}

fn lookup(
    anchors: &SceneAnchors,
    policy: &MissingAnchorPolicy,
    anchor: SceneAnchor,
) -> Result<Option<AnchorTransform>, ResolveError> {
    match (anchors.get(anchor), policy.for_anchor(anchor)) {
        (Some(&transform), _) => Ok(Some(transform)),
        (None, AnchorPolicy::UseDefault) => Ok(None),
        (None, AnchorPolicy::Fail) => Err(ResolveError::MissingSceneObject {
            name: anchor.name(),
        }),
    }
}

pub fn resolve_scene(anchors: &SceneAnchors, policy: &MissingAnchorPolicy) -> Result<ResolvedScene, ResolveError> {
    let position = |anchor| {
        lookup(anchors, policy, anchor).map(|t| t.map_or(Vec3::ZERO, |t| t.position))
    };

    Ok(ResolvedScene {
        light_dir: lookup(anchors, policy, SceneAnchor::Light)?
            .map_or(DEFAULT_LIGHT_DIR, |t| t.forward()),
        sphere: position(SceneAnchor::Sphere)?,
        mandelbulb: position(SceneAnchor::Mandelbulb)?,
        mandelbox: position(SceneAnchor::Mandelbox)?,
    })
}

/// Scene positions are Y-up while the shader marches a Y-down space.
#[inline]
pub fn shader_position(position: Vec3, w: f32) -> Vec4 {
    Vec4::new(position.x, -position.y, position.z, w)
}

/// Everything the shader needs for one frame, derived from live state.
pub fn resolve_frame(
    view: &ExtractedRayMarchCamera,
    anchors: &SceneAnchors,
    policy: &MissingAnchorPolicy,
) -> Result<FrameUniforms, ResolveError> {
    let scene = resolve_scene(anchors, policy)?;
    let camera = view.camera.sanitized();
    let params = view.params.clamped();

    Ok(FrameUniforms {
        cam_frustum: compute_frustum(camera.fov, camera.aspect).to_matrix(),
        cam_to_world: camera.camera_to_world,
        light_dir: scene.light_dir,
        sphere: shader_position(scene.sphere, params.sphere_w),
        mandelbulb: shader_position(scene.mandelbulb, params.mandelbulb_w),
        mandelbox: shader_position(scene.mandelbox, params.mandelbox_w),
        sphere_colors: sample_palette(&view.sphere_gradient),
        reflection_cube: view.reflection_cube,
        params,
    })
}
