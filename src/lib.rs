pub mod engine;
use crate::engine::{
    DEFAULT_SHADER_PATH, RayMarchEnginePlugin, RayMarchSettings,
    scene::{AnchorPolicy, MissingAnchorPolicy},
};
use bevy::prelude::*;

pub mod prelude {
    pub use crate::RayMarchingPlugin;
    pub use crate::engine::{
        RayMarchSettings,
        camera::{EffectParameters, RayMarchCamera},
        gradient::{AlphaKey, ColorGradient, ColorKey, GradientMode},
        scene::{AnchorPolicy, MissingAnchorPolicy, SceneAnchor},
    };
}

/// Replaces the output of every [`RayMarchCamera`](engine::camera::RayMarchCamera)
/// with a full screen ray marching pass.
pub struct RayMarchingPlugin {
    pub shader_path: String,
    /// Missing [`SceneAnchor::Light`](engine::scene::SceneAnchor::Light).
    pub light_policy: AnchorPolicy,
    /// Missing sphere, mandelbulb or mandelbox anchor.
    pub anchor_policy: AnchorPolicy,
}

impl Default for RayMarchingPlugin {
    fn default() -> Self {
        let policy = MissingAnchorPolicy::default();
        Self {
            shader_path: DEFAULT_SHADER_PATH.into(),
            light_policy: policy.light,
            anchor_policy: policy.objects,
        }
    }
}

impl Plugin for RayMarchingPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RayMarchEnginePlugin {
            settings: RayMarchSettings {
                shader_path: self.shader_path.clone(),
                missing_anchors: MissingAnchorPolicy {
                    light: self.light_policy,
                    objects: self.anchor_policy,
                },
            },
        });
    }
}
