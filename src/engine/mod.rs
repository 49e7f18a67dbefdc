use bevy::{
    core_pipeline::core_3d::graph::{Core3d, Node3d},
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        extract_component::ExtractComponentPlugin,
        extract_resource::ExtractResourcePlugin,
        render_graph::{RenderGraphApp, RenderLabel, ViewNodeRunner},
        render_resource::SpecializedRenderPipelines,
    },
    transform::TransformSystem,
};
use camera::{EffectParameters, RayMarchCamera};
use gradient::{AlphaKey, ColorGradient, ColorKey, GradientMode};
use nodes::RayMarchNode;
use pipeline::{RayMarchPipeline, prepare_ray_march_pipelines};
use prepare::prepare_ray_march_frames;
use scene::{AnchorPolicy, AnchorTransform, MissingAnchorPolicy, SceneAnchor, SceneAnchors};

mod nodes;
mod pipeline;

pub mod prepare;
pub mod report;

pub mod block;
pub mod camera;
pub mod compositor;
pub mod frustum;
pub mod gradient;
pub mod scene;
pub mod uniform;

pub const DEFAULT_SHADER_PATH: &str = "shaders/ray_marching.wgsl";

/// Plugin wide configuration, present in both the main and the render world.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct RayMarchSettings {
    /// Asset path of the WGSL shader drawing the full screen quad.
    pub shader_path: String,
    pub missing_anchors: MissingAnchorPolicy,
}

impl Default for RayMarchSettings {
    fn default() -> Self {
        Self {
            shader_path: DEFAULT_SHADER_PATH.into(),
            missing_anchors: MissingAnchorPolicy::default(),
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub enum RayMarchPass {
    Composite,
}

#[derive(Default)]
pub struct RayMarchEnginePlugin {
    pub settings: RayMarchSettings,
}

impl Plugin for RayMarchEnginePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            ExtractComponentPlugin::<RayMarchCamera>::default(),
            ExtractResourcePlugin::<SceneAnchors>::default(),
        ))
        .add_systems(
            PostUpdate,
            collect_scene_anchors.after(TransformSystem::TransformPropagate),
        )
        .register_type::<RayMarchCamera>()
        .register_type::<EffectParameters>()
        .register_type::<ColorGradient>()
        .register_type::<ColorKey>()
        .register_type::<AlphaKey>()
        .register_type::<GradientMode>()
        .register_type::<SceneAnchor>()
        .register_type::<AnchorPolicy>()
        .register_type::<MissingAnchorPolicy>()
        .insert_resource(self.settings.clone())
        .init_resource::<SceneAnchors>();

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .insert_resource(self.settings.clone())
            .init_resource::<SpecializedRenderPipelines<RayMarchPipeline>>()
            .add_systems(
                Render,
                (prepare_ray_march_pipelines, prepare_ray_march_frames).in_set(RenderSet::Prepare),
            )
            .add_render_graph_node::<ViewNodeRunner<RayMarchNode>>(
                Core3d,
                RayMarchPass::Composite,
            )
            .add_render_graph_edges(
                Core3d,
                (
                    Node3d::Tonemapping,
                    RayMarchPass::Composite,
                    Node3d::EndMainPassPostProcessing,
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app.init_resource::<RayMarchPipeline>();
    }
}

/// Rebuilds [`SceneAnchors`] from the tagged entities. When a tag is used
/// more than once the lowest entity wins.
pub(crate) fn collect_scene_anchors(
    query: Query<(Entity, &SceneAnchor, &GlobalTransform)>,
    mut anchors: ResMut<SceneAnchors>,
) {
    anchors.clear();

    for (entity, &anchor, transform) in query.iter().sort::<Entity>() {
        if anchors.get(anchor).is_some() {
            warn_once!(
                "{entity} is tagged `SceneAnchor::{}` but another entity already is, ignored",
                anchor.name()
            );
            continue;
        }
        anchors.insert(anchor, AnchorTransform::from(transform));
    }
}
