use bevy::{
    ecs::{query::QueryItem, system::lifetimeless::Read},
    prelude::*,
    render::{
        camera::ExtractedCamera,
        render_asset::RenderAssets,
        render_graph::{NodeRunError, RenderGraphContext, ViewNode},
        render_resource::{
            BindGroupEntries, BufferInitDescriptor, BufferUsages, IndexFormat, Operations,
            PipelineCache, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
            TextureView,
        },
        renderer::RenderContext,
        texture::{FallbackImage, GpuImage},
        view::ViewTarget,
    },
};

use super::{
    block::UniformBlock,
    compositor::{FULLSCREEN_QUAD, FULLSCREEN_QUAD_INDICES, FrameHost, QuadVertex, compose_frame},
    pipeline::{RayMarchPipeline, RayMarchPipelineId},
    prepare::PreparedRayMarchFrame,
    uniform::TextureRef,
};

#[derive(Default)]
pub struct RayMarchNode;

impl ViewNode for RayMarchNode {
    type ViewQuery = (
        Read<ViewTarget>,
        Read<ExtractedCamera>,
        Read<PreparedRayMarchFrame>,
        Read<RayMarchPipelineId>,
    );

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        (view_target, camera, prepared, pipeline_id): QueryItem<Self::ViewQuery>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let ray_march_pipeline = world.resource::<RayMarchPipeline>();
        let pipeline_cache = world.resource::<PipelineCache>();

        let Some(viewport) = camera.physical_viewport_size else {
            return Ok(());
        };

        let mut host = ViewFrameHost {
            render_context,
            view_target,
            viewport,
            pipeline: pipeline_cache.get_render_pipeline(**pipeline_id),
            ray_march_pipeline,
            reflection_cube: prepared.reflection_cube.as_ref(),
            gpu_images: world.resource::<RenderAssets<GpuImage>>(),
            fallback: world.resource::<FallbackImage>(),
            block: UniformBlock::new(ray_march_pipeline.uniforms),
        };

        // Resolve errors are reported by `prepare_ray_march_frames`.
        let _ = compose_frame(&mut host, || prepared.uniforms.clone());

        Ok(())
    }
}

/// The main pass has already rendered the scene into the view target by the
/// time this node runs, so that texture is the captured scene. The post
/// process pair is only flipped when the quad is drawn; leaving it alone is
/// the pass-through.
struct CapturedScene;

struct ViewFrameHost<'a, 'w> {
    render_context: &'a mut RenderContext<'w>,
    view_target: &'a ViewTarget,
    viewport: UVec2,
    pipeline: Option<&'a RenderPipeline>,
    ray_march_pipeline: &'a RayMarchPipeline,
    reflection_cube: Option<&'a TextureView>,
    gpu_images: &'a RenderAssets<GpuImage>,
    fallback: &'a FallbackImage,
    block: UniformBlock<'a>,
}

impl<'a> FrameHost for ViewFrameHost<'a, '_> {
    type Target = CapturedScene;
    type Sink = UniformBlock<'a>;

    fn viewport_size(&self) -> UVec2 {
        self.viewport
    }

    fn acquire_target(&mut self, _size: UVec2) -> CapturedScene {
        CapturedScene
    }

    fn capture_scene(&mut self, _target: &mut CapturedScene) {}

    fn shader_sink(&mut self) -> Option<&mut UniformBlock<'a>> {
        self.pipeline.is_some().then_some(&mut self.block)
    }

    fn pass_through(&mut self, _source: &CapturedScene) {}

    fn draw_fullscreen_quad(&mut self, quad: &[QuadVertex; 4], _source: &CapturedScene) {
        debug_assert_eq!(quad, &FULLSCREEN_QUAD);
        let Some(pipeline) = self.pipeline else {
            return;
        };
        let (view_target, ray_march_pipeline, gpu_images, fallback) = (
            self.view_target,
            self.ray_march_pipeline,
            self.gpu_images,
            self.fallback,
        );
        let device = self.render_context.render_device().clone();

        let post_process = view_target.post_process_write();

        let uniforms = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("ray_march_uniform_buffer"),
            contents: self.block.as_bytes(),
            usage: BufferUsages::UNIFORM,
        });

        let main_tex = texture_view(
            self.block.texture("_MainTex"),
            post_process.source,
            gpu_images,
            &fallback.d2,
        );
        // Only views prepared with a cube dimension may reach the cube slot.
        let reflection_cube = match self.block.texture("_reflectionCube") {
            Some(TextureRef::Image(Some(_))) => self.reflection_cube,
            _ => None,
        }
        .unwrap_or(&fallback.cube.texture_view);

        let bind_group = device.create_bind_group(
            "ray_march_bind_group",
            &ray_march_pipeline.layout,
            &BindGroupEntries::sequential((
                uniforms.as_entire_binding(),
                main_tex,
                &ray_march_pipeline.sampler,
                reflection_cube,
            )),
        );

        let mut render_pass = self
            .render_context
            .begin_tracked_render_pass(RenderPassDescriptor {
                label: Some("ray_march_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: post_process.destination,
                    resolve_target: None,
                    ops: Operations::default(),
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_vertex_buffer(0, ray_march_pipeline.quad_vertices.slice(..));
        render_pass.set_index_buffer(
            ray_march_pipeline.quad_indices.slice(..),
            0,
            IndexFormat::Uint16,
        );
        render_pass.draw_indexed(0..FULLSCREEN_QUAD_INDICES.len() as u32, 0, 0..1);
    }

    fn release_target(&mut self, _target: CapturedScene) {}
}

fn texture_view<'a>(
    texture: Option<TextureRef>,
    scene: &'a TextureView,
    gpu_images: &'a RenderAssets<GpuImage>,
    fallback: &'a GpuImage,
) -> &'a TextureView {
    match texture {
        Some(TextureRef::SceneColor) => scene,
        Some(TextureRef::Image(Some(id))) => gpu_images
            .get(id)
            .map_or(&fallback.texture_view, |image| &image.texture_view),
        Some(TextureRef::Image(None)) | None => &fallback.texture_view,
    }
}
