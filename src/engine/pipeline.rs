use std::num::NonZeroU64;

use bevy::{
    image::BevyDefault,
    prelude::*,
    render::{
        render_resource::{
            binding_types::{sampler, texture_2d, texture_cube, uniform_buffer_sized},
            *,
        },
        renderer::RenderDevice,
        view::{ExtractedView, ViewTarget},
    },
};

use super::{
    RayMarchSettings,
    block::UniformLayout,
    camera::ExtractedRayMarchCamera,
    compositor::{FULLSCREEN_QUAD, FULLSCREEN_QUAD_INDICES, QuadVertex},
};

#[derive(Resource)]
pub struct RayMarchPipeline {
    pub layout: BindGroupLayout,
    pub sampler: Sampler,
    pub shader: Handle<Shader>,
    pub uniforms: &'static UniformLayout,
    pub quad_vertices: Buffer,
    pub quad_indices: Buffer,
}

impl FromWorld for RayMarchPipeline {
    fn from_world(world: &mut World) -> Self {
        let shader_path = world.resource::<RayMarchSettings>().shader_path.clone();
        let uniforms = UniformLayout::ray_march();
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            "ray_march_bind_group_layout",
            &BindGroupLayoutEntries::sequential(
                ShaderStages::VERTEX_FRAGMENT,
                (
                    uniform_buffer_sized(false, NonZeroU64::new(uniforms.size() as u64)),
                    // _MainTex
                    texture_2d(TextureSampleType::Float { filterable: true }),
                    sampler(SamplerBindingType::Filtering),
                    // _reflectionCube
                    texture_cube(TextureSampleType::Float { filterable: true }),
                ),
            ),
        );

        let sampler = render_device.create_sampler(&SamplerDescriptor {
            label: Some("ray_march_sampler"),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..default()
        });

        let quad_vertices = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("ray_march_quad_vertex_buffer"),
            contents: bytemuck::cast_slice(&FULLSCREEN_QUAD),
            usage: BufferUsages::VERTEX,
        });
        let quad_indices = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("ray_march_quad_index_buffer"),
            contents: bytemuck::cast_slice(&FULLSCREEN_QUAD_INDICES),
            usage: BufferUsages::INDEX,
        });

        let shader = world.load_asset(shader_path);

        Self {
            layout,
            sampler,
            shader,
            uniforms,
            quad_vertices,
            quad_indices,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RayMarchPipelineKey {
    pub hdr: bool,
}

impl SpecializedRenderPipeline for RayMarchPipeline {
    type Key = RayMarchPipelineKey;

    fn specialize(&self, key: Self::Key) -> RenderPipelineDescriptor {
        let format = if key.hdr {
            ViewTarget::TEXTURE_FORMAT_HDR
        } else {
            TextureFormat::bevy_default()
        };

        RenderPipelineDescriptor {
            label: Some("ray_march_pipeline".into()),
            layout: vec![self.layout.clone()],
            vertex: VertexState {
                shader: self.shader.clone(),
                shader_defs: vec![],
                entry_point: "vertex".into(),
                buffers: vec![VertexBufferLayout {
                    array_stride: size_of::<QuadVertex>() as u64,
                    step_mode: VertexStepMode::Vertex,
                    attributes: vec![
                        // x, y, frustum corner
                        VertexAttribute {
                            format: VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        VertexAttribute {
                            format: VertexFormat::Float32x2,
                            offset: VertexFormat::Float32x3.size(),
                            shader_location: 1,
                        },
                    ],
                }],
            },
            fragment: Some(FragmentState {
                shader: self.shader.clone(),
                shader_defs: vec![],
                entry_point: "fragment".into(),
                targets: vec![Some(ColorTargetState {
                    format,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            push_constant_ranges: vec![],
            zero_initialize_workgroup_memory: false,
        }
    }
}

#[derive(Component, Deref, DerefMut)]
pub struct RayMarchPipelineId(pub CachedRenderPipelineId);

pub(crate) fn prepare_ray_march_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    mut pipelines: ResMut<SpecializedRenderPipelines<RayMarchPipeline>>,
    ray_march_pipeline: Res<RayMarchPipeline>,
    views: Query<(Entity, &ExtractedView), With<ExtractedRayMarchCamera>>,
) {
    for (entity, view) in views.iter() {
        let pipeline_id = pipelines.specialize(
            &pipeline_cache,
            &ray_march_pipeline,
            RayMarchPipelineKey { hdr: view.hdr },
        );

        commands
            .entity(entity)
            .insert(RayMarchPipelineId(pipeline_id));
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        DEFAULT_SHADER_PATH,
        uniform::{RAY_MARCH_UNIFORMS, UniformKind},
    };

    const SAMPLE_SHADER: &str = include_str!("../../assets/shaders/ray_marching.wgsl");

    #[test]
    fn sample_shader_sits_at_the_default_path() {
        assert_eq!(DEFAULT_SHADER_PATH, "shaders/ray_marching.wgsl");
        assert!(SAMPLE_SHADER.contains("@vertex\nfn vertex("));
        assert!(SAMPLE_SHADER.contains("@fragment\nfn fragment("));
    }

    #[test]
    fn sample_shader_binds_the_layout_in_order() {
        let bindings = [
            "@binding(0) var<uniform> u: RayMarchUniforms",
            "@binding(1) var _MainTex: texture_2d<f32>",
            "@binding(2) var main_sampler: sampler",
            "@binding(3) var _reflectionCube: texture_cube<f32>",
        ];
        for binding in bindings {
            assert!(SAMPLE_SHADER.contains(binding), "missing `{binding}`");
        }
    }

    #[test]
    fn sample_shader_struct_follows_the_uniform_table() {
        let start = SAMPLE_SHADER.find("struct RayMarchUniforms {").unwrap();
        let body = &SAMPLE_SHADER[start..];
        let body = &body[..body.find("\n}").unwrap()];

        let declared: Vec<&str> = body
            .lines()
            .skip(1)
            .filter_map(|line| line.trim().split_once(':').map(|(name, _)| name))
            .collect();
        let buffered: Vec<&str> = RAY_MARCH_UNIFORMS
            .iter()
            .filter(|field| field.kind != UniformKind::Texture)
            .map(|field| field.name)
            .collect();

        assert_eq!(declared, buffered);
    }
}
