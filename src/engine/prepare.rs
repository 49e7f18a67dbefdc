use bevy::{
    prelude::*,
    render::{
        render_asset::RenderAssets,
        render_resource::{
            Extent3d, TextureDimension, TextureView, TextureViewDescriptor, TextureViewDimension,
        },
        texture::GpuImage,
    },
};

use super::{
    RayMarchSettings,
    camera::{CameraClamp, ExtractedRayMarchCamera},
    report::{Change, ChangeReport},
    scene::{ResolveError, SceneAnchors, resolve_frame},
    uniform::FrameUniforms,
};

/// Everything a ray march view needs to be drawn this frame.
#[derive(Component)]
pub struct PreparedRayMarchFrame {
    pub uniforms: Result<FrameUniforms, ResolveError>,
    /// Cube view of the reflection image, `None` binds the fallback cube.
    pub reflection_cube: Option<TextureView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureShape {
    pub size: Extent3d,
    pub dimension: TextureDimension,
}

impl TextureShape {
    /// Six square layers of a 2d texture, viewable as a cube.
    pub fn is_cube(&self) -> bool {
        self.dimension == TextureDimension::D2
            && self.size.depth_or_array_layers == 6
            && self.size.width == self.size.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeSelection {
    Image(AssetId<Image>),
    /// Nothing requested, or the image is not uploaded yet.
    Fallback,
    /// The image exists but cannot be bound as a cube.
    Rejected(AssetId<Image>, TextureShape),
}

pub fn select_reflection_cube(
    requested: Option<AssetId<Image>>,
    shape_of: impl Fn(AssetId<Image>) -> Option<TextureShape>,
) -> CubeSelection {
    let Some(id) = requested else {
        return CubeSelection::Fallback;
    };
    match shape_of(id) {
        Some(shape) if shape.is_cube() => CubeSelection::Image(id),
        Some(shape) => CubeSelection::Rejected(id, shape),
        None => CubeSelection::Fallback,
    }
}

#[derive(Default)]
pub(crate) struct ViewReports {
    errors: ChangeReport<Entity, ResolveError>,
    clamps: ChangeReport<Entity, CameraClamp>,
    cubes: ChangeReport<Entity, AssetId<Image>>,
}

pub(crate) fn prepare_ray_march_frames(
    mut commands: Commands,
    views: Query<(Entity, &ExtractedRayMarchCamera)>,
    anchors: Option<Res<SceneAnchors>>,
    settings: Res<RayMarchSettings>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    mut reports: Local<ViewReports>,
) {
    let no_anchors = SceneAnchors::default();
    let anchors = anchors.as_deref().unwrap_or(&no_anchors);

    for (entity, view) in views.iter() {
        let uniforms = resolve_frame(view, anchors, &settings.missing_anchors);

        match reports.errors.observe(entity, uniforms.as_ref().err().cloned()) {
            Some(Change::Raised(err)) => error!("ray march effect disabled on {entity}: {err}"),
            Some(Change::Cleared(_)) => info!("ray march effect restored on {entity}"),
            None => {}
        }

        match reports.clamps.observe(entity, view.camera.clamp_report()) {
            Some(Change::Raised(clamp)) => warn!(
                "degenerate ray march camera {entity} (fov {}, aspect {}), clamped {clamp:?}",
                view.camera.fov, view.camera.aspect
            ),
            Some(Change::Cleared(_)) => debug!("ray march camera {entity} projection is valid again"),
            None => {}
        }

        let selection = select_reflection_cube(view.reflection_cube, |id| {
            gpu_images.get(id).map(|image| TextureShape {
                size: image.size,
                dimension: image.texture.dimension(),
            })
        });

        let rejected = match selection {
            CubeSelection::Rejected(id, _) => Some(id),
            _ => None,
        };
        if let Some(Change::Raised(id)) = reports.cubes.observe(entity, rejected) {
            warn!(
                "reflection image {id:?} of {entity} is not a cube map ({selection:?}), using the fallback cube"
            );
        }

        let reflection_cube = match selection {
            CubeSelection::Image(id) => gpu_images.get(id).map(|image| {
                image.texture.create_view(&TextureViewDescriptor {
                    label: Some("ray_march_reflection_cube_view"),
                    dimension: Some(TextureViewDimension::Cube),
                    array_layer_count: Some(6),
                    ..default()
                })
            }),
            CubeSelection::Fallback | CubeSelection::Rejected(..) => None,
        };

        commands.entity(entity).insert(PreparedRayMarchFrame {
            uniforms,
            reflection_cube,
        });
    }

    let live = |entity: &Entity| views.contains(*entity);
    reports.errors.retain(live);
    reports.clamps.retain(live);
    reports.cubes.retain(live);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        camera::{CameraState, EffectParameters},
        gradient::ColorGradient,
        scene::{AnchorTransform, SceneAnchor},
    };

    fn view() -> ExtractedRayMarchCamera {
        ExtractedRayMarchCamera {
            camera: CameraState {
                fov: 60.,
                aspect: 1.,
                camera_to_world: Mat4::IDENTITY,
                position: Vec3::ZERO,
            },
            params: EffectParameters::default(),
            sphere_gradient: ColorGradient::default(),
            reflection_cube: Some(AssetId::default()),
        }
    }

    fn app(anchors: SceneAnchors) -> App {
        let mut app = App::new();
        app.insert_resource(anchors)
            .init_resource::<RayMarchSettings>()
            .init_resource::<RenderAssets<GpuImage>>()
            .add_systems(Update, prepare_ray_march_frames);
        app
    }

    #[test]
    fn every_view_gets_a_prepared_frame() {
        let anchors = [SceneAnchor::Sphere, SceneAnchor::Mandelbulb, SceneAnchor::Mandelbox]
            .into_iter()
            .map(|anchor| (anchor, AnchorTransform::from_translation(Vec3::ONE)))
            .collect();
        let mut app = app(anchors);
        let entity = app.world_mut().spawn(view()).id();

        app.update();

        let prepared = app.world().get::<PreparedRayMarchFrame>(entity).unwrap();
        let uniforms = prepared.uniforms.as_ref().unwrap();
        assert_eq!(uniforms.sphere, Vec4::new(1., -1., 1., 1.));
        // Requested cube is not uploaded, the fallback is bound.
        assert!(prepared.reflection_cube.is_none());
    }

    #[test]
    fn resolve_error_is_kept_on_the_view() {
        let mut app = app(SceneAnchors::default());
        let entity = app.world_mut().spawn(view()).id();

        app.update();
        app.update();

        let prepared = app.world().get::<PreparedRayMarchFrame>(entity).unwrap();
        assert_eq!(
            prepared.uniforms.as_ref().err(),
            Some(&ResolveError::MissingSceneObject { name: "Sphere" })
        );
    }

    fn shape(width: u32, height: u32, layers: u32) -> TextureShape {
        TextureShape {
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: layers,
            },
            dimension: TextureDimension::D2,
        }
    }

    #[test]
    fn no_request_binds_the_fallback() {
        let selection = select_reflection_cube(None, |_| Some(shape(64, 64, 6)));
        assert_eq!(selection, CubeSelection::Fallback);
    }

    #[test]
    fn image_still_loading_binds_the_fallback() {
        let id = AssetId::<Image>::default();
        assert_eq!(select_reflection_cube(Some(id), |_| None), CubeSelection::Fallback);
    }

    #[test]
    fn six_square_layers_are_a_cube() {
        let id = AssetId::<Image>::default();
        assert_eq!(
            select_reflection_cube(Some(id), |_| Some(shape(256, 256, 6))),
            CubeSelection::Image(id)
        );
    }

    #[test]
    fn flat_image_is_rejected() {
        let id = AssetId::<Image>::default();
        let flat = shape(512, 256, 1);
        assert_eq!(
            select_reflection_cube(Some(id), |_| Some(flat)),
            CubeSelection::Rejected(id, flat)
        );
    }

    #[test]
    fn cube_needs_square_layers_of_a_2d_texture() {
        assert!(!shape(256, 128, 6).is_cube());
        assert!(!shape(256, 256, 12).is_cube());

        let volume = TextureShape {
            dimension: TextureDimension::D3,
            ..shape(256, 256, 6)
        };
        assert!(!volume.is_cube());
    }
}
