use bevy::{ecs::query::QueryItem, prelude::*, render::extract_component::ExtractComponent};

use super::gradient::ColorGradient;

pub const MIN_FOV_DEGREES: f32 = 0.01;
pub const MAX_FOV_DEGREES: f32 = 179.;
pub const MIN_ASPECT: f32 = 1e-4;

const FALLBACK_FOV_DEGREES: f32 = 60.;
const FALLBACK_ASPECT: f32 = 1.;

/// Marks a 3d camera whose output is replaced by the ray marching pass.
#[derive(Component, Clone, Default, Reflect)]
#[require(Camera3d)]
#[reflect(Component, Default)]
pub struct RayMarchCamera {
    pub params: EffectParameters,
    /// Sampled into `_sphereColors` every frame.
    pub sphere_gradient: ColorGradient,
    pub reflection_cube: Option<Handle<Image>>,
}

/// Render world copy of a [`RayMarchCamera`] together with the projection
/// it was extracted with.
#[derive(Component, Clone)]
pub struct ExtractedRayMarchCamera {
    pub camera: CameraState,
    pub params: EffectParameters,
    pub sphere_gradient: ColorGradient,
    pub reflection_cube: Option<AssetId<Image>>,
}

impl ExtractComponent for RayMarchCamera {
    type QueryData = (
        &'static RayMarchCamera,
        &'static Projection,
        &'static GlobalTransform,
    );
    type QueryFilter = ();
    type Out = ExtractedRayMarchCamera;

    fn extract_component(
        (ray_march, projection, transform): QueryItem<'_, Self::QueryData>,
    ) -> Option<Self::Out> {
        let Projection::Perspective(perspective) = projection else {
            return None;
        };

        Some(ExtractedRayMarchCamera {
            camera: CameraState::from_perspective(perspective, transform),
            params: ray_march.params,
            sphere_gradient: ray_march.sphere_gradient.clone(),
            reflection_cube: ray_march.reflection_cube.as_ref().map(Handle::id),
        })
    }
}

/// Projection values of a degenerate camera that had to be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraClamp {
    pub fov: bool,
    pub aspect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub camera_to_world: Mat4,
    pub position: Vec3,
}

impl CameraState {
    pub fn from_perspective(projection: &PerspectiveProjection, transform: &GlobalTransform) -> Self {
        Self {
            fov: projection.fov.to_degrees(),
            aspect: projection.aspect_ratio,
            camera_to_world: transform.compute_matrix(),
            position: transform.translation(),
        }
    }

    /// Which projection values [`CameraState::sanitized`] would replace.
    pub fn clamp_report(&self) -> Option<CameraClamp> {
        let clamp = CameraClamp {
            fov: !(MIN_FOV_DEGREES..=MAX_FOV_DEGREES).contains(&self.fov),
            aspect: !(self.aspect.is_finite() && self.aspect >= MIN_ASPECT),
        };
        (clamp.fov || clamp.aspect).then_some(clamp)
    }

    /// Clamps the projection into a range the frustum math can handle.
    pub fn sanitized(self) -> Self {
        let fov = if self.fov.is_finite() {
            self.fov.clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES)
        } else {
            FALLBACK_FOV_DEGREES
        };
        let aspect = if self.aspect.is_finite() {
            self.aspect.max(MIN_ASPECT)
        } else {
            FALLBACK_ASPECT
        };

        Self {
            fov,
            aspect,
            ..self
        }
    }
}

/// Tunables of the ray marching shader. Every field ends up in exactly one
/// uniform, see [`super::uniform::RAY_MARCH_UNIFORMS`].
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Default)]
pub struct EffectParameters {
    // Setup
    pub max_distance: f32,
    pub max_iterations: i32,
    pub accuracy: f32,

    // Directional light
    pub light_color: LinearRgba,
    pub light_intensity: f32,

    // Shadow
    pub shadow_penumbra: f32,
    /// Near and far distance of the shadow march.
    pub shadow_distance: Vec2,
    pub shadow_intensity: f32,

    // Ambient occlusion
    pub ambient_occlusion_step_size: f32,
    pub ambient_occlusion_intensity: f32,
    pub ambient_occlusion_iterations: i32,

    // Reflection
    pub reflection_count: i32,
    pub reflection_intensity: f32,
    pub env_reflection_intensity: f32,

    // Fog
    pub fog_intensity: f32,
    pub fog_color: LinearRgba,
    pub fog_min_distance: f32,
    pub fog_max_distance: f32,

    // Mandelbulb
    pub mandelbulb_w: f32,
    pub mandelbulb_iterations: i32,
    pub mandelbulb_exponent: i32,
    pub mandelbulb_color: LinearRgba,

    // Mandelbox
    pub mandelbox_w: f32,
    pub mandelbox_iterations: i32,
    pub mandelbox_color: LinearRgba,

    // Spheres
    /// Sphere radius.
    pub sphere_w: f32,
    pub sphere_smooth: f32,
    pub degree_rotate: f32,
    pub sphere_mod_interval: Vec3,

    // Color
    pub ground_color: LinearRgba,
    pub color_intensity: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            max_distance: 200.,
            max_iterations: 164,
            accuracy: 0.01,
            light_color: LinearRgba::WHITE,
            light_intensity: 1.,
            shadow_penumbra: 16.,
            shadow_distance: Vec2::new(0.1, 40.),
            shadow_intensity: 1.,
            ambient_occlusion_step_size: 0.1,
            ambient_occlusion_intensity: 0.25,
            ambient_occlusion_iterations: 3,
            reflection_count: 1,
            reflection_intensity: 0.5,
            env_reflection_intensity: 0.3,
            fog_intensity: 0.2,
            fog_color: LinearRgba::rgb(0.6, 0.7, 0.8),
            fog_min_distance: 20.,
            fog_max_distance: 150.,
            mandelbulb_w: 1.,
            mandelbulb_iterations: 8,
            mandelbulb_exponent: 8,
            mandelbulb_color: LinearRgba::rgb(0.8, 0.3, 0.2),
            mandelbox_w: 1.,
            mandelbox_iterations: 6,
            mandelbox_color: LinearRgba::rgb(0.2, 0.4, 0.8),
            sphere_w: 1.,
            sphere_smooth: 2.,
            degree_rotate: 0.,
            sphere_mod_interval: Vec3::ZERO,
            ground_color: LinearRgba::rgb(0.3, 0.3, 0.3),
            color_intensity: 1.,
        }
    }
}

impl EffectParameters {
    /// Forces every ranged field into the range the shader was tuned for.
    pub fn clamped(self) -> Self {
        Self {
            max_iterations: self.max_iterations.clamp(1, 500),
            accuracy: self.accuracy.clamp(0.001, 0.1),
            shadow_penumbra: self.shadow_penumbra.clamp(1., 128.),
            shadow_intensity: self.shadow_intensity.clamp(0., 4.),
            ambient_occlusion_step_size: self.ambient_occlusion_step_size.clamp(0.01, 10.),
            ambient_occlusion_intensity: self.ambient_occlusion_intensity.clamp(0., 1.),
            ambient_occlusion_iterations: self.ambient_occlusion_iterations.clamp(1, 5),
            reflection_count: self.reflection_count.clamp(0, 4),
            reflection_intensity: self.reflection_intensity.clamp(0., 1.),
            env_reflection_intensity: self.env_reflection_intensity.clamp(0., 1.),
            fog_intensity: self.fog_intensity.clamp(0., 1.),
            mandelbulb_iterations: self.mandelbulb_iterations.clamp(1, 15),
            mandelbox_iterations: self.mandelbox_iterations.clamp(1, 10),
            sphere_smooth: self.sphere_smooth.clamp(0., 30.),
            color_intensity: self.color_intensity.clamp(0., 4.),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(fov: f32, aspect: f32) -> CameraState {
        CameraState {
            fov,
            aspect,
            camera_to_world: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }

    #[test]
    fn sane_camera_is_untouched() {
        let camera = state(60., 16. / 9.);
        assert_eq!(camera.sanitized(), camera);
    }

    #[test]
    fn degenerate_camera_is_clamped() {
        let flat = state(180., 0.).sanitized();
        assert_eq!(flat.fov, MAX_FOV_DEGREES);
        assert_eq!(flat.aspect, MIN_ASPECT);

        let negative = state(-10., -1.).sanitized();
        assert_eq!(negative.fov, MIN_FOV_DEGREES);
        assert_eq!(negative.aspect, MIN_ASPECT);
    }

    #[test]
    fn clamp_report_names_the_replaced_values() {
        assert_eq!(state(60., 16. / 9.).clamp_report(), None);
        assert_eq!(
            state(180., 1.).clamp_report(),
            Some(CameraClamp {
                fov: true,
                aspect: false
            })
        );
        assert_eq!(
            state(f32::NAN, 0.).clamp_report(),
            Some(CameraClamp {
                fov: true,
                aspect: true
            })
        );
        assert_eq!(
            state(45., f32::INFINITY).clamp_report(),
            Some(CameraClamp {
                fov: false,
                aspect: true
            })
        );
    }

    #[test]
    fn clamp_report_agrees_with_sanitized() {
        for (fov, aspect) in [(60., 1.), (0., 1.), (200., 2.), (90., -3.), (f32::NAN, 1.)] {
            let camera = state(fov, aspect);
            let sanitized = camera.sanitized();
            let changed = sanitized.fov.to_bits() != fov.to_bits()
                || sanitized.aspect.to_bits() != aspect.to_bits();
            assert_eq!(camera.clamp_report().is_some(), changed, "fov {fov}, aspect {aspect}");
        }
    }

    #[test]
    fn non_finite_camera_falls_back() {
        let camera = state(f32::NAN, f32::INFINITY).sanitized();
        assert_eq!(camera.fov, FALLBACK_FOV_DEGREES);
        assert_eq!(camera.aspect, FALLBACK_ASPECT);
    }

    #[test]
    fn projection_is_read_in_degrees() {
        let projection = PerspectiveProjection {
            fov: std::f32::consts::FRAC_PI_2,
            aspect_ratio: 2.,
            ..default()
        };
        let transform = GlobalTransform::from_xyz(1., 2., 3.);
        let camera = CameraState::from_perspective(&projection, &transform);

        assert!((camera.fov - 90.).abs() < 1e-4);
        assert_eq!(camera.aspect, 2.);
        assert_eq!(camera.position, Vec3::new(1., 2., 3.));
        assert_eq!(camera.camera_to_world, Mat4::from_translation(camera.position));
    }

    #[test]
    fn clamping_enforces_ranges() {
        let wild = EffectParameters {
            max_iterations: 10_000,
            accuracy: 5.,
            shadow_penumbra: 0.,
            ambient_occlusion_iterations: 0,
            reflection_count: -2,
            fog_intensity: 3.,
            mandelbulb_iterations: 99,
            mandelbox_iterations: 0,
            sphere_smooth: -1.,
            color_intensity: 9.,
            ..default()
        }
        .clamped();

        assert_eq!(wild.max_iterations, 500);
        assert_eq!(wild.accuracy, 0.1);
        assert_eq!(wild.shadow_penumbra, 1.);
        assert_eq!(wild.ambient_occlusion_iterations, 1);
        assert_eq!(wild.reflection_count, 0);
        assert_eq!(wild.fog_intensity, 1.);
        assert_eq!(wild.mandelbulb_iterations, 15);
        assert_eq!(wild.mandelbox_iterations, 1);
        assert_eq!(wild.sphere_smooth, 0.);
        assert_eq!(wild.color_intensity, 4.);
    }

    #[test]
    fn defaults_are_already_in_range() {
        let params = EffectParameters::default();
        assert_eq!(params.clamped(), params);
    }
}
