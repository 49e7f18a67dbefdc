use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_inspector_egui::quick::WorldInspectorPlugin;
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_raymarch_camera::prelude::*;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            RayMarchingPlugin::default(),
            EguiPlugin {
                enable_multipass_for_primary_context: true,
            },
            WorldInspectorPlugin::new(),
            PanOrbitCameraPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, spin_spheres)
        .run();
}

fn setup(mut commands: Commands) {
    // The anchors only carry transforms, the shapes themselves live in the
    // shader at `assets/shaders/ray_marching.wgsl`. The bundled one only
    // draws the sphere.
    commands.spawn((
        Name::new("Sun"),
        SceneAnchor::Light,
        DirectionalLight::default(),
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        Name::new("Spheres"),
        SceneAnchor::Sphere,
        Transform::from_xyz(0.0, 1.0, 0.0),
    ));
    commands.spawn((
        Name::new("Mandelbulb"),
        SceneAnchor::Mandelbulb,
        Transform::from_xyz(-4.0, 1.5, -2.0),
    ));
    commands.spawn((
        Name::new("Mandelbox"),
        SceneAnchor::Mandelbox,
        Transform::from_xyz(4.0, 1.5, -2.0),
    ));

    // Camera
    commands.spawn((
        RayMarchCamera {
            params: EffectParameters {
                sphere_w: 0.75,
                sphere_mod_interval: Vec3::new(3.0, 0.0, 3.0),
                ..default()
            },
            sphere_gradient: ColorGradient::new([
                (0.0, Srgba::rgb(0.9, 0.2, 0.3)),
                (0.5, Srgba::rgb(0.95, 0.8, 0.2)),
                (1.0, Srgba::rgb(0.2, 0.4, 0.9)),
            ]),
            ..default()
        },
        Camera {
            hdr: false,
            ..default()
        },
        PanOrbitCamera::default(),
        Msaa::Off,
        Transform::from_xyz(-2.0, 2.5, 8.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn spin_spheres(time: Res<Time>, mut cameras: Query<&mut RayMarchCamera>) {
    for mut camera in &mut cameras {
        camera.params.degree_rotate = (camera.params.degree_rotate + 20.0 * time.delta_secs()) % 360.0;
    }
}
