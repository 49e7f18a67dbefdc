use bevy::prelude::*;
use bytemuck::{Pod, Zeroable};
use log::debug;

use super::{
    frustum::FrustumCorners,
    scene::ResolveError,
    uniform::{FrameUniforms, UniformSink, upload},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    /// Scene rendered into the temporary target.
    CapturingScene,
    ParameterPush,
    /// Full-screen quad drawn through the shader.
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Composited,
    /// No usable shader, the captured scene was copied through untouched.
    Bypassed,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Orthographic `x`, `y` in `0..=1`, `z` holds the frustum corner row.
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const fn new(x: f32, y: f32, corner: usize) -> Self {
        Self {
            position: [x, y, corner as f32],
            uv: [x, y],
        }
    }

    #[inline]
    pub fn corner(&self) -> usize {
        self.position[2] as usize
    }
}

/// Screen quad in bottom-left, bottom-right, top-right, top-left order.
///
/// The fragment shader interpolates the frustum row picked by each vertex to
/// rebuild per pixel view rays, so the corner mapping must not change.
pub const FULLSCREEN_QUAD: [QuadVertex; 4] = [
    QuadVertex::new(0., 0., FrustumCorners::BOTTOM_LEFT),
    QuadVertex::new(1., 0., FrustumCorners::BOTTOM_RIGHT),
    QuadVertex::new(1., 1., FrustumCorners::TOP_RIGHT),
    QuadVertex::new(0., 1., FrustumCorners::TOP_LEFT),
];

pub const FULLSCREEN_QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// The rendering runtime a frame is composed on.
pub trait FrameHost {
    /// Temporary off-screen color target.
    type Target;
    type Sink: UniformSink;

    fn viewport_size(&self) -> UVec2;

    fn acquire_target(&mut self, size: UVec2) -> Self::Target;

    fn capture_scene(&mut self, target: &mut Self::Target);

    /// Uniform table of the ray marching shader, `None` while the shader is
    /// missing or not built.
    fn shader_sink(&mut self) -> Option<&mut Self::Sink>;

    /// Copies `source` to the output unmodified.
    fn pass_through(&mut self, source: &Self::Target);

    fn draw_fullscreen_quad(&mut self, quad: &[QuadVertex; 4], source: &Self::Target);

    fn release_target(&mut self, target: Self::Target);

    fn enter_phase(&mut self, phase: FramePhase) {
        debug!("ray march frame: {phase:?}");
    }
}

/// Runs one frame: capture, push every uniform, draw.
///
/// `assemble` is only called when the shader is usable. A resolve error
/// passes the captured scene through and is returned to the caller.
pub fn compose_frame<H: FrameHost>(
    host: &mut H,
    assemble: impl FnOnce() -> Result<FrameUniforms, ResolveError>,
) -> Result<FrameOutcome, ResolveError> {
    host.enter_phase(FramePhase::CapturingScene);
    let size = host.viewport_size();
    let mut target = host.acquire_target(size);
    host.capture_scene(&mut target);

    if host.shader_sink().is_none() {
        debug!("ray march shader unavailable, frame passed through");
        return Ok(bypass(host, target));
    }

    host.enter_phase(FramePhase::ParameterPush);
    let frame = match assemble() {
        Ok(frame) => frame,
        Err(err) => {
            bypass(host, target);
            return Err(err);
        }
    };
    if let Some(sink) = host.shader_sink() {
        upload(&frame, sink);
    }

    host.enter_phase(FramePhase::Composite);
    host.draw_fullscreen_quad(&FULLSCREEN_QUAD, &target);
    host.release_target(target);
    host.enter_phase(FramePhase::Idle);

    Ok(FrameOutcome::Composited)
}

fn bypass<H: FrameHost>(host: &mut H, target: H::Target) -> FrameOutcome {
    host.pass_through(&target);
    host.release_target(target);
    host.enter_phase(FramePhase::Idle);
    FrameOutcome::Bypassed
}
