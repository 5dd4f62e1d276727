//! Indirect draw coordination.
//!
//! Two draws per frame, particles then lines. Instance and index counts live
//! in the argument buffers; the host never loops over instances or uploads
//! per-instance transforms.

use crate::backend::{Aabb, Backend, IndirectDraw, ShadowCasting, StageBindings};
use crate::buffers::BufferManager;

/// Edge of the default draw bounds, a cube centered at the origin.
pub const DEFAULT_DRAW_EXTENT: f32 = 200.0;

/// Bounds that contain a simulation confined to `radius`.
///
/// The default cube is kept unless the sphere would not fit inside it.
pub fn draw_bounds(radius: f32) -> Aabb {
    Aabb::centered_cube(DEFAULT_DRAW_EXTENT.max(radius * 2.0))
}

pub struct DrawCoordinator {
    bounds: Aabb,
}

impl DrawCoordinator {
    pub fn new(bounding_sphere_radius: f32) -> Self {
        Self {
            bounds: draw_bounds(bounding_sphere_radius),
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Issue the particle and line draws. Returns how many were issued.
    pub fn draw_all<B: Backend>(&self, backend: &mut B, buffers: &BufferManager<B>) -> usize {
        let (Some(nodes), Some(lines), Some(parameters), Some(particle_args), Some(line_args)) = (
            buffers.nodes(),
            buffers.lines(),
            buffers.parameters(),
            buffers.particle_args(),
            buffers.line_args(),
        ) else {
            log::debug!("Skipping draws: pipeline buffers are not allocated");
            return 0;
        };

        backend.draw_indexed_indirect(IndirectDraw {
            bindings: StageBindings::Particles { nodes },
            args: particle_args,
            bounds: self.bounds,
            shadows: ShadowCasting::Off,
        });

        backend.draw_indexed_indirect(IndirectDraw {
            bindings: StageBindings::Lines {
                nodes,
                lines,
                parameters,
            },
            args: line_args,
            bounds: self.bounds,
            shadows: ShadowCasting::Off,
        });

        2
    }
}
