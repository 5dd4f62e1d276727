//! The device seam between the pipeline and whatever executes it.
//!
//! The buffer manager, stepper and draw coordinator only talk to a
//! [`Backend`]. [`crate::gpu::WgpuBackend`] runs on a real GPU;
//! [`crate::host::HostBackend`] keeps buffers in host memory and runs the CPU
//! kernel, which is how the pipeline is exercised without device access.
//!
//! Calls on a backend are ordered: a buffer write is visible to the next
//! dispatch, and a dispatch completes before the next draw reads its output.
//! A backend that splits work over several queues must add barriers itself.

use glam::{Mat4, Vec3, Vec4};

use crate::error::{GpuError, PipelineError};
use crate::mesh::{Assets, Stage};

/// The five buffers a pipeline owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Nodes,
    Lines,
    Parameters,
    ParticleArgs,
    LineArgs,
}

impl BufferKind {
    pub const ALL: [BufferKind; 5] = [
        BufferKind::Nodes,
        BufferKind::Lines,
        BufferKind::Parameters,
        BufferKind::ParticleArgs,
        BufferKind::LineArgs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BufferKind::Nodes => "Node Buffer",
            BufferKind::Lines => "Line Buffer",
            BufferKind::Parameters => "Parameters Buffer",
            BufferKind::ParticleArgs => "Particle Args Buffer",
            BufferKind::LineArgs => "Line Args Buffer",
        }
    }

    pub fn is_indirect_args(self) -> bool {
        matches!(self, BufferKind::ParticleArgs | BufferKind::LineArgs)
    }
}

/// Buffers bound to the kernel for one dispatch.
pub struct KernelBindings<'a, T> {
    pub parameters: &'a T,
    pub nodes: &'a T,
    pub lines: &'a T,
}

/// Buffers bound to a render stage.
pub enum StageBindings<'a, T> {
    Particles {
        nodes: &'a T,
    },
    Lines {
        nodes: &'a T,
        lines: &'a T,
        parameters: &'a T,
    },
}

impl<T> StageBindings<'_, T> {
    pub fn stage(&self) -> Stage {
        match self {
            StageBindings::Particles { .. } => Stage::Particles,
            StageBindings::Lines { .. } => Stage::Lines,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowCasting {
    Off,
    On,
}

/// Axis-aligned bounding box used to cull a whole draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extent: Vec3,
}

impl Aabb {
    /// Cube of edge `side` centered at the origin.
    pub fn centered_cube(side: f32) -> Self {
        Self {
            center: Vec3::ZERO,
            half_extent: Vec3::splat(side * 0.5),
        }
    }

    pub fn side(&self) -> f32 {
        self.half_extent.max_element() * 2.0
    }

    pub fn contains_sphere(&self, radius: f32) -> bool {
        self.half_extent.min_element() >= radius
    }

    fn corners(&self) -> [Vec3; 8] {
        let (c, h) = (self.center, self.half_extent);
        [
            c + Vec3::new(-h.x, -h.y, -h.z),
            c + Vec3::new(h.x, -h.y, -h.z),
            c + Vec3::new(-h.x, h.y, -h.z),
            c + Vec3::new(h.x, h.y, -h.z),
            c + Vec3::new(-h.x, -h.y, h.z),
            c + Vec3::new(h.x, -h.y, h.z),
            c + Vec3::new(-h.x, h.y, h.z),
            c + Vec3::new(h.x, h.y, h.z),
        ]
    }

    /// Conservative frustum test: `false` only if every corner lies outside
    /// the same clip plane.
    pub fn visible_from(&self, view_proj: Mat4) -> bool {
        let clip: Vec<Vec4> = self
            .corners()
            .iter()
            .map(|p| view_proj * p.extend(1.0))
            .collect();

        let outside = |test: fn(&Vec4) -> bool| clip.iter().all(test);

        !(outside(|v| v.x < -v.w)
            || outside(|v| v.x > v.w)
            || outside(|v| v.y < -v.w)
            || outside(|v| v.y > v.w)
            || outside(|v| v.z < 0.0)
            || outside(|v| v.z > v.w))
    }
}

/// One indexed indirect draw.
pub struct IndirectDraw<'a, T> {
    pub bindings: StageBindings<'a, T>,
    pub args: &'a T,
    pub bounds: Aabb,
    pub shadows: ShadowCasting,
}

/// Device operations the pipeline needs.
pub trait Backend {
    type Buffer;

    /// Upload meshes and build the render stages for `assets`.
    fn prepare_stages(&mut self, assets: &Assets) -> Result<(), PipelineError>;

    /// Create a buffer of `kind` initialised with `contents`.
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<Self::Buffer, PipelineError>;

    fn write_buffer(&mut self, buffer: &Self::Buffer, data: &[u8]);

    /// Free the device memory behind `buffer` now.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Run the kernel with `workgroups` groups along x.
    fn dispatch(&mut self, bindings: KernelBindings<'_, Self::Buffer>, workgroups: u32);

    fn draw_indexed_indirect(&mut self, draw: IndirectDraw<'_, Self::Buffer>);

    /// Flush everything recorded since the last submit.
    fn submit(&mut self) -> Result<(), PipelineError>;
}

/// Opt-in, blocking readback of buffer contents.
///
/// Never used by the tick path; it stalls the device and exists for
/// debugging and verification only.
pub trait Readback: Backend {
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>, GpuError>;
}
