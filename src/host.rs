//! Host-memory backend.
//!
//! Buffers live in host memory and dispatches run a [`Kernel`] (the rayon
//! [`CpuKernel`] by default). Draws are not rasterised; each one is recorded
//! with the argument record it would have consumed, so tests can check what
//! the draw stage was asked to do.

use std::collections::HashMap;

use crate::backend::{
    Aabb, Backend, BufferKind, IndirectDraw, KernelBindings, Readback, ShadowCasting, StageBindings,
};
use crate::error::{GpuError, PipelineError};
use crate::kernel::{CpuKernel, Kernel};
use crate::layout::{DrawIndexedArgs, Line, Node, SimParameters, DRAW_ARGS_WORDS, PARAMETERS_STRIDE};
use crate::mesh::{Assets, Stage};

/// Handle to a host allocation. Not `Clone`: the owner frees it.
#[derive(Debug, PartialEq, Eq)]
pub struct HostBuffer {
    id: u64,
    kind: BufferKind,
}

impl HostBuffer {
    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

/// A draw as seen by the host backend.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub stage: Stage,
    /// Arguments read from the bound argument buffer at draw time.
    pub args: DrawIndexedArgs,
    /// Kinds of the buffers bound to the stage, in binding order.
    pub bound: Vec<BufferKind>,
    pub bounds: Aabb,
    pub shadows: ShadowCasting,
    /// Index count of the mesh prepared for this stage.
    pub mesh_index_count: u32,
}

/// Backend that executes on the host.
pub struct HostBackend<K: Kernel = CpuKernel> {
    kernel: K,
    // Stored as words so records can be cast in place.
    allocations: HashMap<u64, Vec<u32>>,
    kinds: HashMap<u64, BufferKind>,
    next_id: u64,
    mesh_index_counts: HashMap<Stage, u32>,
    pending_draws: Vec<DrawRecord>,
    last_frame: Vec<DrawRecord>,
    dispatches: u64,
    submits: u64,
    fail_on: Option<BufferKind>,
}

impl HostBackend<CpuKernel> {
    pub fn new() -> Self {
        Self::with_kernel(CpuKernel)
    }
}

impl Default for HostBackend<CpuKernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> HostBackend<K> {
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            allocations: HashMap::new(),
            kinds: HashMap::new(),
            next_id: 0,
            mesh_index_counts: HashMap::new(),
            pending_draws: Vec::new(),
            last_frame: Vec::new(),
            dispatches: 0,
            submits: 0,
            fail_on: None,
        }
    }

    /// Make every future allocation of `kind` fail, to exercise startup
    /// failure handling.
    pub fn fail_allocations_of(&mut self, kind: Option<BufferKind>) {
        self.fail_on = kind;
    }

    /// Number of live allocations.
    pub fn live_buffers(&self) -> usize {
        self.allocations.len()
    }

    /// Number of live allocations of `kind`.
    pub fn live_buffers_of(&self, kind: BufferKind) -> usize {
        self.kinds.values().filter(|&&k| k == kind).count()
    }

    /// Draws submitted with the most recent `submit`.
    pub fn last_frame(&self) -> &[DrawRecord] {
        &self.last_frame
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    pub fn submit_count(&self) -> u64 {
        self.submits
    }

    fn words(&self, buffer: &HostBuffer) -> &[u32] {
        self.allocations
            .get(&buffer.id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl<K: Kernel> Backend for HostBackend<K> {
    type Buffer = HostBuffer;

    fn prepare_stages(&mut self, assets: &Assets) -> Result<(), PipelineError> {
        for stage in [Stage::Particles, Stage::Lines] {
            let count = assets.mesh(stage).map(|m| m.index_count()).unwrap_or(0);
            self.mesh_index_counts.insert(stage, count);
        }
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<HostBuffer, PipelineError> {
        let size = contents.len() as u64;
        if self.fail_on == Some(kind) {
            return Err(PipelineError::Allocation {
                kind,
                size,
                reason: "injected host allocation failure".to_string(),
            });
        }
        if contents.len() % 4 != 0 {
            return Err(PipelineError::Allocation {
                kind,
                size,
                reason: "size is not a multiple of 4 bytes".to_string(),
            });
        }

        let mut words = vec![0u32; contents.len() / 4];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words).copy_from_slice(contents);

        let id = self.next_id;
        self.next_id += 1;
        self.allocations.insert(id, words);
        self.kinds.insert(id, kind);
        Ok(HostBuffer { id, kind })
    }

    fn write_buffer(&mut self, buffer: &HostBuffer, data: &[u8]) {
        if let Some(words) = self.allocations.get_mut(&buffer.id) {
            let bytes = bytemuck::cast_slice_mut::<u32, u8>(words);
            let len = data.len().min(bytes.len());
            bytes[..len].copy_from_slice(&data[..len]);
        }
    }

    fn destroy_buffer(&mut self, buffer: HostBuffer) {
        self.allocations.remove(&buffer.id);
        self.kinds.remove(&buffer.id);
    }

    fn dispatch(&mut self, bindings: KernelBindings<'_, HostBuffer>, _workgroups: u32) {
        let params: SimParameters = match self
            .allocations
            .get(&bindings.parameters.id)
            .and_then(|words| bytemuck::cast_slice::<u32, u8>(words).get(..PARAMETERS_STRIDE))
        {
            Some(bytes) => bytemuck::pod_read_unaligned(bytes),
            None => return,
        };
        if !self.allocations.contains_key(&bindings.nodes.id)
            || !self.allocations.contains_key(&bindings.lines.id)
        {
            return;
        }
        let mut node_words = self.allocations.remove(&bindings.nodes.id).unwrap_or_default();
        let mut line_words = self.allocations.remove(&bindings.lines.id).unwrap_or_default();

        {
            let nodes: &mut [Node] = bytemuck::cast_slice_mut(&mut node_words);
            let lines: &mut [Line] = bytemuck::cast_slice_mut(&mut line_words);
            self.kernel.step(&params, nodes, lines);
        }

        self.allocations.insert(bindings.nodes.id, node_words);
        self.allocations.insert(bindings.lines.id, line_words);
        self.dispatches += 1;
    }

    fn draw_indexed_indirect(&mut self, draw: IndirectDraw<'_, HostBuffer>) {
        let stage = draw.bindings.stage();
        let bound = match draw.bindings {
            StageBindings::Particles { nodes } => vec![nodes.kind],
            StageBindings::Lines { nodes, lines, parameters } => {
                vec![nodes.kind, lines.kind, parameters.kind]
            }
        };
        let args = match self.words(draw.args) {
            words if words.len() >= DRAW_ARGS_WORDS => {
                bytemuck::cast_slice::<u32, DrawIndexedArgs>(&words[..DRAW_ARGS_WORDS])[0]
            }
            _ => DrawIndexedArgs::default(),
        };

        self.pending_draws.push(DrawRecord {
            stage,
            args,
            bound,
            bounds: draw.bounds,
            shadows: draw.shadows,
            mesh_index_count: self.mesh_index_counts.get(&stage).copied().unwrap_or(0),
        });
    }

    fn submit(&mut self) -> Result<(), PipelineError> {
        self.last_frame = std::mem::take(&mut self.pending_draws);
        self.submits += 1;
        Ok(())
    }
}

impl<K: Kernel> Readback for HostBackend<K> {
    fn read_buffer(&mut self, buffer: &HostBuffer) -> Result<Vec<u8>, GpuError> {
        match self.allocations.get(&buffer.id) {
            Some(words) => Ok(bytemuck::cast_slice::<u32, u8>(words).to_vec()),
            None => Err(GpuError::BufferMapping(format!(
                "{} has been released",
                buffer.kind.label()
            ))),
        }
    }
}
