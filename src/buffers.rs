//! Ownership of the five pipeline buffers.
//!
//! The manager is the only holder of the node, line, parameter and two
//! indirect-argument buffers. Every (re)allocation releases what it replaces
//! first, and [`BufferManager::release`] is safe to call at any time.

use crate::backend::{Backend, BufferKind};
use crate::error::PipelineError;
use crate::layout::{DrawIndexedArgs, Line, Node, SimParameters};

/// Count of held buffers per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveBuffers {
    pub nodes: usize,
    pub lines: usize,
    pub parameters: usize,
    pub particle_args: usize,
    pub line_args: usize,
}

impl LiveBuffers {
    pub fn total(&self) -> usize {
        self.nodes + self.lines + self.parameters + self.particle_args + self.line_args
    }
}

/// Initial contents for [`BufferManager::resize`].
pub struct InitialState<'a> {
    pub nodes: &'a [Node],
    pub lines: &'a [Line],
    pub parameters: &'a SimParameters,
    pub particle_index_count: u32,
    pub line_index_count: u32,
}

pub struct BufferManager<B: Backend> {
    nodes: Option<B::Buffer>,
    lines: Option<B::Buffer>,
    parameters: Option<B::Buffer>,
    particle_args: Option<B::Buffer>,
    line_args: Option<B::Buffer>,
    node_count: u32,
    line_slot_count: u32,
}

impl<B: Backend> Default for BufferManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> BufferManager<B> {
    /// A manager holding nothing.
    pub fn new() -> Self {
        Self {
            nodes: None,
            lines: None,
            parameters: None,
            particle_args: None,
            line_args: None,
            node_count: 0,
            line_slot_count: 0,
        }
    }

    /// Create the node, line and parameter buffers and upload their contents.
    ///
    /// Any structured buffers held from a previous allocation are released
    /// first. On failure, buffers created by this call stay held until the
    /// next [`release`](Self::release).
    pub fn allocate(
        &mut self,
        backend: &mut B,
        nodes: &[Node],
        lines: &[Line],
        parameters: &SimParameters,
    ) -> Result<(), PipelineError> {
        self.release_structured(backend);

        self.nodes = Some(backend.create_buffer(BufferKind::Nodes, bytemuck::cast_slice(nodes))?);
        self.node_count = nodes.len() as u32;
        self.lines = Some(backend.create_buffer(BufferKind::Lines, bytemuck::cast_slice(lines))?);
        self.line_slot_count = lines.len() as u32;
        self.parameters = Some(backend.create_buffer(
            BufferKind::Parameters,
            bytemuck::bytes_of(parameters),
        )?);

        log::info!(
            "Allocated {} nodes ({} bytes) and {} line slots ({} bytes)",
            nodes.len(),
            std::mem::size_of_val(nodes),
            lines.len(),
            std::mem::size_of_val(lines),
        );
        Ok(())
    }

    /// Create both indirect-argument buffers.
    ///
    /// An index count of 0 (missing mesh) is valid and draws nothing.
    pub fn allocate_indirect_args(
        &mut self,
        backend: &mut B,
        particle_index_count: u32,
        node_count: u32,
        line_index_count: u32,
        line_slot_count: u32,
    ) -> Result<(), PipelineError> {
        release_slot(backend, &mut self.particle_args);
        release_slot(backend, &mut self.line_args);

        let particle_args = DrawIndexedArgs::new(particle_index_count, node_count);
        let line_args = DrawIndexedArgs::new(line_index_count, line_slot_count);

        self.particle_args = Some(backend.create_buffer(
            BufferKind::ParticleArgs,
            bytemuck::bytes_of(&particle_args),
        )?);
        self.line_args = Some(backend.create_buffer(
            BufferKind::LineArgs,
            bytemuck::bytes_of(&line_args),
        )?);

        log::debug!("Indirect args: particles {:?}, lines {:?}", particle_args, line_args);
        Ok(())
    }

    /// Tear down and rebuild all five buffers together.
    ///
    /// The counts are coupled (line slots = nodes * lines per node), so the
    /// structured and argument buffers are never rebuilt separately.
    pub fn resize(&mut self, backend: &mut B, state: InitialState<'_>) -> Result<(), PipelineError> {
        self.release(backend);
        self.allocate(backend, state.nodes, state.lines, state.parameters)?;
        self.allocate_indirect_args(
            backend,
            state.particle_index_count,
            state.nodes.len() as u32,
            state.line_index_count,
            state.lines.len() as u32,
        )
    }

    /// Upload a new parameter record.
    pub fn write_parameters(&self, backend: &mut B, parameters: &SimParameters) {
        if let Some(buffer) = &self.parameters {
            backend.write_buffer(buffer, bytemuck::bytes_of(parameters));
        }
    }

    /// Release every held buffer. Idempotent.
    pub fn release(&mut self, backend: &mut B) {
        let held = self.live().total();
        self.release_structured(backend);
        release_slot(backend, &mut self.particle_args);
        release_slot(backend, &mut self.line_args);
        if held > 0 {
            log::info!("Released {} pipeline buffers", held);
        }
    }

    fn release_structured(&mut self, backend: &mut B) {
        release_slot(backend, &mut self.nodes);
        release_slot(backend, &mut self.lines);
        release_slot(backend, &mut self.parameters);
        self.node_count = 0;
        self.line_slot_count = 0;
    }

    pub fn live(&self) -> LiveBuffers {
        LiveBuffers {
            nodes: self.nodes.is_some() as usize,
            lines: self.lines.is_some() as usize,
            parameters: self.parameters.is_some() as usize,
            particle_args: self.particle_args.is_some() as usize,
            line_args: self.line_args.is_some() as usize,
        }
    }

    pub fn buffer(&self, kind: BufferKind) -> Option<&B::Buffer> {
        match kind {
            BufferKind::Nodes => self.nodes.as_ref(),
            BufferKind::Lines => self.lines.as_ref(),
            BufferKind::Parameters => self.parameters.as_ref(),
            BufferKind::ParticleArgs => self.particle_args.as_ref(),
            BufferKind::LineArgs => self.line_args.as_ref(),
        }
    }

    pub fn nodes(&self) -> Option<&B::Buffer> {
        self.nodes.as_ref()
    }

    pub fn lines(&self) -> Option<&B::Buffer> {
        self.lines.as_ref()
    }

    pub fn parameters(&self) -> Option<&B::Buffer> {
        self.parameters.as_ref()
    }

    pub fn particle_args(&self) -> Option<&B::Buffer> {
        self.particle_args.as_ref()
    }

    pub fn line_args(&self) -> Option<&B::Buffer> {
        self.line_args.as_ref()
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn line_slot_count(&self) -> u32 {
        self.line_slot_count
    }
}

fn release_slot<B: Backend>(backend: &mut B, slot: &mut Option<B::Buffer>) {
    if let Some(buffer) = slot.take() {
        backend.destroy_buffer(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Readback;
    use crate::host::HostBackend;

    fn nodes(n: usize) -> Vec<Node> {
        vec![Node::default(); n]
    }

    #[test]
    fn test_allocate_sizes() {
        let mut host = HostBackend::new();
        let mut buffers = BufferManager::new();
        buffers
            .allocate(&mut host, &nodes(5), &vec![Line::EMPTY; 10], &SimParameters::default())
            .unwrap();

        assert_eq!(buffers.node_count(), 5);
        assert_eq!(buffers.line_slot_count(), 10);
        assert_eq!(host.live_buffers(), 3);
        assert_eq!(buffers.live().total(), 3);
    }

    #[test]
    fn test_reallocate_does_not_leak() {
        let mut host = HostBackend::new();
        let mut buffers = BufferManager::new();
        for n in [4, 8, 2] {
            buffers
                .allocate(&mut host, &nodes(n), &vec![Line::EMPTY; n * 2], &SimParameters::default())
                .unwrap();
            buffers.allocate_indirect_args(&mut host, 6, n as u32, 6, n as u32 * 2).unwrap();
        }
        assert_eq!(host.live_buffers(), 5);
        for kind in BufferKind::ALL {
            assert_eq!(host.live_buffers_of(kind), 1);
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut host = HostBackend::new();
        let mut buffers: BufferManager<HostBackend> = BufferManager::new();
        buffers.release(&mut host);
        buffers
            .allocate(&mut host, &nodes(3), &vec![Line::EMPTY; 3], &SimParameters::default())
            .unwrap();
        buffers.release(&mut host);
        buffers.release(&mut host);
        assert_eq!(host.live_buffers(), 0);
        assert_eq!(buffers.live(), LiveBuffers::default());
        assert_eq!(buffers.node_count(), 0);
    }

    #[test]
    fn test_args_contents() {
        let mut host = HostBackend::new();
        let mut buffers = BufferManager::new();
        buffers.allocate_indirect_args(&mut host, 0, 7, 6, 21).unwrap();

        let particle = host.read_buffer(buffers.particle_args().unwrap()).unwrap();
        let line = host.read_buffer(buffers.line_args().unwrap()).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<DrawIndexedArgs>(&particle), DrawIndexedArgs::new(0, 7));
        assert_eq!(bytemuck::pod_read_unaligned::<DrawIndexedArgs>(&line), DrawIndexedArgs::new(6, 21));
    }

    #[test]
    fn test_write_parameters_without_buffer_is_noop() {
        let mut host = HostBackend::new();
        let buffers: BufferManager<HostBackend> = BufferManager::new();
        buffers.write_parameters(&mut host, &SimParameters::default());
        assert_eq!(host.live_buffers(), 0);
    }
}
