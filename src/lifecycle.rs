//! Pipeline ownership and lifetime.
//!
//! A [`Runtime`] is the one owning context for a device: it holds the backend
//! by value and at most one active [`Pipeline`]. The process entry point builds
//! it once and passes it by reference to whatever drives the frame loop.
//!
//! ```ignore
//! let mut runtime = Runtime::new(HostBackend::new());
//! let mut clock = FrameClock::new();
//! runtime.start(SimConfig::new().with_count(500), &Assets::builtin())?;
//! loop {
//!     runtime.tick(clock.tick())?;
//! }
//! ```
//!
//! Starting a second pipeline while one runs fails with
//! [`PipelineError::AlreadyRunning`] and leaves the running one alone.
//! Shutting down consumes the pipeline, so its buffers are released exactly
//! once; dropping the runtime shuts down whatever is still active.

use crate::backend::{Backend, BufferKind, Readback};
use crate::buffers::{BufferManager, InitialState};
use crate::config::SimConfig;
use crate::draw::DrawCoordinator;
use crate::error::{GpuError, PipelineError};
use crate::layout::{DrawIndexedArgs, Line, Node, SimParameters};
use crate::mesh::{Assets, Stage};
use crate::spawn::{empty_lines, spawn_nodes};
use crate::stepper::SimulationStepper;

/// Decoded copy of every pipeline buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub lines: Vec<Line>,
    pub parameters: SimParameters,
    pub particle_args: DrawIndexedArgs,
    pub line_args: DrawIndexedArgs,
}

impl Snapshot {
    /// Lines starting at node `index` that are not the empty sentinel.
    pub fn lines_from(&self, index: usize) -> impl Iterator<Item = &Line> {
        self.lines
            .iter()
            .filter(move |line| line.start_node_index == index as i32)
    }
}

/// One active simulation: its buffers, stepper and draw coordinator.
pub struct Pipeline<B: Backend> {
    buffers: BufferManager<B>,
    stepper: SimulationStepper,
    draw: DrawCoordinator,
    index_counts: (u32, u32),
}

impl<B: Backend> Pipeline<B> {
    fn build(backend: &mut B, config: SimConfig, assets: &Assets) -> Result<Self, PipelineError> {
        let config = config.clamped();
        backend.prepare_stages(assets)?;

        let mut pipeline = Self {
            buffers: BufferManager::new(),
            stepper: SimulationStepper::new(config.clone()),
            draw: DrawCoordinator::new(config.bounding_sphere_radius),
            index_counts: (
                assets.index_count(Stage::Particles),
                assets.index_count(Stage::Lines),
            ),
        };

        if let Err(e) = pipeline.rebuild(backend, &config) {
            log::error!("Pipeline startup failed: {}", e);
            pipeline.buffers.release(backend);
            return Err(e);
        }
        Ok(pipeline)
    }

    fn rebuild(&mut self, backend: &mut B, config: &SimConfig) -> Result<(), PipelineError> {
        let nodes = spawn_nodes(config);
        let lines = empty_lines(config.line_slot_count() as usize);
        let parameters = config.parameters(0.0);
        self.buffers.resize(
            backend,
            InitialState {
                nodes: &nodes,
                lines: &lines,
                parameters: &parameters,
                particle_index_count: self.index_counts.0,
                line_index_count: self.index_counts.1,
            },
        )
    }

    /// Advance one tick and issue the draws. Does not submit.
    pub fn frame(&mut self, backend: &mut B, delta_time: f32) {
        self.stepper.tick(backend, &self.buffers, delta_time);
        self.draw.draw_all(backend, &self.buffers);
    }

    pub fn config(&self) -> &SimConfig {
        self.stepper.config()
    }

    pub fn buffers(&self) -> &BufferManager<B> {
        &self.buffers
    }

    pub fn stepper(&self) -> &SimulationStepper {
        &self.stepper
    }

    pub fn draw_coordinator(&self) -> &DrawCoordinator {
        &self.draw
    }

    fn shutdown(mut self, backend: &mut B) {
        self.buffers.release(backend);
        log::info!("Pipeline shut down after {} ticks", self.stepper.ticks());
    }

    /// Blocking copy of every buffer. Stalls the device; debugging only.
    pub fn snapshot(&self, backend: &mut B) -> Result<Snapshot, GpuError>
    where
        B: Readback,
    {
        let mut read = |kind: BufferKind| -> Result<Vec<u8>, GpuError> {
            match self.buffers.buffer(kind) {
                Some(buffer) => backend.read_buffer(buffer),
                None => Err(GpuError::BufferMapping(format!("{} is not allocated", kind.label()))),
            }
        };

        let nodes = read(BufferKind::Nodes)?;
        let lines = read(BufferKind::Lines)?;
        let parameters = read(BufferKind::Parameters)?;
        let particle_args = read(BufferKind::ParticleArgs)?;
        let line_args = read(BufferKind::LineArgs)?;

        Ok(Snapshot {
            nodes: bytemuck::pod_collect_to_vec(&nodes),
            lines: bytemuck::pod_collect_to_vec(&lines),
            parameters: bytemuck::pod_read_unaligned(&parameters),
            particle_args: bytemuck::pod_read_unaligned(&particle_args),
            line_args: bytemuck::pod_read_unaligned(&line_args),
        })
    }
}

/// Owning context for a backend and its single pipeline.
pub struct Runtime<B: Backend> {
    backend: B,
    pipeline: Option<Pipeline<B>>,
}

impl<B: Backend> Runtime<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pipeline: None,
        }
    }

    /// Build and activate a pipeline.
    ///
    /// Fails with [`PipelineError::AlreadyRunning`] if one is active. If an
    /// allocation fails, everything allocated so far is released first.
    pub fn start(&mut self, config: SimConfig, assets: &Assets) -> Result<&mut Pipeline<B>, PipelineError> {
        if self.pipeline.is_some() {
            log::warn!("Refusing to start a second pipeline while one is running");
            return Err(PipelineError::AlreadyRunning);
        }

        let pipeline = Pipeline::build(&mut self.backend, config, assets)?;
        log::info!(
            "Pipeline started: {} nodes, {} lines per node",
            pipeline.config().count,
            pipeline.config().lines_per_node
        );
        Ok(self.pipeline.insert(pipeline))
    }

    /// Tick, draw and submit one frame. Submits an empty frame when idle.
    pub fn tick(&mut self, delta_time: f32) -> Result<(), PipelineError> {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.frame(&mut self.backend, delta_time);
        }
        self.backend.submit()
    }

    /// Rebuild the running pipeline's records and buffers for `config`.
    ///
    /// A failed allocation is fatal to the pipeline: it is shut down and the
    /// runtime is left idle, ready for a new [`Runtime::start`].
    pub fn reconfigure(&mut self, config: SimConfig) -> Result<(), PipelineError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        let config = config.clamped();
        if let Err(e) = pipeline.rebuild(&mut self.backend, &config) {
            log::error!("Pipeline reconfiguration failed: {}", e);
            self.shutdown();
            return Err(e);
        }
        pipeline.stepper.reconfigure(config.clone());
        pipeline.draw = DrawCoordinator::new(config.bounding_sphere_radius);
        log::info!("Pipeline reconfigured: {} nodes", config.count);
        Ok(())
    }

    /// Release the active pipeline's buffers. No-op when idle.
    pub fn shutdown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown(&mut self.backend);
        }
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> Option<&Pipeline<B>> {
        self.pipeline.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Snapshot of the active pipeline, if any.
    pub fn snapshot(&mut self) -> Option<Result<Snapshot, GpuError>>
    where
        B: Readback,
    {
        let pipeline = self.pipeline.as_ref()?;
        Some(pipeline.snapshot(&mut self.backend))
    }
}

impl<B: Backend> Drop for Runtime<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
