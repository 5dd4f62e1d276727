//! # SigLines
//!
//! GPU particle simulation where every node keeps a fixed block of line slots
//! that a compute kernel fills with its nearest neighbours each tick. Nodes
//! and lines are drawn with two indirect instanced draws; the host never
//! touches per-instance data after startup.
//!
//! ## Quick Start
//!
//! ```ignore
//! use siglines::prelude::*;
//!
//! fn main() -> Result<(), PipelineError> {
//!     let mut runtime = Runtime::new(HostBackend::new());
//!     runtime.start(
//!         SimConfig::new().with_count(500).with_lines_per_node(3).with_line_min_dist(20.0),
//!         &Assets::builtin(),
//!     )?;
//!
//!     let mut clock = FrameClock::new();
//!     for _ in 0..60 {
//!         runtime.tick(clock.tick())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! | Layer | Types |
//! |-------|-------|
//! | Records | [`Node`], [`Line`], [`SimParameters`], [`DrawIndexedArgs`] |
//! | Buffers | [`BufferManager`] |
//! | Per tick | [`SimulationStepper`], [`DrawCoordinator`] |
//! | Lifetime | [`Runtime`], [`Pipeline`] |
//! | Devices | [`Backend`], [`HostBackend`], [`WgpuBackend`] |
//!
//! [`HostBackend`] runs the kernel on the CPU with rayon and records draws
//! instead of rasterising them. It exists so the pipeline can be exercised
//! without a GPU.

pub mod app;
pub mod backend;
pub mod buffers;
pub mod config;
pub mod draw;
pub mod error;
pub mod gpu;
pub mod host;
pub mod kernel;
pub mod layout;
pub mod lifecycle;
pub mod mesh;
pub mod spawn;
pub mod stepper;
pub mod time;

pub use backend::{Aabb, Backend, BufferKind, Readback, ShadowCasting};
pub use buffers::BufferManager;
pub use bytemuck;
pub use config::SimConfig;
pub use draw::DrawCoordinator;
pub use error::{AppError, ConfigError, GpuError, PipelineError};
pub use glam::Vec3;
pub use gpu::WgpuBackend;
pub use host::HostBackend;
pub use kernel::{CpuKernel, Kernel};
pub use layout::{DrawIndexedArgs, Line, Node, SimParameters};
pub use lifecycle::{Pipeline, Runtime, Snapshot};
pub use mesh::{Assets, Mesh, Stage};
pub use stepper::SimulationStepper;
pub use time::FrameClock;

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use siglines::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{Backend, Readback};
    pub use crate::config::SimConfig;
    pub use crate::error::PipelineError;
    pub use crate::host::HostBackend;
    pub use crate::layout::{Line, Node};
    pub use crate::lifecycle::Runtime;
    pub use crate::mesh::Assets;
    pub use crate::time::FrameClock;
    pub use crate::Vec3;
}
