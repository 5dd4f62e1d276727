//! Per-tick parameter refresh and kernel dispatch.

use crate::backend::{Backend, KernelBindings};
use crate::buffers::BufferManager;
use crate::config::SimConfig;
use crate::layout::SimParameters;

/// Invocations per workgroup. Must match `@workgroup_size` in the kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// Workgroups needed to give each of `node_count` nodes one invocation.
pub fn workgroup_count(node_count: u32) -> u32 {
    node_count.div_ceil(WORKGROUP_SIZE)
}

pub struct SimulationStepper {
    config: SimConfig,
    ticks: u64,
    last_parameters: Option<SimParameters>,
}

impl SimulationStepper {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            ticks: 0,
            last_parameters: None,
        }
    }

    /// Switch to `config`. The tick count carries over.
    pub fn reconfigure(&mut self, config: SimConfig) {
        self.config = config;
        self.last_parameters = None;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Parameters uploaded by the most recent tick.
    pub fn last_parameters(&self) -> Option<&SimParameters> {
        self.last_parameters.as_ref()
    }

    /// Parameter record for a tick of `delta_time` seconds.
    ///
    /// Negative or non-finite deltas become 0, which leaves nodes in place.
    pub fn parameters(&self, delta_time: f32) -> SimParameters {
        let delta_time = if delta_time.is_finite() { delta_time.max(0.0) } else { 0.0 };
        self.config.parameters(delta_time)
    }

    /// Refresh and upload the parameters, then dispatch the kernel.
    ///
    /// Returns `false` (and dispatches nothing) if the buffers are not
    /// allocated.
    pub fn tick<B: Backend>(&mut self, backend: &mut B, buffers: &BufferManager<B>, delta_time: f32) -> bool {
        let (Some(parameters), Some(nodes), Some(lines)) =
            (buffers.parameters(), buffers.nodes(), buffers.lines())
        else {
            log::debug!("Skipping dispatch: pipeline buffers are not allocated");
            return false;
        };

        let params = self.parameters(delta_time);
        buffers.write_parameters(backend, &params);

        let workgroups = workgroup_count(buffers.node_count());
        backend.dispatch(KernelBindings { parameters, nodes, lines }, workgroups);

        self.last_parameters = Some(params);
        self.ticks += 1;
        true
    }
}
