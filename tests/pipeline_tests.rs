//! End-to-end tests of the pipeline on the host backend.
//!
//! These drive a [`Runtime`] through start, ticks and shutdown and read the
//! buffers back with a snapshot, the way a GPU run would be inspected.

use std::cell::Cell;
use std::rc::Rc;

use siglines::backend::{Backend, BufferKind, IndirectDraw, KernelBindings, ShadowCasting};
use siglines::buffers::BufferManager;
use siglines::host::{HostBackend, HostBuffer};
use siglines::layout::{DrawIndexedArgs, Line, Node, SimParameters};
use siglines::lifecycle::{Runtime, Snapshot};
use siglines::mesh::{Assets, Mesh, Stage};
use siglines::{PipelineError, SimConfig};

fn started(config: SimConfig) -> Runtime<HostBackend> {
    let mut runtime = Runtime::new(HostBackend::new());
    runtime.start(config, &Assets::builtin()).unwrap();
    runtime
}

fn snapshot(runtime: &mut Runtime<HostBackend>) -> Snapshot {
    runtime.snapshot().unwrap().unwrap()
}

fn run_ticks(runtime: &mut Runtime<HostBackend>, ticks: usize, delta_time: f32) {
    for _ in 0..ticks {
        runtime.tick(delta_time).unwrap();
    }
}

// ============================================================================
// Line buffer shape
// ============================================================================

#[test]
fn test_line_slots_start_empty() {
    for (count, lines_per_node) in [(1, 1), (7, 3), (250, 1), (64, 100)] {
        let mut runtime = started(
            SimConfig::new()
                .with_count(count)
                .with_lines_per_node(lines_per_node)
                .with_seed(1),
        );
        let snap = snapshot(&mut runtime);

        assert_eq!(snap.nodes.len(), count as usize);
        assert_eq!(snap.lines.len(), (count * lines_per_node) as usize);
        assert!(snap.lines.iter().all(|line| *line == Line::EMPTY));
    }
}

#[test]
fn test_lines_match_current_positions() {
    let config = SimConfig::new()
        .with_count(200)
        .with_lines_per_node(4)
        .with_bounding_sphere_radius(50.0)
        .with_line_min_dist(20.0)
        .with_seed(7);
    let max_dist = config.line_min_dist;
    let mut runtime = started(config);
    run_ticks(&mut runtime, 10, 0.05);

    let snap = snapshot(&mut runtime);
    let mut connected = 0;
    for (slot, line) in snap.lines.iter().enumerate() {
        let Some((start, end)) = line.endpoints() else {
            continue;
        };
        connected += 1;
        assert_eq!(start, slot / 4, "line stored outside its node's block");
        assert_ne!(start, end);

        let actual = snap.nodes[start].position().distance(snap.nodes[end].position());
        assert!((line.distance - actual).abs() < 1e-4, "stale distance in slot {}", slot);
        assert!(line.distance <= max_dist);
    }
    assert!(connected > 0, "expected some nodes within range");
}

#[test]
fn test_no_node_exceeds_its_line_budget() {
    let mut runtime = started(
        SimConfig::new()
            .with_count(150)
            .with_lines_per_node(2)
            .with_bounding_sphere_radius(5.0)
            .with_line_min_dist(100.0)
            .with_seed(3),
    );
    run_ticks(&mut runtime, 3, 0.016);

    let snap = snapshot(&mut runtime);
    for index in 0..snap.nodes.len() {
        assert!(snap.lines_from(index).count() <= 2);
    }
}

#[test]
fn test_blocks_are_sorted_and_packed() {
    let mut runtime = started(
        SimConfig::new()
            .with_count(80)
            .with_lines_per_node(5)
            .with_bounding_sphere_radius(30.0)
            .with_line_min_dist(12.0)
            .with_seed(11),
    );
    run_ticks(&mut runtime, 2, 0.016);

    let snap = snapshot(&mut runtime);
    for block in snap.lines.chunks(5) {
        let filled = block.iter().take_while(|line| !line.is_empty()).count();
        assert!(block[filled..].iter().all(Line::is_empty), "gap inside a block");
        assert!(block[..filled].windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

// ============================================================================
// Buffer ownership
// ============================================================================

#[test]
fn test_release_then_allocate_leaves_one_of_each() {
    let mut host = HostBackend::new();
    let mut buffers = BufferManager::new();
    let nodes = vec![Node::default(); 10];
    let lines = vec![Line::EMPTY; 20];

    for _ in 0..3 {
        buffers.release(&mut host);
        buffers
            .allocate(&mut host, &nodes, &lines, &SimParameters::default())
            .unwrap();
        buffers.allocate_indirect_args(&mut host, 24, 10, 6, 20).unwrap();
    }

    for kind in BufferKind::ALL {
        assert_eq!(host.live_buffers_of(kind), 1, "{}", kind.label());
    }
    assert_eq!(host.live_buffers(), 5);
}

#[test]
fn test_release_is_safe_any_time() {
    let mut host = HostBackend::new();
    let mut buffers: BufferManager<HostBackend> = BufferManager::new();
    buffers.release(&mut host);
    buffers.release(&mut host);
    assert_eq!(host.live_buffers(), 0);

    let mut runtime = started(SimConfig::new().with_count(5).with_seed(2));
    runtime.shutdown();
    runtime.shutdown();
    assert_eq!(runtime.backend().live_buffers(), 0);
}

/// Host backend that reports every destroyed buffer to a shared counter, so
/// releases can be observed after the runtime is gone.
struct CountingBackend {
    inner: HostBackend,
    destroyed: Rc<Cell<usize>>,
}

impl Backend for CountingBackend {
    type Buffer = HostBuffer;

    fn prepare_stages(&mut self, assets: &Assets) -> Result<(), PipelineError> {
        self.inner.prepare_stages(assets)
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<HostBuffer, PipelineError> {
        self.inner.create_buffer(kind, contents)
    }

    fn write_buffer(&mut self, buffer: &HostBuffer, data: &[u8]) {
        self.inner.write_buffer(buffer, data);
    }

    fn destroy_buffer(&mut self, buffer: HostBuffer) {
        self.destroyed.set(self.destroyed.get() + 1);
        self.inner.destroy_buffer(buffer);
    }

    fn dispatch(&mut self, bindings: KernelBindings<'_, HostBuffer>, workgroups: u32) {
        self.inner.dispatch(bindings, workgroups);
    }

    fn draw_indexed_indirect(&mut self, draw: IndirectDraw<'_, HostBuffer>) {
        self.inner.draw_indexed_indirect(draw);
    }

    fn submit(&mut self) -> Result<(), PipelineError> {
        self.inner.submit()
    }
}

#[test]
fn test_dropping_runtime_releases_buffers() {
    let destroyed = Rc::new(Cell::new(0));
    let mut runtime = Runtime::new(CountingBackend {
        inner: HostBackend::new(),
        destroyed: Rc::clone(&destroyed),
    });
    runtime
        .start(SimConfig::new().with_count(5).with_seed(2), &Assets::builtin())
        .unwrap();
    runtime.tick(0.016).unwrap();
    assert_eq!(destroyed.get(), 0);

    drop(runtime);
    assert_eq!(destroyed.get(), 5);
}

#[test]
fn test_drop_after_shutdown_releases_nothing_more() {
    let destroyed = Rc::new(Cell::new(0));
    let mut runtime = Runtime::new(CountingBackend {
        inner: HostBackend::new(),
        destroyed: Rc::clone(&destroyed),
    });
    runtime
        .start(SimConfig::new().with_count(5).with_seed(2), &Assets::builtin())
        .unwrap();
    runtime.shutdown();
    assert_eq!(destroyed.get(), 5);

    drop(runtime);
    assert_eq!(destroyed.get(), 5);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_four_nodes_connect_to_nearest() {
    let config = SimConfig::new()
        .with_count(4)
        .with_lines_per_node(1)
        .with_line_min_dist(1000.0)
        .with_bounding_sphere_radius(1.0)
        .with_seed(42);
    assert_eq!(config.line_min_dist, 100.0);

    let mut runtime = started(config);
    runtime.tick(0.016).unwrap();
    let snap = snapshot(&mut runtime);

    assert_eq!(snap.particle_args.instance_count, 4);
    assert_eq!(snap.line_args.instance_count, 4);
    assert_eq!(snap.lines.len(), 4);

    for (index, line) in snap.lines.iter().enumerate() {
        let (start, end) = line.endpoints().expect("every node is in range of every other");
        assert_eq!(start, index);

        let origin = snap.nodes[index].position();
        let nearest = (0..4)
            .filter(|&other| other != index)
            .map(|other| origin.distance(snap.nodes[other].position()))
            .fold(f32::INFINITY, f32::min);
        let to_end = origin.distance(snap.nodes[end].position());
        assert!((to_end - nearest).abs() < 1e-6, "node {} is not linked to its nearest", index);
    }
}

#[test]
fn test_nodes_stay_inside_sphere() {
    let radius = 10.0;
    let mut runtime = started(
        SimConfig::new()
            .with_count(300)
            .with_bounding_sphere_radius(radius)
            .with_position_multiplier(100.0)
            .with_velocity_multiplier(100.0)
            .with_simulation_speed(5.0)
            .with_seed(9),
    );

    for _ in 0..20 {
        runtime.tick(0.1).unwrap();
        let snap = snapshot(&mut runtime);
        for node in &snap.nodes {
            assert!(node.position().length() <= radius * (1.0 + 1e-5));
        }
    }
}

#[test]
fn test_same_seed_same_run() {
    let config = SimConfig::new().with_count(60).with_lines_per_node(3).with_line_min_dist(30.0).with_seed(5);
    let mut a = started(config.clone());
    let mut b = started(config);
    run_ticks(&mut a, 5, 0.02);
    run_ticks(&mut b, 5, 0.02);
    assert_eq!(snapshot(&mut a), snapshot(&mut b));
}

#[test]
fn test_zero_delta_leaves_nodes_in_place() {
    let mut runtime = started(SimConfig::new().with_count(30).with_seed(4));
    let before = snapshot(&mut runtime).nodes;
    runtime.tick(0.0).unwrap();
    assert_eq!(snapshot(&mut runtime).nodes, before);
}

// ============================================================================
// Draws
// ============================================================================

#[test]
fn test_frame_issues_two_indirect_draws() {
    let mut runtime = started(SimConfig::new().with_count(12).with_lines_per_node(3).with_seed(8));
    runtime.tick(0.016).unwrap();

    let frame = runtime.backend().last_frame();
    assert_eq!(frame.len(), 2);

    let particles = &frame[0];
    assert_eq!(particles.stage, Stage::Particles);
    assert_eq!(particles.bound, vec![BufferKind::Nodes]);
    assert_eq!(particles.args, DrawIndexedArgs::new(Mesh::octahedron().index_count(), 12));
    assert_eq!(particles.mesh_index_count, particles.args.index_count);
    assert_eq!(particles.shadows, ShadowCasting::Off);

    let lines = &frame[1];
    assert_eq!(lines.stage, Stage::Lines);
    assert_eq!(
        lines.bound,
        vec![BufferKind::Nodes, BufferKind::Lines, BufferKind::Parameters]
    );
    assert_eq!(lines.args, DrawIndexedArgs::new(Mesh::line_ribbon().index_count(), 36));
    assert_eq!(lines.shadows, ShadowCasting::Off);
}

#[test]
fn test_draw_bounds_follow_radius() {
    let mut small = started(SimConfig::new().with_count(2).with_bounding_sphere_radius(50.0).with_seed(1));
    small.tick(0.016).unwrap();
    assert_eq!(small.backend().last_frame()[0].bounds.side(), 200.0);

    let mut large = started(SimConfig::new().with_count(2).with_bounding_sphere_radius(600.0).with_seed(1));
    large.tick(0.016).unwrap();
    let bounds = large.backend().last_frame()[1].bounds;
    assert_eq!(bounds.side(), 1200.0);
    assert!(bounds.contains_sphere(600.0));
}

#[test]
fn test_missing_mesh_draws_nothing() {
    let assets = Assets {
        line_mesh: None,
        ..Assets::builtin()
    };
    let mut runtime = Runtime::new(HostBackend::new());
    runtime
        .start(SimConfig::new().with_count(6).with_lines_per_node(2).with_seed(3), &assets)
        .unwrap();
    runtime.tick(0.016).unwrap();

    let frame = runtime.backend().last_frame();
    assert_eq!(frame[1].args.index_count, 0);
    assert_eq!(frame[1].args.instance_count, 12);
    assert_eq!(frame[1].mesh_index_count, 0);
    assert!(frame[0].args.index_count > 0);
}

#[test]
fn test_no_draws_after_shutdown() {
    let mut runtime = started(SimConfig::new().with_count(3).with_seed(1));
    runtime.tick(0.016).unwrap();
    runtime.shutdown();
    runtime.tick(0.016).unwrap();
    assert!(runtime.backend().last_frame().is_empty());
    assert_eq!(runtime.backend().dispatch_count(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_second_start_is_rejected() {
    let mut runtime = started(SimConfig::new().with_count(10).with_lines_per_node(2).with_seed(6));
    runtime.tick(0.016).unwrap();
    let before = snapshot(&mut runtime);

    let second = runtime.start(SimConfig::new().with_count(99).with_seed(1), &Assets::builtin());
    assert!(matches!(second, Err(PipelineError::AlreadyRunning)));

    assert!(runtime.is_running());
    assert_eq!(runtime.backend().live_buffers(), 5);
    assert_eq!(runtime.pipeline().unwrap().config().count, 10);
    assert_eq!(snapshot(&mut runtime), before);
}

#[test]
fn test_restart_after_shutdown() {
    let mut runtime = started(SimConfig::new().with_count(10).with_seed(6));
    runtime.shutdown();
    runtime
        .start(SimConfig::new().with_count(20).with_seed(6), &Assets::builtin())
        .unwrap();
    assert_eq!(snapshot(&mut runtime).nodes.len(), 20);
    assert_eq!(runtime.backend().live_buffers(), 5);
}

#[test]
fn test_failed_allocation_leaves_nothing_behind() {
    for failing in BufferKind::ALL {
        let mut host = HostBackend::new();
        host.fail_allocations_of(Some(failing));
        let mut runtime = Runtime::new(host);

        let result = runtime.start(SimConfig::new().with_count(4).with_seed(1), &Assets::builtin());
        match result {
            Err(PipelineError::Allocation { kind, .. }) => assert_eq!(kind, failing),
            other => panic!("expected allocation failure, got {:?}", other.map(|_| ())),
        }
        assert!(!runtime.is_running());
        assert_eq!(runtime.backend().live_buffers(), 0);
    }
}

#[test]
fn test_dispatch_counts_ticks() {
    let mut runtime = started(SimConfig::new().with_count(3).with_seed(1));
    run_ticks(&mut runtime, 7, 0.016);
    assert_eq!(runtime.backend().dispatch_count(), 7);
    assert_eq!(runtime.pipeline().unwrap().stepper().ticks(), 7);

    let params = runtime.pipeline().unwrap().stepper().last_parameters().copied().unwrap();
    assert_eq!(params.node_count, 3);
    assert_eq!(params.delta_time, 0.016);
}

#[test]
fn test_backend_is_generic() {
    fn live<B: Backend>(runtime: &Runtime<B>) -> usize {
        runtime.pipeline().map(|p| p.buffers().live().total()).unwrap_or(0)
    }
    let runtime = started(SimConfig::new().with_count(2).with_seed(1));
    assert_eq!(live(&runtime), 5);
}
