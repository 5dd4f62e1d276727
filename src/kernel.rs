//! The simulation kernel contract and its CPU implementation.
//!
//! A kernel is a pure function of `(SimParameters, Node[])` producing updated
//! nodes and a fully rewritten line array. It runs in two phases: `integrate`
//! moves every node, then `connect` rebuilds every line block from the new
//! positions. Keeping the phases apart means no lane ever reads a node that
//! another lane is still writing.
//!
//! Node `i` owns line slots `[i * L, (i + 1) * L)`. Within its block the lines
//! are sorted by ascending distance (ties by lower end index) and any unused
//! slots hold [`Line::EMPTY`].

use glam::Vec3;
use rayon::prelude::*;

use crate::layout::{Line, Node, SimParameters};

/// A swappable simulation kernel.
pub trait Kernel: Send + Sync {
    /// Advance every node by one tick.
    fn integrate(&self, params: &SimParameters, nodes: &mut [Node]);

    /// Rewrite every line block from the current node positions.
    fn connect(&self, params: &SimParameters, nodes: &[Node], lines: &mut [Line]);

    /// One full tick: integrate, then connect.
    fn step(&self, params: &SimParameters, nodes: &mut [Node], lines: &mut [Line]) {
        self.integrate(params, nodes);
        self.connect(params, nodes, lines);
    }
}

/// Integrate one node with a reflecting boundary at `radius`.
///
/// A node that would leave the sphere is placed on its surface and the
/// outward component of its velocity is flipped.
pub fn integrate_node(node: &mut Node, speed: f32, delta_time: f32, radius: f32) {
    let mut position = node.position();
    let mut velocity = node.velocity();

    position += velocity * speed * delta_time;

    let dist = position.length();
    if dist > radius {
        let normal = position / dist;
        position = normal * radius;
        let outward = velocity.dot(normal);
        if outward > 0.0 {
            velocity -= 2.0 * outward * normal;
        }
    }

    *node = Node::new(position, velocity);
}

/// Fill `block` with node `index`'s nearest neighbours within `max_dist`.
pub fn connect_node(index: usize, nodes: &[Node], max_dist: f32, block: &mut [Line]) {
    block.fill(Line::EMPTY);
    let capacity = block.len();
    if capacity == 0 {
        return;
    }

    let origin: Vec3 = nodes[index].position();
    let mut filled = 0;

    for (other, node) in nodes.iter().enumerate() {
        if other == index {
            continue;
        }
        let dist = origin.distance(node.position());
        if dist > max_dist {
            continue;
        }
        if filled == capacity && dist >= block[capacity - 1].distance {
            continue;
        }

        // Insertion into the sorted block; a full block drops its farthest line.
        let mut slot = filled.min(capacity - 1);
        while slot > 0 && block[slot - 1].distance > dist {
            block[slot] = block[slot - 1];
            slot -= 1;
        }
        block[slot] = Line::connect(index, other, dist);
        filled = (filled + 1).min(capacity);
    }
}

/// Kernel running on the rayon thread pool.
///
/// Produces the same results as the WGSL kernel and lets the pipeline run and
/// be verified without a GPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuKernel;

impl Kernel for CpuKernel {
    fn integrate(&self, params: &SimParameters, nodes: &mut [Node]) {
        let speed = params.simulation_speed;
        let dt = params.delta_time;
        let radius = params.bounding_sphere_radius;
        nodes
            .par_iter_mut()
            .for_each(|node| integrate_node(node, speed, dt, radius));
    }

    fn connect(&self, params: &SimParameters, nodes: &[Node], lines: &mut [Line]) {
        let per_node = params.lines_per_node.max(1) as usize;
        let max_dist = params.line_min_dist;
        lines
            .par_chunks_mut(per_node)
            .enumerate()
            .for_each(|(index, block)| {
                if index < nodes.len() {
                    connect_node(index, nodes, max_dist, block);
                } else {
                    block.fill(Line::EMPTY);
                }
            });
    }
}
