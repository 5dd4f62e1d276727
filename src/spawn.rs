//! Initial node and line state.
//!
//! Nodes start with a random position inside a sphere of radius
//! `position_multiplier` and a random velocity inside a sphere of radius
//! `velocity_multiplier`. Positions are additionally kept inside the bounding
//! sphere so the kernel never starts from an out-of-bounds node.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;
use crate::layout::{Line, Node};

/// Seeded random source for node initialization.
pub struct SpawnContext {
    rng: SmallRng,
}

impl SpawnContext {
    /// Context with a fixed seed; the same seed yields the same nodes.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Context seeded from the wall clock, different each program execution.
    pub fn from_clock() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42);
        Self::seeded(seed)
    }

    pub fn for_config(config: &SimConfig) -> Self {
        match config.seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_clock(),
        }
    }

    /// Random point inside a sphere of given radius, centered at origin.
    ///
    /// Distribution is uniform throughout the volume.
    pub fn random_in_sphere(&mut self, radius: f32) -> Vec3 {
        let theta = self.rng.gen_range(0.0..TAU);
        let cos_phi: f32 = self.rng.gen_range(-1.0..=1.0);
        let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
        // Cube root for uniform volume distribution
        let r = radius * self.rng.gen::<f32>().cbrt();

        Vec3::new(
            r * sin_phi * theta.cos(),
            r * sin_phi * theta.sin(),
            r * cos_phi,
        )
    }

    /// One node with randomized state, confined to `bound`.
    pub fn node(&mut self, position_scale: f32, velocity_scale: f32, bound: f32) -> Node {
        let position = self.random_in_sphere(position_scale.min(bound));
        let velocity = self.random_in_sphere(velocity_scale);
        Node::new(position, velocity)
    }
}

/// Build the initial node array for `config`.
pub fn spawn_nodes(config: &SimConfig) -> Vec<Node> {
    let mut ctx = SpawnContext::for_config(config);
    (0..config.count)
        .map(|_| {
            ctx.node(
                config.position_multiplier,
                config.velocity_multiplier,
                config.bounding_sphere_radius,
            )
        })
        .collect()
}

/// `slots` empty line records.
pub fn empty_lines(slots: usize) -> Vec<Line> {
    vec![Line::EMPTY; slots]
}
