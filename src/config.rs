//! Static simulation configuration.
//!
//! All values are clamped into their documented ranges when set, so nothing
//! downstream needs to validate sizes. Configurations can also be stored as
//! JSON and loaded by the runner.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::SimParameters;

pub const COUNT_RANGE: RangeInclusive<u32> = 1..=10_000;
pub const LINES_PER_NODE_RANGE: RangeInclusive<u32> = 1..=100;
pub const BOUNDING_SPHERE_RADIUS_RANGE: RangeInclusive<f32> = 1.0..=1000.0;
pub const POSITION_MULTIPLIER_RANGE: RangeInclusive<f32> = 1.0..=100.0;
pub const VELOCITY_MULTIPLIER_RANGE: RangeInclusive<f32> = 1.0..=100.0;
pub const SIMULATION_SPEED_RANGE: RangeInclusive<f32> = 0.1..=5.0;
pub const LINE_MIN_DIST_RANGE: RangeInclusive<f32> = 0.1..=100.0;

/// Configuration of one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of nodes.
    pub count: u32,
    /// Maximum lines each node may start.
    pub lines_per_node: u32,
    /// Radius of the sphere nodes are confined to.
    pub bounding_sphere_radius: f32,
    /// Radius of the sphere initial positions are drawn from.
    pub position_multiplier: f32,
    /// Radius of the sphere initial velocities are drawn from.
    pub velocity_multiplier: f32,
    /// Scale applied to velocity during integration.
    pub simulation_speed: f32,
    /// Connectivity threshold.
    pub line_min_dist: f32,
    /// Spawn seed. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            lines_per_node: 1,
            bounding_sphere_radius: 100.0,
            position_multiplier: 10.0,
            velocity_multiplier: 10.0,
            simulation_speed: 1.0,
            line_min_dist: 1.0,
            seed: None,
        }
    }
}

fn clamp_f32(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node count, clamped to `[1, 10000]`.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.clamp(*COUNT_RANGE.start(), *COUNT_RANGE.end());
        self
    }

    /// Set lines per node, clamped to `[1, 100]`.
    pub fn with_lines_per_node(mut self, lines: u32) -> Self {
        self.lines_per_node = lines.clamp(*LINES_PER_NODE_RANGE.start(), *LINES_PER_NODE_RANGE.end());
        self
    }

    /// Set the bounding sphere radius, clamped to `[1, 1000]`.
    pub fn with_bounding_sphere_radius(mut self, radius: f32) -> Self {
        self.bounding_sphere_radius = clamp_f32(radius, &BOUNDING_SPHERE_RADIUS_RANGE);
        self
    }

    /// Set the initial position scale, clamped to `[1, 100]`.
    pub fn with_position_multiplier(mut self, multiplier: f32) -> Self {
        self.position_multiplier = clamp_f32(multiplier, &POSITION_MULTIPLIER_RANGE);
        self
    }

    /// Set the initial velocity scale, clamped to `[1, 100]`.
    pub fn with_velocity_multiplier(mut self, multiplier: f32) -> Self {
        self.velocity_multiplier = clamp_f32(multiplier, &VELOCITY_MULTIPLIER_RANGE);
        self
    }

    /// Set the simulation speed, clamped to `[0.1, 5.0]`.
    pub fn with_simulation_speed(mut self, speed: f32) -> Self {
        self.simulation_speed = clamp_f32(speed, &SIMULATION_SPEED_RANGE);
        self
    }

    /// Set the connectivity threshold, clamped to `[0.1, 100]`.
    pub fn with_line_min_dist(mut self, dist: f32) -> Self {
        self.line_min_dist = clamp_f32(dist, &LINE_MIN_DIST_RANGE);
        self
    }

    /// Fix the spawn seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Return a copy with every field forced into range.
    ///
    /// Deserialized configs bypass the builder, so the loader runs this.
    pub fn clamped(self) -> Self {
        let seed = self.seed;
        let mut config = SimConfig::new()
            .with_count(self.count)
            .with_lines_per_node(self.lines_per_node)
            .with_bounding_sphere_radius(self.bounding_sphere_radius)
            .with_position_multiplier(self.position_multiplier)
            .with_velocity_multiplier(self.velocity_multiplier)
            .with_simulation_speed(self.simulation_speed)
            .with_line_min_dist(self.line_min_dist);
        config.seed = seed;
        config
    }

    /// Number of line slots (`count * lines_per_node`).
    pub fn line_slot_count(&self) -> u32 {
        self.count * self.lines_per_node
    }

    /// Kernel parameters for a tick of length `delta_time`.
    pub fn parameters(&self, delta_time: f32) -> SimParameters {
        SimParameters {
            lines_per_node: self.lines_per_node as i32,
            node_count: self.count as i32,
            simulation_speed: self.simulation_speed,
            bounding_sphere_radius: self.bounding_sphere_radius,
            delta_time,
            line_min_dist: self.line_min_dist,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps() {
        let config = SimConfig::new()
            .with_count(0)
            .with_lines_per_node(500)
            .with_bounding_sphere_radius(0.0)
            .with_position_multiplier(1000.0)
            .with_velocity_multiplier(-3.0)
            .with_simulation_speed(10.0)
            .with_line_min_dist(1000.0);

        assert_eq!(config.count, 1);
        assert_eq!(config.lines_per_node, 100);
        assert_eq!(config.bounding_sphere_radius, 1.0);
        assert_eq!(config.position_multiplier, 100.0);
        assert_eq!(config.velocity_multiplier, 1.0);
        assert_eq!(config.simulation_speed, 5.0);
        assert_eq!(config.line_min_dist, 100.0);
    }

    #[test]
    fn test_nan_clamps_to_lower_bound() {
        let config = SimConfig::new().with_simulation_speed(f32::NAN);
        assert_eq!(config.simulation_speed, 0.1);
    }

    #[test]
    fn test_parameters_from_config() {
        let config = SimConfig::new().with_count(50).with_lines_per_node(3);
        let params = config.parameters(0.25);
        assert_eq!(params.node_count, 50);
        assert_eq!(params.lines_per_node, 3);
        assert_eq!(params.delta_time, 0.25);
        assert_eq!(config.line_slot_count(), 150);
    }

    #[test]
    fn test_json_is_clamped_and_defaults_fill_in() {
        let config = SimConfig::from_json(r#"{ "count": 20000, "line_min_dist": 0.0 }"#).unwrap();
        assert_eq!(config.count, 10_000);
        assert_eq!(config.line_min_dist, 0.1);
        assert_eq!(config.lines_per_node, 1);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(matches!(SimConfig::from_json("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("siglines-config-{}.json", std::process::id()));
        let config = SimConfig::new().with_count(42).with_seed(7);
        config.save(&path).unwrap();
        let loaded = SimConfig::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
