//! Record layouts shared by the host, the compute kernel and the render stages.
//!
//! Every record here is `#[repr(C)]` and `Pod`, so a `&[Node]` can be handed to
//! the device with `bytemuck::cast_slice` and read back byte-for-byte. The WGSL
//! side declares the same structs using scalar fields only; a `vec3<f32>` member
//! would pull the stride up to 32 bytes and break the contract.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Byte stride of [`Node`].
pub const NODE_STRIDE: usize = 24;
/// Byte stride of [`Line`].
pub const LINE_STRIDE: usize = 12;
/// Byte stride of [`SimParameters`].
pub const PARAMETERS_STRIDE: usize = 24;
/// Number of 32-bit words in an indexed indirect-draw record.
pub const DRAW_ARGS_WORDS: usize = 5;

/// Index value marking an unused line slot.
pub const EMPTY_INDEX: i32 = -1;

const _: () = assert!(std::mem::size_of::<Node>() == NODE_STRIDE);
const _: () = assert!(std::mem::size_of::<Line>() == LINE_STRIDE);
const _: () = assert!(std::mem::size_of::<SimParameters>() == PARAMETERS_STRIDE);
const _: () = assert!(std::mem::size_of::<DrawIndexedArgs>() == DRAW_ARGS_WORDS * 4);

/// One simulated particle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Node {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
}

impl Node {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

/// A connection between two nodes, or the empty sentinel.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Line {
    pub start_node_index: i32,
    pub end_node_index: i32,
    pub distance: f32,
}

impl Line {
    /// The empty sentinel `(-1, -1, 0)`.
    pub const EMPTY: Line = Line {
        start_node_index: EMPTY_INDEX,
        end_node_index: EMPTY_INDEX,
        distance: 0.0,
    };

    pub fn connect(start: usize, end: usize, distance: f32) -> Self {
        Self {
            start_node_index: start as i32,
            end_node_index: end as i32,
            distance,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start_node_index < 0 || self.end_node_index < 0
    }

    /// `(start, end)` as node indices, `None` for the sentinel.
    pub fn endpoints(&self) -> Option<(usize, usize)> {
        if self.is_empty() {
            None
        } else {
            Some((self.start_node_index as usize, self.end_node_index as usize))
        }
    }
}

impl Default for Line {
    fn default() -> Self {
        Line::EMPTY
    }
}

/// Per-tick kernel inputs. Rebuilt by the stepper every frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimParameters {
    pub lines_per_node: i32,
    pub node_count: i32,
    pub simulation_speed: f32,
    pub bounding_sphere_radius: f32,
    pub delta_time: f32,
    pub line_min_dist: f32,
}

impl SimParameters {
    /// Line slot count derived from these parameters.
    pub fn line_slot_count(&self) -> usize {
        self.node_count.max(0) as usize * self.lines_per_node.max(0) as usize
    }
}

/// Indexed indirect-draw arguments.
///
/// Matches `wgpu::util::DrawIndexedIndirectArgs` word for word.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawIndexedArgs {
    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// WGSL declarations of the shared records. Prepended to every shader.
pub const WGSL_RECORDS: &str = r#"
struct Node {
    px: f32,
    py: f32,
    pz: f32,
    vx: f32,
    vy: f32,
    vz: f32,
};

struct Line {
    start_node: i32,
    end_node: i32,
    dist: f32,
};

struct SimParameters {
    lines_per_node: i32,
    node_count: i32,
    simulation_speed: f32,
    bounding_sphere_radius: f32,
    delta_time: f32,
    line_min_dist: f32,
};

fn node_position(node: Node) -> vec3<f32> {
    return vec3<f32>(node.px, node.py, node.pz);
}

fn node_velocity(node: Node) -> vec3<f32> {
    return vec3<f32>(node.vx, node.vy, node.vz);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_field_offsets() {
        let node = Node::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        let words: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&node));
        assert_eq!(words, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_line_sentinel_bytes() {
        let bytes = bytemuck::bytes_of(&Line::EMPTY);
        assert_eq!(&bytes[0..4], &(-1i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &(-1i32).to_le_bytes());
        assert_eq!(&bytes[8..12], &0.0f32.to_le_bytes());
        assert!(Line::EMPTY.is_empty());
        assert_eq!(Line::EMPTY.endpoints(), None);
    }

    #[test]
    fn test_line_connect() {
        let line = Line::connect(3, 7, 0.5);
        assert!(!line.is_empty());
        assert_eq!(line.endpoints(), Some((3, 7)));
    }

    #[test]
    fn test_parameters_word_order() {
        let params = SimParameters {
            lines_per_node: 2,
            node_count: 10,
            simulation_speed: 1.5,
            bounding_sphere_radius: 100.0,
            delta_time: 0.016,
            line_min_dist: 3.0,
        };
        let bytes = bytemuck::bytes_of(&params);
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &10i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &3.0f32.to_le_bytes());
        assert_eq!(params.line_slot_count(), 20);
    }

    #[test]
    fn test_draw_args_match_wgpu_layout() {
        let args = DrawIndexedArgs::new(24, 1000);
        let ours: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&args));
        let theirs = wgpu::util::DrawIndexedIndirectArgs {
            index_count: 24,
            instance_count: 1000,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        };
        assert_eq!(bytemuck::cast_slice::<u8, u32>(theirs.as_bytes()), ours);
    }
}
