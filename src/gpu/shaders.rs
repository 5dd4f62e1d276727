//! Built-in WGSL for the kernel and both render stages.
//!
//! Every source is prefixed with [`WGSL_RECORDS`] so the structs match the
//! Rust layouts exactly. Custom materials are prefixed the same way.

use crate::layout::WGSL_RECORDS;
use crate::mesh::Stage;

/// Kernel entry point that moves nodes.
pub const INTEGRATE_ENTRY: &str = "integrate";
/// Kernel entry point that rebuilds line blocks.
pub const CONNECT_ENTRY: &str = "connect";

const KERNEL_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> params: SimParameters;
@group(0) @binding(1) var<storage, read_write> nodes: array<Node>;
@group(0) @binding(2) var<storage, read_write> lines: array<Line>;

@compute @workgroup_size(256)
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= u32(params.node_count) {
        return;
    }

    let node = nodes[idx];
    var pos = node_position(node);
    var vel = node_velocity(node);

    pos += vel * params.simulation_speed * params.delta_time;

    // Reflect at the bounding sphere.
    let radius = params.bounding_sphere_radius;
    let from_center = length(pos);
    if from_center > radius {
        let normal = pos / from_center;
        pos = normal * radius;
        let outward = dot(vel, normal);
        if outward > 0.0 {
            vel -= 2.0 * outward * normal;
        }
    }

    nodes[idx] = Node(pos.x, pos.y, pos.z, vel.x, vel.y, vel.z);
}

@compute @workgroup_size(256)
fn connect(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    let count = u32(params.node_count);
    if idx >= count {
        return;
    }

    let per_node = u32(max(params.lines_per_node, 1));
    let base = idx * per_node;
    for (var s = 0u; s < per_node; s++) {
        lines[base + s] = Line(-1, -1, 0.0);
    }

    let origin = node_position(nodes[idx]);
    var filled = 0u;

    for (var j = 0u; j < count; j++) {
        if j == idx {
            continue;
        }
        let d = distance(origin, node_position(nodes[j]));
        if d > params.line_min_dist {
            continue;
        }
        if filled == per_node && d >= lines[base + per_node - 1u].dist {
            continue;
        }

        // Sorted insert; a full block drops its farthest line.
        var slot = min(filled, per_node - 1u);
        loop {
            if slot == 0u {
                break;
            }
            let prev = lines[base + slot - 1u];
            if prev.dist <= d {
                break;
            }
            lines[base + slot] = prev;
            slot -= 1u;
        }
        lines[base + slot] = Line(i32(idx), i32(j), d);
        filled = min(filled + 1u, per_node);
    }
}
"#;

const CAMERA_STRUCT: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    particle_size: f32,
    line_width: f32,
    _padding: vec2<f32>,
};

@group(1) @binding(0) var<uniform> camera: Camera;
"#;

const PARTICLE_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> nodes: array<Node>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(
    @location(0) local: vec3<f32>,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    let node = nodes[instance_index];
    let world = node_position(node) + local * camera.particle_size;
    let speed = length(node_velocity(node));

    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(world, 1.0);
    out.color = mix(vec3<f32>(0.35, 0.6, 1.0), vec3<f32>(1.0, 0.85, 0.55), clamp(speed / 20.0, 0.0, 1.0));
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

const LINE_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> nodes: array<Node>;
@group(0) @binding(1) var<storage, read> lines: array<Line>;
@group(0) @binding(2) var<storage, read> params: SimParameters;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) alpha: f32,
};

@vertex
fn vs_main(
    @location(0) local: vec3<f32>,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    var out: VertexOutput;

    let seg = lines[instance_index];
    // Empty slot: collapse to a clipped point.
    if seg.start_node < 0 || seg.end_node < 0 {
        out.clip_position = vec4<f32>(0.0, 0.0, -1000.0, 1.0);
        out.alpha = 0.0;
        return out;
    }

    let pos_a = node_position(nodes[u32(seg.start_node)]);
    let pos_b = node_position(nodes[u32(seg.end_node)]);
    let line_dir = normalize(pos_b - pos_a + vec3<f32>(0.0, 0.0, 1e-6));

    var perp = cross(line_dir, vec3<f32>(0.0, 1.0, 0.0));
    if length(perp) < 0.001 {
        perp = cross(line_dir, vec3<f32>(1.0, 0.0, 0.0));
    }
    perp = normalize(perp) * camera.line_width;

    let world = mix(pos_a, pos_b, local.x) + perp * local.y;
    out.clip_position = camera.view_proj * vec4<f32>(world, 1.0);
    out.alpha = clamp(1.0 - seg.dist / max(params.line_min_dist, 0.0001), 0.05, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(0.75, 0.85, 1.0, in.alpha);
}
"#;

/// Complete kernel source with both entry points.
pub fn kernel_shader() -> String {
    format!("{WGSL_RECORDS}{KERNEL_BODY}")
}

/// Complete render source for `stage`, using `material` when given.
///
/// A material body sees the record structs and the `camera` uniform.
pub fn stage_shader(stage: Stage, material: Option<&str>) -> String {
    let body = match (stage, material) {
        (_, Some(custom)) => custom,
        (Stage::Particles, None) => PARTICLE_BODY,
        (Stage::Lines, None) => LINE_BODY,
    };
    format!("{WGSL_RECORDS}{CAMERA_STRUCT}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(code)))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(module)
    }

    fn entry_points(module: &naga::Module) -> Vec<&str> {
        module.entry_points.iter().map(|e| e.name.as_str()).collect()
    }

    fn struct_span(module: &naga::Module, name: &str) -> Option<u32> {
        module.types.iter().find_map(|(_, ty)| match (&ty.name, &ty.inner) {
            (Some(n), naga::TypeInner::Struct { span, .. }) if n == name => Some(*span),
            _ => None,
        })
    }

    #[test]
    fn test_kernel_validates() {
        let module = validate_wgsl(&kernel_shader()).unwrap();
        let entries = entry_points(&module);
        assert!(entries.contains(&INTEGRATE_ENTRY));
        assert!(entries.contains(&CONNECT_ENTRY));
    }

    #[test]
    fn test_kernel_workgroup_size_matches_stepper() {
        let module = validate_wgsl(&kernel_shader()).unwrap();
        for entry in &module.entry_points {
            assert_eq!(entry.workgroup_size, [crate::stepper::WORKGROUP_SIZE, 1, 1]);
        }
    }

    #[test]
    fn test_record_strides_match_rust() {
        let module = validate_wgsl(&kernel_shader()).unwrap();
        assert_eq!(struct_span(&module, "Node"), Some(crate::layout::NODE_STRIDE as u32));
        assert_eq!(struct_span(&module, "Line"), Some(crate::layout::LINE_STRIDE as u32));
        assert_eq!(
            struct_span(&module, "SimParameters"),
            Some(crate::layout::PARAMETERS_STRIDE as u32)
        );
    }

    #[test]
    fn test_particle_shader_validates() {
        let module = validate_wgsl(&stage_shader(Stage::Particles, None)).unwrap();
        assert!(entry_points(&module).contains(&"vs_main"));
        assert!(entry_points(&module).contains(&"fs_main"));
    }

    #[test]
    fn test_line_shader_validates() {
        let module = validate_wgsl(&stage_shader(Stage::Lines, None)).unwrap();
        assert!(entry_points(&module).contains(&"vs_main"));
    }

    #[test]
    fn test_camera_uniform_size() {
        let module = validate_wgsl(&stage_shader(Stage::Particles, None)).unwrap();
        assert_eq!(
            struct_span(&module, "Camera"),
            Some(std::mem::size_of::<super::super::CameraUniform>() as u32)
        );
    }

    #[test]
    fn test_custom_material_is_used() {
        let src = stage_shader(Stage::Lines, Some("// custom line material\n"));
        assert!(src.contains("custom line material"));
        assert!(src.contains("struct Line"));
        assert!(!src.contains("fn vs_main"));
    }
}
