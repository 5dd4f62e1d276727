//! Meshes and materials for the two render stages.
//!
//! A mesh only supplies per-vertex local positions and indices; per-instance
//! placement comes from the node and line buffers inside the shaders. Either
//! mesh may be absent, in which case its stage draws zero indices.

/// Indexed triangle mesh in local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Unit octahedron, scaled in the particle shader by the particle size.
    pub fn octahedron() -> Self {
        let positions = vec![
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ];
        let indices = vec![
            0, 2, 4, 2, 1, 4, 1, 3, 4, 3, 0, 4, //
            2, 0, 5, 1, 2, 5, 3, 1, 5, 0, 3, 5,
        ];
        Self::new(positions, indices)
    }

    /// Two-triangle ribbon.
    ///
    /// `x` runs 0..1 along the line, `y` is -1/+1 across it.
    pub fn line_ribbon() -> Self {
        let positions = vec![
            [0.0, -1.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, -1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let indices = vec![0, 1, 2, 1, 3, 2];
        Self::new(positions, indices)
    }
}

/// Which of the two render stages a draw belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Particles,
    Lines,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Particles => "particles",
            Stage::Lines => "lines",
        }
    }
}

/// Externally supplied meshes and material overrides.
///
/// A material is WGSL source with `vs_main`/`fs_main` entry points that
/// honours the stage's binding contract; `None` selects the built-in one.
#[derive(Clone, Debug, Default)]
pub struct Assets {
    pub particle_mesh: Option<Mesh>,
    pub line_mesh: Option<Mesh>,
    pub particle_material: Option<String>,
    pub line_material: Option<String>,
}

impl Assets {
    /// Built-in octahedron particles and ribbon lines.
    pub fn builtin() -> Self {
        Self {
            particle_mesh: Some(Mesh::octahedron()),
            line_mesh: Some(Mesh::line_ribbon()),
            particle_material: None,
            line_material: None,
        }
    }

    pub fn mesh(&self, stage: Stage) -> Option<&Mesh> {
        match stage {
            Stage::Particles => self.particle_mesh.as_ref(),
            Stage::Lines => self.line_mesh.as_ref(),
        }
    }

    pub fn material(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Particles => self.particle_material.as_deref(),
            Stage::Lines => self.line_material.as_deref(),
        }
    }

    /// Indices per instance for `stage`; 0 if the mesh is missing.
    pub fn index_count(&self, stage: Stage) -> u32 {
        match self.mesh(stage) {
            Some(mesh) => mesh.index_count(),
            None => {
                log::warn!("No {} mesh supplied; that stage will draw nothing", stage.label());
                0
            }
        }
    }
}
