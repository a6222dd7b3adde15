use std::path::PathBuf;

/// How per-object model matrices reach the vertex shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectTransforms {
    /// 64-byte push constant written before each draw.
    #[default]
    PushConstants,
    /// One dynamic uniform buffer per swapchain image, indexed by dynamic offset.
    DynamicUniform,
}

/// Contains configuration options for the renderer like frames in flight, vsync, and asset locations
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub max_frames_in_flight: usize,
    /// Upper bound on textures, and on models when `DynamicUniform` is selected.
    pub max_objects: usize,
    pub object_transforms: ObjectTransforms,
    pub vsync: bool,
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub shader_dir: PathBuf,
    pub texture_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            max_objects: 20,
            object_transforms: ObjectTransforms::default(),
            vsync: false,
            validation: cfg!(debug_assertions),
            clear_color: [0.6, 0.65, 0.4, 1.0],
            shader_dir: PathBuf::from("shaders"),
            texture_dir: PathBuf::from("textures"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl RenderConfig {
    pub fn vertex_shader_file(&self) -> PathBuf {
        match self.object_transforms {
            ObjectTransforms::PushConstants => self.shader_dir.join("shader.vert.spv"),
            ObjectTransforms::DynamicUniform => self.shader_dir.join("shader_dynamic.vert.spv"),
        }
    }

    pub fn fragment_shader_file(&self) -> PathBuf {
        self.shader_dir.join("shader.frag.spv")
    }
}
