use crate::assets::spirv;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::{AssetError, ResourceError};
use ash::vk;

/// SPIR-V words for the vertex and fragment stages of the single graphics pipeline.
#[derive(Debug, Clone)]
pub struct ShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    /// Reads the shader pair matching the configured object-transform strategy.
    pub fn load(config: &RenderConfig) -> Result<Self, AssetError> {
        Ok(Self {
            vertex: spirv::read_spirv(config.vertex_shader_file())?,
            fragment: spirv::read_spirv(config.fragment_shader_file())?,
        })
    }
}

#[derive(Default)]
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
}

impl GraphicsShader {
    pub fn new(dev: &DeviceContext, code: &ShaderCode) -> Result<Self, ResourceError> {
        let vert_mod = dev
            .driver
            .create_shader_module(&code.vertex)
            .map_err(ResourceError::creation("vertex shader module"))?;
        let frag_mod = match dev.driver.create_shader_module(&code.fragment) {
            Ok(module) => module,
            Err(result) => {
                dev.driver.destroy_shader_module(vert_mod);
                return Err(ResourceError::creation("fragment shader module")(result));
            }
        };
        Ok(Self { vert_mod, frag_mod })
    }

    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_shader_module(self.vert_mod);
        dev.driver.destroy_shader_module(self.frag_mod);
    }
}
