pub mod camera;
pub mod config;
pub mod contexts;
pub mod error;
pub mod resources;
pub mod shader_data;

mod internals;


use crate::assets;
use crate::renderer::camera::Camera;
use crate::renderer::config::{ObjectTransforms, RenderConfig};
use crate::renderer::contexts::command_ctx::{CommandContext, PassInfo};
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::device_ctx::driver::Driver;
use crate::renderer::contexts::device_ctx::queue::Queues;
use crate::renderer::contexts::device_ctx::target::{self, RenderTarget};
use crate::renderer::contexts::frame_ctx::FrameContext;
use crate::renderer::contexts::pipeline_ctx::PipelineContext;
use crate::renderer::contexts::resource_ctx::descriptor_ctx::DescriptorContext;
use crate::renderer::contexts::resource_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::{ResourceError, SwapchainError};
use crate::renderer::resources::mesh::MeshData;
use crate::renderer::resources::model::MeshModel;
use crate::renderer::resources::shader::ShaderCode;
use crate::renderer::resources::texture::{Texture, TextureData};
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use glam::Mat4;
use std::path::Path;
use std::sync::Arc;
use winit::window::Window;

const CLEANED_UP: &str = "renderer has already been cleaned up";

/// Every GPU object the renderer owns, next to the device that created them.
#[derive(Default)]
struct RenderState {
    transfer: TransferContext,
    target: RenderTarget,
    pipeline: PipelineContext,
    descriptors: DescriptorContext,
    commands: CommandContext,
    frames: FrameContext,

    textures: Vec<Texture>,
    models: Vec<MeshModel>,
    // Created on demand for model meshes without a diffuse map
    default_texture: Option<usize>,
    depth_format: vk::Format,
}

impl RenderState {
    fn init(
        &mut self,
        dev: &DeviceContext,
        shaders: &ShaderCode,
        config: &RenderConfig,
    ) -> Result<()> {
        self.transfer = TransferContext::new(dev)?;
        self.depth_format = target::choose_depth_format(dev)?;
        self.target = RenderTarget::new(dev, config.vsync, self.depth_format)?;

        let image_count = self.target.image_count();
        self.descriptors = DescriptorContext::new(dev, config, image_count)?;
        self.pipeline = PipelineContext::new(
            dev,
            shaders,
            [self.descriptors.uniform_layout, self.descriptors.sampler_layout],
            config.object_transforms,
        )?;
        self.pipeline.build(dev, &self.target)?;
        self.target.create_framebuffers(dev, self.pipeline.render_pass)?;

        self.commands = CommandContext::new(dev, image_count)?;
        self.frames = FrameContext::new(dev, config.max_frames_in_flight)?;
        self.frames.track_images(image_count);
        Ok(())
    }

    /// Rebuilds the swapchain and everything sized or formatted after it.
    fn rebuild(&mut self, dev: &DeviceContext, config: &RenderConfig) -> Result<()> {
        dev.wait_idle()?;

        self.target.destroy_framebuffers(dev);
        self.pipeline.destroy_pass_and_pipeline(dev);
        std::mem::take(&mut self.target).destroy(dev);

        self.target = RenderTarget::new(dev, config.vsync, self.depth_format)?;
        self.pipeline.build(dev, &self.target)?;
        self.target.create_framebuffers(dev, self.pipeline.render_pass)?;

        let image_count = self.target.image_count();
        self.descriptors.recreate_per_image(dev, image_count)?;
        self.commands.recreate(dev, image_count)?;
        self.frames.track_images(image_count);

        let extent = self.target.extent();
        log::info!(
            "Rebuilt swapchain: {} images, {}x{}",
            image_count,
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Renders and presents one frame. Returns whether the swapchain has to be
    /// rebuilt before the next one.
    fn draw_frame(
        &mut self,
        dev: &DeviceContext,
        camera: &Camera,
        config: &RenderConfig,
    ) -> Result<bool> {
        let frame_index = self.frames.current_index();
        self.frames.current().wait(dev)?;

        let swapchain = self.target.swapchain.swapchain;
        let image_available = self.frames.current().image_available;
        let (image_index, acquire_suboptimal) =
            match dev.driver.acquire_next_image(swapchain, image_available) {
                Ok(acquired) => acquired,
                // The fence stays signaled, so the next draw on this slot does not block
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    log::debug!("Swapchain out of date on acquire");
                    return Ok(true);
                }
                Err(result) => {
                    return Err(SwapchainError::vk("vkAcquireNextImageKHR")(result).into());
                }
            };
        let image_index = image_index as usize;

        self.frames.claim_image(dev, image_index)?;
        self.frames.current().reset(dev)?;

        let view_projection = camera.view_projection(self.target.aspect_ratio());
        self.descriptors
            .update_uniforms(dev, image_index, &view_projection)?;
        if self.descriptors.transforms() == ObjectTransforms::DynamicUniform {
            let transforms = self.models.iter().map(|m| m.transform).collect::<Vec<_>>();
            self.descriptors
                .update_model_transforms(dev, image_index, &transforms)?;
        }

        let pass = PassInfo {
            render_pass: self.pipeline.render_pass,
            framebuffer: self.target.framebuffers[image_index],
            extent: self.target.extent(),
            clear_color: config.clear_color,
            pipeline: self.pipeline.pipeline,
            layout: self.pipeline.layout,
            uniform_set: self.descriptors.uniform_set(image_index),
            transforms: self.descriptors.transforms(),
            model_stride: self.descriptors.model_stride(),
            textures: &self.textures,
            models: &self.models,
        };
        self.commands.record(dev, image_index, &pass)?;

        let frame = self.frames.current();
        self.commands.submit(dev, image_index, frame)?;
        let presented = self.commands.present(dev, swapchain, image_index, frame);
        log::trace!("Frame slot {frame_index} presented image {image_index}");

        self.frames.advance();

        match presented {
            Ok(present_suboptimal) => Ok(acquire_suboptimal || present_suboptimal),
            Err(SwapchainError::OutOfDate) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn texture_for_mesh(&mut self, dev: &DeviceContext, texture: Option<usize>) -> Result<usize> {
        if let Some(texture) = texture {
            return Ok(texture);
        }
        if let Some(default) = self.default_texture {
            return Ok(default);
        }
        let default = self.add_texture(dev, &TextureData::white())?;
        self.default_texture = Some(default);
        Ok(default)
    }

    fn add_texture(&mut self, dev: &DeviceContext, data: &TextureData) -> Result<usize> {
        let texture = Texture::new(dev, &self.transfer, &mut self.descriptors, data)?;
        self.textures.push(texture);
        Ok(self.textures.len() - 1)
    }

    /// Waits for the device, then releases everything in reverse creation order.
    fn destroy(self, dev: &DeviceContext) -> Result<()> {
        let idle = dev.wait_idle();
        if let Err(e) = &idle {
            log::error!("Tearing down without an idle device: {e}");
        }

        self.frames.destroy(dev);
        self.commands.destroy(dev);
        for model in self.models {
            model.destroy(dev);
        }
        for texture in self.textures {
            texture.destroy(dev);
        }
        self.descriptors.destroy(dev);
        self.pipeline.destroy(dev);
        self.target.destroy(dev);
        self.transfer.destroy(dev);

        idle.map_err(Into::into)
    }
}

/// Draws textured mesh models to a window surface.
///
/// GPU objects are released by `cleanup`, or on drop if it was never called.
pub struct Renderer {
    config: RenderConfig,
    camera: Camera,
    resize_requested: bool,

    state: Option<RenderState>,
    // Dropped last: the device outlives every object created from it
    dev: DeviceContext,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: RenderConfig) -> Result<Self> {
        validate_config(&config)?;
        let shaders = ShaderCode::load(&config)?;
        let dev = DeviceContext::new(window, config.validation)?;
        Self::from_device(dev, &shaders, config)
    }

    /// Renderer over an already created driver, for headless use and tests.
    pub fn with_driver(
        driver: Box<dyn Driver>,
        queues: Queues,
        shaders: &ShaderCode,
        config: RenderConfig,
    ) -> Result<Self> {
        validate_config(&config)?;
        let dev = DeviceContext::from_driver(driver, queues);
        Self::from_device(dev, shaders, config)
    }

    fn from_device(dev: DeviceContext, shaders: &ShaderCode, config: RenderConfig) -> Result<Self> {
        let mut state = RenderState::default();
        if let Err(e) = state.init(&dev, shaders, &config) {
            // Null handles of the parts never created are skipped
            let _ = state.destroy(&dev);
            return Err(e);
        }
        log::info!(
            "Renderer initialized ({} frames in flight, {:?})",
            config.max_frames_in_flight,
            config.object_transforms
        );

        Ok(Self {
            config,
            camera: Camera::new(),
            resize_requested: false,
            state: Some(state),
            dev,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn model_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.models.len())
    }

    pub fn texture_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.textures.len())
    }

    /// Loads a model file from the model directory. Materials with a diffuse
    /// map get their texture loaded from the texture directory; other meshes
    /// sample a plain white texture.
    pub fn create_mesh_model(&mut self, file: impl AsRef<Path>) -> Result<usize> {
        let path = self.config.model_dir.join(file);
        let scene = assets::obj::load_obj(&path)?;

        let mut material_textures = Vec::with_capacity(scene.diffuse_maps.len());
        for map in &scene.diffuse_maps {
            let texture = match map {
                Some(name) => Some(self.create_texture(name)?),
                None => None,
            };
            material_textures.push(texture);
        }

        let mut meshes = Vec::with_capacity(scene.meshes.len());
        for mesh in scene.meshes {
            let material_texture = mesh.material.and_then(|m| material_textures.get(m).copied().flatten());
            let state = self.state.as_mut().ok_or_eyre(CLEANED_UP)?;
            let texture = state.texture_for_mesh(&self.dev, material_texture)?;
            meshes.push(MeshData {
                vertices: mesh.vertices,
                indices: mesh.indices,
                texture,
            });
        }

        let id = self.create_mesh_model_from_meshes(&meshes)?;
        log::info!("Loaded model {} as {id}", path.display());
        Ok(id)
    }

    /// Uploads `meshes` as one model and returns its id.
    pub fn create_mesh_model_from_meshes(&mut self, meshes: &[MeshData]) -> Result<usize> {
        let max_objects = self.config.max_objects;
        let dynamic = self.config.object_transforms == ObjectTransforms::DynamicUniform;
        let state = self.state.as_mut().ok_or_eyre(CLEANED_UP)?;

        if dynamic && state.models.len() >= max_objects {
            return Err(ResourceError::ObjectLimitReached(max_objects).into());
        }
        if let Some(mesh) = meshes.iter().find(|m| m.texture >= state.textures.len()) {
            return Err(ResourceError::UnknownTexture(mesh.texture).into());
        }

        let model = MeshModel::new(&self.dev, &state.transfer, meshes)?;
        state.models.push(model);
        Ok(state.models.len() - 1)
    }

    /// Loads an image file from the texture directory and returns its texture index.
    pub fn create_texture(&mut self, file: impl AsRef<Path>) -> Result<usize> {
        let path = self.config.texture_dir.join(file);
        let data = assets::image::load_rgba(&path)?;
        let id = self.create_texture_from_pixels(&data)?;
        log::info!("Loaded texture {} as {id}", path.display());
        Ok(id)
    }

    /// Indices are handed out in creation order and stay valid for the renderer's lifetime.
    pub fn create_texture_from_pixels(&mut self, data: &TextureData) -> Result<usize> {
        let state = self.state.as_mut().ok_or_eyre(CLEANED_UP)?;
        state.add_texture(&self.dev, data)
    }

    /// Sets the transform of model `model_id`; unknown ids are ignored.
    pub fn update_model(&mut self, model_id: usize, transform: Mat4) {
        let Some(model) = self
            .state
            .as_mut()
            .and_then(|state| state.models.get_mut(model_id))
        else {
            log::warn!("update_model: no model with id {model_id}");
            return;
        };
        model.transform = transform;
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Renders one frame, rebuilding the swapchain afterwards when it went stale.
    ///
    /// An error leaves the current frame slot unsignaled, so the renderer must
    /// not be drawn with again; `cleanup` is still safe.
    pub fn draw(&mut self) -> Result<()> {
        if is_minimized(self.dev.driver.window_extent()) {
            // Minimized: nothing to present until the window has an area again
            self.resize_requested = true;
            return Ok(());
        }

        let state = self.state.as_mut().ok_or_eyre(CLEANED_UP)?;
        let stale = state.draw_frame(&self.dev, &self.camera, &self.config)?;

        if stale || self.resize_requested {
            if is_minimized(self.dev.driver.window_extent()) {
                self.resize_requested = true;
                return Ok(());
            }
            state.rebuild(&self.dev, &self.config)?;
            self.resize_requested = false;
        }
        Ok(())
    }

    /// Waits for the device to go idle and destroys every GPU object.
    pub fn cleanup(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        match self.state.take() {
            Some(state) => {
                log::info!("Cleaning up renderer");
                state.destroy(&self.dev)
            }
            None => Ok(()),
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("Renderer teardown failed: {e}");
        }
    }
}

fn is_minimized(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

fn validate_config(config: &RenderConfig) -> Result<()> {
    if config.max_frames_in_flight == 0 {
        return Err(eyre!("max_frames_in_flight must be at least 1"));
    }
    if config.max_objects == 0 {
        return Err(eyre!("max_objects must be at least 1"));
    }
    Ok(())
}
