use color_eyre::eyre::OptionExt;
use color_eyre::{Report, Result};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use std::time::Instant;
use vkscene::renderer::Renderer;
use vkscene::renderer::config::RenderConfig;
use vkscene::renderer::resources::mesh::MeshData;
use vkscene::renderer::resources::texture::TextureData;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const ROTATION_DEG_PER_SEC: f32 = 10.0;

struct SceneObject {
    model: usize,
    offset: Vec3,
}

pub struct App {
    config: RenderConfig,
    model_files: Vec<String>,

    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    objects: Vec<SceneObject>,

    // State
    prev_frame_time: Instant,
    delta_time_secs: f32,
    rotation_deg: f32,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig, model_files: Vec<String>) -> Self {
        Self {
            config,
            model_files,

            window: None,
            renderer: None,
            objects: Vec::new(),

            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
            rotation_deg: 0.0,
            close_requested: false,
            error: None,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        let result = match self.renderer.take() {
            Some(renderer) => renderer.cleanup(),
            None => Ok(()),
        };
        match self.error.take() {
            Some(e) => Err(e),
            None => result,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop.create_window(Window::default_attributes().with_title("vkscene"))?,
        );
        let mut renderer = Renderer::new(window.clone(), self.config.clone())?;
        self.objects = self.load_scene(&mut renderer)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Loads the requested model files side by side, or a built-in quad and
    /// triangle when none were given.
    fn load_scene(&self, renderer: &mut Renderer) -> Result<Vec<SceneObject>> {
        let models = if self.model_files.is_empty() {
            let white = renderer.create_texture_from_pixels(&TextureData::white())?;
            vec![
                renderer.create_mesh_model_from_meshes(&[MeshData::new_quad(white)])?,
                renderer.create_mesh_model_from_meshes(&[MeshData::new_triangle(white)])?,
            ]
        } else {
            self.model_files
                .iter()
                .map(|file| renderer.create_mesh_model(file))
                .collect::<Result<Vec<_>>>()?
        };

        let spacing = 1.5;
        let first = -(models.len() as f32 - 1.0) * spacing / 2.0;
        Ok(models
            .into_iter()
            .enumerate()
            .map(|(i, model)| SceneObject {
                model,
                offset: Vec3::new(first + i as f32 * spacing, 0.0, 0.0),
            })
            .collect())
    }

    fn update(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        self.rotation_deg = (self.rotation_deg + ROTATION_DEG_PER_SEC * self.delta_time_secs) % 360.0;
        let rotation = Mat4::from_rotation_z(self.rotation_deg.to_radians());
        for object in &self.objects {
            renderer.update_model(object.model, Mat4::from_translation(object.offset) * rotation);
        }
    }

    fn redraw(&mut self) -> Result<()> {
        self.update();
        self.renderer
            .as_mut()
            .ok_or_eyre("redraw before the renderer exists")?
            .draw()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: Report) {
        log::error!("{e:?}");
        if self.error.is_none() {
            self.error = Some(e);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
