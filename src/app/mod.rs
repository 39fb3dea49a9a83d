mod input;
pub mod loader;
mod timing;
pub mod viewer;

use crate::assets::{self, remote, sniff, AssetManager, BlobRegistry, LoadFailure};
use crate::config::ViewerConfig;
use crate::render::{CameraController, RenderContext, UiInput};
use crate::scene::{serialization, SettingsChange};
use crate::ui::{self, PanelActions, PanelView};
use input::InputState;
use loader::Loader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timing::FrameTiming;
use viewer::Viewer;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

pub struct App {
    config: ViewerConfig,
    initial_file: Option<PathBuf>,
    window: Option<Arc<Window>>,
    render: Option<RenderContext>,
    egui: Option<UiInput>,
    loader: Loader,
    viewer: Viewer,
    input: InputState,
    camera: CameraController,
    timing: FrameTiming,
    hovering_file: bool,
    ui_wants_pointer: bool,
    ui_wants_keyboard: bool,
    target_frame_duration: Duration,
    next_frame_time: Instant,
}

impl App {
    fn new(config: ViewerConfig, initial_file: Option<PathBuf>) -> Self {
        let assets = AssetManager::new(BlobRegistry::new(), config.video.clone());
        let viewer = Viewer::new(config.initial_settings, config.stage);
        let camera =
            CameraController::looking_at(config.camera.position, [0.0; 3], config.camera.fov_deg);
        Self {
            initial_file,
            window: None,
            render: None,
            egui: None,
            loader: Loader::new(assets),
            viewer,
            input: InputState::default(),
            camera,
            timing: FrameTiming::new(Instant::now()),
            hovering_file: false,
            ui_wants_pointer: false,
            ui_wants_keyboard: false,
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
            config,
        }
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        let mut target = Duration::from_millis(16);
        if let Some(monitor) = window.current_monitor() {
            if let Some(millihz) = monitor.refresh_rate_millihertz() {
                let hz = millihz as f32 / 1000.0;
                if hz > 1.0 {
                    target = Duration::from_secs_f32(1.0 / hz);
                }
            }
        }
        self.target_frame_duration = target;
        self.next_frame_time = Instant::now() + self.target_frame_duration;
    }

    /// Startup content: the file from the command line, else the sample skybox.
    fn start_initial_load(&mut self) {
        if let Some(path) = self.initial_file.take() {
            self.open_path(&path);
        } else if self.config.sample.fetch_on_startup {
            let url = self.config.sample.url.clone();
            let name = remote::file_name_from_url(&url);
            log::info!("Fetching sample {}", url);
            self.viewer.begin_load(&name);
            self.loader.submit_with(name, move |assets| {
                let upload = remote::fetch_sample(&url)?;
                assets.load(&upload)
            });
        }
    }

    /// Classify by name here; the worker does the reading.
    fn open_path(&mut self, path: &Path) {
        let name = assets::file_name(path);
        if sniff::classify(&name, "").is_none() {
            self.viewer
                .report(&name, LoadFailure::UnclassifiedFile { name: name.clone() });
            return;
        }
        log::info!("Queued {}", path.display());
        self.viewer.begin_load(&name);
        self.loader.submit_path(name, path.to_path_buf());
    }

    fn pick_file(&mut self) {
        let extensions = sniff::picker_extensions();
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Supported files", extensions.as_slice())
            .pick_file()
        {
            self.open_path(&path);
        }
    }

    fn save_look(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Look", &["json"])
            .set_file_name("look.json")
            .save_file()
        else {
            return;
        };
        match serialization::save_settings_to_file(&self.viewer.settings(), &path) {
            Ok(()) => log::info!("Look saved to {:?}", path),
            Err(err) => log::warn!("Failed to save look: {}", err),
        }
    }

    fn load_look(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Look", &["json"])
            .pick_file()
        else {
            return;
        };
        match serialization::load_settings_from_file(&path) {
            Ok(settings) => {
                self.viewer.apply(SettingsChange::Replace(settings));
                log::info!("Look loaded from {:?}", path);
            }
            Err(err) => log::warn!("Failed to load look: {}", err),
        }
    }

    fn apply_actions(&mut self, actions: PanelActions) {
        for change in actions.changes {
            log::debug!("Settings change {:?}", change);
            self.viewer.apply(change);
        }
        if actions.dismiss_notice {
            self.viewer.dismiss_notice();
        }
        if actions.open_file {
            self.pick_file();
        }
        if actions.save_look {
            self.save_look();
        }
        if actions.load_look {
            self.load_look();
        }
    }

    fn poll_loads(&mut self) {
        while let Some(result) = self.loader.poll() {
            if self.viewer.finish_load(result).is_none() {
                continue;
            }
            if let Some(scene) = self.viewer.current().and_then(|c| c.asset.scene()) {
                self.camera
                    .frame_bounds_preserve_orientation(scene.bounds.center(), scene.bounds.extent());
            }
        }
    }

    fn update_camera(&mut self) {
        if !self.ui_wants_keyboard {
            self.camera
                .update_movement(&self.input.movement(), self.timing.frame_dt);
        }
        let (yaw, pitch) = self.input.take_orbit();
        if yaw != 0.0 || pitch != 0.0 {
            self.camera.orbit(yaw, pitch);
        }
        let zoom = self.input.take_zoom();
        if zoom != 0.0 {
            self.camera.zoom(zoom);
        }
    }

    fn render(&mut self) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if self.timing.tick(Instant::now()) {
            window.set_title(&self.timing.title(&self.config.window.title, self.viewer.loading()));
        }
        self.poll_loads();
        self.update_camera();

        let Some(egui) = self.egui.as_mut() else {
            return;
        };
        let view = PanelView {
            settings: self.viewer.settings(),
            loading: self.viewer.loading(),
            current: self.viewer.current().map(ui::summarize),
            notice: self.viewer.notice(),
            hovering_file: self.hovering_file,
        };
        let mut actions = PanelActions::default();
        let frame = egui.frame(&window, |ctx| {
            actions = ui::draw_panel(ctx, &view);
        });
        self.ui_wants_pointer = frame.wants_pointer;
        self.ui_wants_keyboard = frame.wants_keyboard;
        if !actions.is_empty() {
            self.apply_actions(actions);
        }

        let mounts = self.viewer.mount_set();
        if let Some(render) = self.render.as_mut() {
            if let Err(err) = render.render(
                &self.camera,
                &self.config.stage,
                &mounts,
                self.viewer.current(),
                &frame,
            ) {
                log::error!("Render failed: {}", err);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(self.config.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(true);

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        match RenderContext::new(window.clone()) {
            Ok(render) => self.render = Some(render),
            Err(err) => {
                log::error!("Failed to initialize the renderer: {}", err);
                event_loop.exit();
                return;
            }
        }
        self.egui = Some(UiInput::new(&window));
        self.update_target_frame_duration(&window);
        self.window = Some(window);
        self.start_initial_load();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let consumed = match (self.egui.as_mut(), self.window.as_ref()) {
            (Some(egui), Some(window)) => egui.on_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Focused(false) => self.input.reset(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    event_loop.exit();
                    return;
                }
                if !consumed {
                    let pressed = event.state == ElementState::Pressed;
                    self.input.handle_key(event.physical_key, pressed);
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(render) = &mut self.render {
                    render.resize(new_size);
                }
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::Moved(_) => {
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.handle_cursor(position.x, position.y);
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseInput { state, button, .. } => {
                if !self.ui_wants_pointer || state == ElementState::Released {
                    self.input.handle_mouse_button(button, state);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !self.ui_wants_pointer {
                    self.input.handle_wheel(delta);
                }
            }
            WindowEvent::HoveredFile(_) => self.hovering_file = true,
            WindowEvent::HoveredFileCancelled => self.hovering_file = false,
            WindowEvent::DroppedFile(path) => {
                self.hovering_file = false;
                log::info!("Dropped {:?}", path);
                self.open_path(&path);
            }
            WindowEvent::RedrawRequested => self.render(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if self.loader.is_pending() {
            log::info!("Abandoning unfinished load");
        }
        self.viewer.clear();
        log::info!(
            "Discarded {} superseded load result(s) this session",
            self.loader.stale_dropped()
        );
    }
}

pub fn run(config: ViewerConfig, initial_file: Option<PathBuf>) {
    log::info!("dropview: drop an image, model, video or zip archive onto the window");
    log::info!("   Press ESC or close window to exit");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, initial_file);
    event_loop.run_app(&mut app).expect("Event loop error");

    log::info!("Goodbye!");
}
