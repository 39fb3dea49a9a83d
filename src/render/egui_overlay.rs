//! egui on top of the stage: winit input in, tessellated frame out, drawn by
//! `egui-wgpu` in its own pass.

use egui_wgpu::{Renderer, ScreenDescriptor};
use winit::event::WindowEvent;
use winit::window::Window;

/// One tessellated UI frame plus what the UI wants from the input this frame.
pub struct UiFrame {
    primitives: Vec<egui::ClippedPrimitive>,
    textures: egui::TexturesDelta,
    screen: ScreenDescriptor,
    pub wants_pointer: bool,
    pub wants_keyboard: bool,
}

/// Owns the egui context and its winit input state.
pub struct UiInput {
    context: egui::Context,
    state: egui_winit::State,
}

impl UiInput {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        context.set_visuals(egui::Visuals::dark());
        let state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self { context, state }
    }

    /// Returns true when the panel consumed the event.
    pub fn on_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    pub fn frame(&mut self, window: &Window, build: impl FnMut(&egui::Context)) -> UiFrame {
        let input = self.state.take_egui_input(window);
        let output = self.context.run(input, build);
        self.state
            .handle_platform_output(window, output.platform_output);
        let size = window.inner_size();
        UiFrame {
            primitives: self.context.tessellate(output.shapes, output.pixels_per_point),
            textures: output.textures_delta,
            screen: ScreenDescriptor {
                size_in_pixels: [size.width.max(1), size.height.max(1)],
                pixels_per_point: output.pixels_per_point,
            },
            wants_pointer: self.context.wants_pointer_input(),
            wants_keyboard: self.context.wants_keyboard_input(),
        }
    }
}

/// Draws a [`UiFrame`] on top of the stage.
pub struct EguiOverlay {
    renderer: Renderer,
}

impl EguiOverlay {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self {
            renderer: Renderer::new(device, format, None, 1, false),
        }
    }

    /// Upload texture deltas and vertex data. Returns command buffers that
    /// must be submitted before the encoder holding the overlay pass.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &UiFrame,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &frame.textures.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &frame.primitives, &frame.screen)
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'static>, frame: &UiFrame) {
        self.renderer.render(pass, &frame.primitives, &frame.screen);
    }

    /// Free textures egui no longer needs; call after the frame is submitted.
    pub fn finish(&mut self, frame: &UiFrame) {
        for id in &frame.textures.free {
            self.renderer.free_texture(id);
        }
    }
}
