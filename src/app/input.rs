use crate::render::CameraMovement;
use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Radians of orbit per pixel of left-button drag.
const DRAG_SENSITIVITY: f32 = 0.005;
/// World units per wheel line.
const ZOOM_PER_LINE: f32 = 0.5;
const PIXELS_PER_LINE: f32 = 40.0;

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    pub aim_left: bool,
    pub aim_right: bool,
    pub aim_up: bool,
    pub aim_down: bool,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    orbit: (f32, f32),
    zoom: f32,
}

impl InputState {
    pub fn handle_key(&mut self, key: PhysicalKey, pressed: bool) {
        match key {
            PhysicalKey::Code(KeyCode::ArrowLeft) => self.aim_left = pressed,
            PhysicalKey::Code(KeyCode::ArrowRight) => self.aim_right = pressed,
            PhysicalKey::Code(KeyCode::ArrowUp) => self.aim_up = pressed,
            PhysicalKey::Code(KeyCode::ArrowDown) => self.aim_down = pressed,
            _ => {}
        }
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.dragging = state == ElementState::Pressed;
        }
    }

    pub fn handle_cursor(&mut self, x: f64, y: f64) {
        if let (true, Some((last_x, last_y))) = (self.dragging, self.last_cursor) {
            self.orbit.0 += (x - last_x) as f32 * DRAG_SENSITIVITY;
            self.orbit.1 -= (y - last_y) as f32 * DRAG_SENSITIVITY;
        }
        self.last_cursor = Some((x, y));
    }

    pub fn cursor_left(&mut self) {
        self.last_cursor = None;
        self.dragging = false;
    }

    pub fn handle_wheel(&mut self, delta: MouseScrollDelta) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
        };
        self.zoom += lines * ZOOM_PER_LINE;
    }

    /// Drops held keys and drag state, e.g. when focus is lost.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn movement(&self) -> CameraMovement {
        CameraMovement {
            aim_left: self.aim_left,
            aim_right: self.aim_right,
            aim_up: self.aim_up,
            aim_down: self.aim_down,
        }
    }

    /// Accumulated (yaw, pitch) drag since the last call.
    pub fn take_orbit(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.orbit)
    }

    pub fn take_zoom(&mut self) -> f32 {
        std::mem::take(&mut self.zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_map_to_aim() {
        let mut input = InputState::default();
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowLeft), true);
        input.handle_key(PhysicalKey::Code(KeyCode::KeyW), true);
        let movement = input.movement();
        assert!(movement.aim_left);
        assert!(!movement.aim_right);
        input.handle_key(PhysicalKey::Code(KeyCode::ArrowLeft), false);
        assert!(!input.movement().aim_left);
    }

    #[test]
    fn drag_accumulates_only_while_pressed() {
        let mut input = InputState::default();
        input.handle_cursor(10.0, 10.0);
        input.handle_cursor(20.0, 10.0);
        assert_eq!(input.take_orbit(), (0.0, 0.0));

        input.handle_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.handle_cursor(30.0, 0.0);
        let (yaw, pitch) = input.take_orbit();
        assert!((yaw - 0.05).abs() < 1e-6);
        assert!((pitch - 0.05).abs() < 1e-6);
        assert_eq!(input.take_orbit(), (0.0, 0.0));
    }

    #[test]
    fn wheel_lines_and_pixels_agree() {
        let mut input = InputState::default();
        input.handle_wheel(MouseScrollDelta::LineDelta(0.0, 2.0));
        assert_eq!(input.take_zoom(), 1.0);
        input.handle_wheel(MouseScrollDelta::PixelDelta(
            winit::dpi::PhysicalPosition::new(0.0, -80.0),
        ));
        assert_eq!(input.take_zoom(), -1.0);
        assert_eq!(input.take_zoom(), 0.0);
    }

    #[test]
    fn leaving_the_window_stops_the_drag() {
        let mut input = InputState::default();
        input.handle_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.handle_cursor(0.0, 0.0);
        input.cursor_left();
        input.handle_cursor(100.0, 100.0);
        assert_eq!(input.take_orbit(), (0.0, 0.0));
    }
}
