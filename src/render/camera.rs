use glam::{Mat4, Vec3};

#[derive(Debug, Default, Clone, Copy)]
pub struct CameraMovement {
    pub aim_left: bool,
    pub aim_right: bool,
    pub aim_up: bool,
    pub aim_down: bool,
}

/// Orbit camera: yaw/pitch around a pivot, looking at it.
#[derive(Debug, Clone, Copy)]
pub struct CameraController {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub pivot: [f32; 3],
    pub fov_deg: f32,
}

const MIN_DISTANCE: f32 = 0.05;
const PITCH_LIMIT: f32 = 1.55;

impl CameraController {
    /// Camera at `position` looking at `pivot`.
    pub fn looking_at(position: [f32; 3], pivot: [f32; 3], fov_deg: f32) -> Self {
        let forward = [
            pivot[0] - position[0],
            pivot[1] - position[1],
            pivot[2] - position[2],
        ];
        let (yaw, pitch) = forward_to_yaw_pitch(forward);
        Self {
            position,
            yaw,
            pitch,
            pivot,
            fov_deg,
        }
    }

    /// Back off along the current view direction until the bounds fit.
    pub fn frame_bounds_preserve_orientation(&mut self, center: [f32; 3], extent: [f32; 3]) {
        let radius = extent[0].max(extent[1]).max(extent[2]);
        let distance = if radius > 0.0 { radius * 3.0 } else { 3.0 };
        let (forward, _, _) = self.basis();
        self.pivot = center;
        self.position = [
            center[0] - forward[0] * distance,
            center[1] - forward[1] * distance,
            center[2] - forward[2] * distance,
        ];
    }

    pub fn distance(&self) -> f32 {
        (Vec3::from(self.position) - Vec3::from(self.pivot)).length()
    }

    /// Positive `zoom_delta` moves toward the pivot, never past it.
    pub fn zoom(&mut self, zoom_delta: f32) {
        let distance = (self.distance() - zoom_delta).max(MIN_DISTANCE);
        let (forward, _, _) = self.basis();
        self.position = (Vec3::from(self.pivot) - Vec3::from(forward) * distance).to_array();
    }

    pub fn orbit(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch += pitch_delta;
        wrap_angles(&mut self.yaw, &mut self.pitch);

        let distance = self.distance().max(MIN_DISTANCE);
        let (dir, _, _) = self.basis();
        self.position[0] = self.pivot[0] - dir[0] * distance;
        self.position[1] = self.pivot[1] - dir[1] * distance;
        self.position[2] = self.pivot[2] - dir[2] * distance;
    }

    pub fn basis(&self) -> ([f32; 3], [f32; 3], [f32; 3]) {
        camera_basis(self.yaw, self.pitch)
    }

    pub fn update_movement(&mut self, input: &CameraMovement, frame_dt: f32) -> bool {
        let aim_speed = 1.8 * frame_dt;
        let mut yaw = 0.0;
        let mut pitch = 0.0;
        if input.aim_left {
            yaw -= aim_speed;
        }
        if input.aim_right {
            yaw += aim_speed;
        }
        if input.aim_up {
            pitch += aim_speed;
        }
        if input.aim_down {
            pitch -= aim_speed;
        }
        if yaw == 0.0 && pitch == 0.0 {
            return false;
        }
        self.orbit(yaw, pitch);
        true
    }

    pub fn view_matrix(&self) -> Mat4 {
        let (forward, _, up) = self.basis();
        let eye = Vec3::from(self.position);
        Mat4::look_to_rh(eye, Vec3::from(forward), Vec3::from(up))
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), aspect.max(1e-3), 0.1, 2000.0)
    }
}

fn forward_to_yaw_pitch(forward: [f32; 3]) -> (f32, f32) {
    let len = (forward[0] * forward[0] + forward[1] * forward[1] + forward[2] * forward[2])
        .sqrt()
        .max(1e-6);
    let nx = forward[0] / len;
    let ny = forward[1] / len;
    let nz = forward[2] / len;
    let yaw = nz.atan2(nx);
    let pitch = ny.asin();
    (yaw, pitch)
}

fn camera_basis(yaw: f32, pitch: f32) -> ([f32; 3], [f32; 3], [f32; 3]) {
    let cos_pitch = pitch.cos();
    let forward = [yaw.cos() * cos_pitch, pitch.sin(), yaw.sin() * cos_pitch];
    let right = [-yaw.sin(), 0.0, yaw.cos()];
    let up = Vec3::from(right)
        .cross(Vec3::from(forward))
        .normalize_or_zero()
        .to_array();
    (forward, right, up)
}

fn wrap_angles(yaw: &mut f32, pitch: &mut f32) {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if yaw.is_finite() {
        *yaw = (*yaw + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
    // An orbit camera flips over the poles otherwise.
    if pitch.is_finite() {
        *pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraController, CameraMovement};
    use glam::Vec3;

    fn start() -> CameraController {
        CameraController::looking_at([0.0, 2.0, 5.0], [0.0, 0.0, 0.0], 75.0)
    }

    #[test]
    fn looking_at_faces_the_pivot() {
        let camera = start();
        let (forward, _, up) = camera.basis();
        let expected = (Vec3::ZERO - Vec3::new(0.0, 2.0, 5.0)).normalize();
        assert!((Vec3::from(forward) - expected).length() < 1e-5);
        assert!(up[1] > 0.0);
    }

    #[test]
    fn movement_update_keeps_distance_and_finite_values() {
        let mut camera = start();
        let distance = camera.distance();
        let movement = CameraMovement {
            aim_left: false,
            aim_right: true,
            aim_up: true,
            aim_down: false,
        };
        assert!(camera.update_movement(&movement, 1.0 / 60.0));
        assert!(camera.position.iter().all(|value| value.is_finite()));
        assert!((camera.distance() - distance).abs() < 1e-4);
        assert!(!camera.update_movement(&CameraMovement::default(), 1.0 / 60.0));
    }

    #[test]
    fn pitch_is_clamped_short_of_the_poles() {
        let mut camera = start();
        camera.orbit(0.0, 10.0);
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn zoom_never_passes_the_pivot() {
        let mut camera = start();
        camera.zoom(100.0);
        assert!(camera.distance() > 0.0);
        assert!(camera.distance() < 0.1);
    }

    #[test]
    fn frame_bounds_preserves_orientation() {
        let mut camera = CameraController::looking_at([5.0, 6.0, 7.0], [0.0, 0.0, 0.0], 60.0);
        let (yaw, pitch) = (camera.yaw, camera.pitch);
        camera.frame_bounds_preserve_orientation([1.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        assert!((camera.yaw - yaw).abs() < 1e-6);
        assert!((camera.pitch - pitch).abs() < 1e-6);
        assert_eq!(camera.pivot, [1.0, 0.0, 0.0]);
        assert!((camera.distance() - 6.0).abs() < 1e-4);
    }
}
