//! Camera placement, projection and the per-frame camera uniform.
//!
//! The preview uses a left-handed view space with depth mapped to `0..1`.
//! A freshly framed camera sits in front of the model on the negative z
//! side and looks down +z at the bounding-box centre.

use cgmath::{Deg, Matrix4, Point3, Rad, SquareMatrix, Vector3};

use crate::{config::PreviewConfig, data_structures::model::BoundingBox};

/// Distance from which an object of `size` fills the view for `fovy`.
///
/// Linear in `size`: `factor * size / (2 * tan(fovy / 2)) + size / 2`.
pub fn camera_distance(size: f32, fovy: Rad<f32>, factor: f32) -> f32 {
    factor * size / (2.0 * (fovy.0 / 2.0).tan()) + 0.5 * size
}

/// Which point a movement key moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    Camera,
    Target,
}

/// A single key-press movement along the world axes.
///
/// `Forward` follows the right-handed forward axis (-z), so it backs a freshly
/// framed camera away from the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

impl Movement {
    fn direction(self) -> Vector3<f32> {
        match self {
            Movement::Forward => -Vector3::unit_z(),
            Movement::Backward => Vector3::unit_z(),
            Movement::Left => -Vector3::unit_x(),
            Movement::Right => Vector3::unit_x(),
            Movement::Up => Vector3::unit_y(),
            Movement::Down => -Vector3::unit_y(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

impl Camera {
    /// Place the camera so the whole of `bounds` is in view.
    ///
    /// `lifted` raises the camera by `config.vertical_offset` of the model
    /// height; the interactive view uses it, the batch render does not.
    pub fn frame(bounds: &BoundingBox, config: &PreviewConfig, lifted: bool) -> Self {
        let extent = bounds.extent();
        let size = extent.x.max(extent.y).max(extent.z);
        let distance = camera_distance(
            size,
            Deg(config.fov_degrees).into(),
            config.camera_distance,
        );
        let target = bounds.center();
        let mut position = target - Vector3::unit_z() * distance;
        if lifted {
            position.y += config.vertical_offset * bounds.height();
        }
        Self { position, target }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_lh(self.position, self.target, Vector3::unit_y())
    }

    pub fn apply(&mut self, subject: Subject, movement: Movement, step: f32) {
        let delta = movement.direction() * step;
        match subject {
            Subject::Camera => self.position += delta,
            Subject::Target => self.target += delta,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn from_config(width: u32, height: u32, config: &PreviewConfig) -> Self {
        Self::new(
            width,
            height,
            Deg(config.fov_degrees),
            config.z_near,
            config.z_far,
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Left-handed perspective projection with depth in `0..1`.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        let ys = 1.0 / (self.fovy.0 / 2.0).tan();
        let xs = ys / self.aspect;
        let depth = self.zfar / (self.zfar - self.znear);
        #[rustfmt::skip]
        let m = Matrix4::new(
            xs,  0.0, 0.0,                 0.0,
            0.0, ys,  0.0,                 0.0,
            0.0, 0.0, depth,               1.0,
            0.0, 0.0, -self.znear * depth, 0.0,
        );
        m
    }
}

/// Frame parameter block shared by every draw of a frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub view_position: [f32; 4],
    /// `x` is 1.0 when rendering to an off-screen target.
    pub params: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            inv_view: Matrix4::identity().into(),
            view_position: [0.0; 4],
            params: [0.0; 4],
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection, offscreen: bool) {
        let view = camera.calc_matrix();
        self.view_proj = (projection.calc_matrix() * view).into();
        self.inv_view = view.invert().unwrap_or_else(Matrix4::identity).into();
        self.view_position = camera.position.to_homogeneous().into();
        self.params = [if offscreen { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0];
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector4};

    use super::*;

    fn cube(half: f32) -> BoundingBox {
        BoundingBox {
            min: Point3::new(-half, 0.0, -half),
            max: Point3::new(half, 2.0 * half, half),
        }
    }

    #[test]
    fn distance_scales_linearly_with_size() {
        let fovy: Rad<f32> = Deg(42.0).into();
        let d1 = camera_distance(1.0, fovy, 0.8);
        let d2 = camera_distance(2.0, fovy, 0.8);
        let d3 = camera_distance(3.0, fovy, 0.8);
        assert!(d1 > 0.0 && d2 > d1 && d3 > d2);
        assert!((d2 - 2.0 * d1).abs() < 1e-5);
        assert!((d3 - 3.0 * d1).abs() < 1e-5);
        // tan(21deg) = 0.383864
        assert!((d1 - (0.8 / (2.0 * 0.383864) + 0.5)).abs() < 1e-4);
    }

    #[test]
    fn framing_targets_the_centre() {
        let config = PreviewConfig::default();
        let bounds = cube(1.0);
        let camera = Camera::frame(&bounds, &config, false);
        assert_eq!(camera.target, bounds.center());
        let distance = camera_distance(2.0, Deg(config.fov_degrees).into(), config.camera_distance);
        assert!((camera.position.z - (bounds.center().z - distance)).abs() < 1e-5);
        assert_eq!(camera.position.x, camera.target.x);
        assert_eq!(camera.position.y, camera.target.y);
    }

    #[test]
    fn interactive_framing_lifts_the_camera() {
        let config = PreviewConfig::default();
        let bounds = cube(1.0);
        let flat = Camera::frame(&bounds, &config, false);
        let lifted = Camera::frame(&bounds, &config, true);
        assert!((lifted.position.y - flat.position.y - 0.15 * 2.0).abs() < 1e-5);
        assert_eq!(lifted.target, flat.target);
    }

    #[test]
    fn movement_moves_only_the_subject() {
        let mut camera = Camera::frame(&cube(1.0), &PreviewConfig::default(), false);
        let before = camera;
        camera.apply(Subject::Camera, Movement::Forward, 0.1);
        assert!((camera.position.z - before.position.z + 0.1).abs() < 1e-6);
        assert_eq!(camera.target, before.target);
        camera.apply(Subject::Target, Movement::Left, 0.1);
        assert!((camera.target.x - before.target.x + 0.1).abs() < 1e-6);
    }

    #[test]
    fn forward_backs_away_from_a_framed_model() {
        let mut camera = Camera::frame(&cube(1.0), &PreviewConfig::default(), false);
        let start = (camera.target - camera.position).magnitude();
        camera.apply(Subject::Camera, Movement::Forward, 0.1);
        let after_forward = (camera.target - camera.position).magnitude();
        assert!((after_forward - start - 0.1).abs() < 1e-5);
        camera.apply(Subject::Camera, Movement::Backward, 0.2);
        let after_backward = (camera.target - camera.position).magnitude();
        assert!((start - after_backward - 0.1).abs() < 1e-5);
    }

    #[test]
    fn projection_maps_near_and_far_to_unit_depth() {
        let p = Projection::new(800, 600, Deg(42.0), 0.1, 10.0);
        let m = p.calc_matrix();
        let near = m * Vector4::new(0.0, 0.0, 0.1, 1.0);
        let far = m * Vector4::new(0.0, 0.0, 10.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-6);
        assert!((far.z / far.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn framed_model_lands_in_front_of_the_camera() {
        let config = PreviewConfig::default();
        let bounds = cube(1.0);
        let camera = Camera::frame(&bounds, &config, false);
        let view = camera.calc_matrix();
        let centre = view * bounds.center().to_homogeneous();
        assert!(centre.z > 0.0);
        assert!(centre.truncate().truncate().magnitude() < 1e-5);
    }
}
