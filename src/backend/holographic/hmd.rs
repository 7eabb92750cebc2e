use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use log::debug;

use crate::backend::common::{BackendError, LeftRight};
use crate::backend::input::{DeviceState, TouchController};
use crate::graphics::{
    Extent2D, GpuDevice, Presenter, TextureDesc, TextureFormat, TextureHandle, TextureUsage,
};
use crate::math;

use super::input::InteractionSource;
use super::presenter::HoloPresenter;

const DEFAULT_RENDER_FRAME_SIZE: Extent2D = Extent2D {
    width: 2200,
    height: 2200,
};

/// Engine-facing HMD device built on top of the holographic presenter.
///
/// Tracks `Valid`/`OutOfRange` off whether the presenter can resolve a
/// spatial location each tick. `Invalid` exists for the hosting device
/// manager but is never entered from here.
pub struct HmdDevice {
    device: Arc<dyn GpuDevice>,
    presenter: HoloPresenter,
    sources: Arc<dyn InteractionSource>,
    state: DeviceState,
    head_position: Vec3,
    head_rotation: Quat,
    head_linear_velocity: Vec3,
    head_angular_velocity: Vec3,
    optimal_render_frame_size: Extent2D,
    actual_render_frame_size: Extent2D,
    render_frame_scaling: f32,
    mirror_texture: Option<TextureHandle>,
    left_hand: TouchController,
    right_hand: TouchController,
}

impl HmdDevice {
    /// Fails fast when the presenter is not the holographic one; the engine
    /// cannot drive a head-mounted display through anything else.
    pub fn enable(
        device: Arc<dyn GpuDevice>,
        presenter: Box<dyn Presenter>,
        sources: Arc<dyn InteractionSource>,
        require_mirror: bool,
    ) -> Result<Self, BackendError> {
        let presenter = presenter
            .into_any()
            .downcast::<HoloPresenter>()
            .map_err(|_| BackendError::PresenterRequired)?;
        let presenter = *presenter;

        let optimal_render_frame_size = presenter
            .back_buffer()
            .map_or(DEFAULT_RENDER_FRAME_SIZE, |back_buffer| back_buffer.extent());
        let actual_render_frame_size = optimal_render_frame_size;

        let mirror_texture = if require_mirror {
            Some(device.create_texture(
                &TextureDesc {
                    extent: actual_render_frame_size,
                    format: TextureFormat::Rgba8Unorm,
                    array_layers: 1,
                    usage: TextureUsage::COLOR,
                },
                "hmd mirror",
            )?)
        } else {
            None
        };

        Ok(Self {
            device,
            presenter,
            sources,
            state: DeviceState::Valid,
            head_position: Vec3::ZERO,
            head_rotation: Quat::IDENTITY,
            head_linear_velocity: Vec3::ZERO,
            head_angular_velocity: Vec3::ZERO,
            optimal_render_frame_size,
            actual_render_frame_size,
            render_frame_scaling: 1.0,
            mirror_texture,
            left_hand: TouchController::new(LeftRight::Left),
            right_hand: TouchController::new(LeftRight::Right),
        })
    }

    /// Per-tick pose refresh. While no spatial location resolves the device
    /// is out of range and the head pose reads as identity/zero.
    pub fn update(&mut self) {
        let previous = self.state;

        match self.presenter.try_update_spatial_location() {
            Some(location) => {
                self.state = DeviceState::Valid;
                self.head_position = math::vec3(location.position);
                self.head_rotation = math::quat(location.orientation);
                self.head_linear_velocity = math::vec3(location.linear_velocity);
                self.head_angular_velocity =
                    math::yaw_pitch_roll(math::quat(location.angular_velocity));
            }
            None => {
                self.state = DeviceState::OutOfRange;
                self.head_position = Vec3::ZERO;
                self.head_rotation = Quat::IDENTITY;
                self.head_linear_velocity = Vec3::ZERO;
                self.head_angular_velocity = Vec3::ZERO;
            }
        }

        if previous != self.state {
            debug!("hmd state: {} -> {}", previous, self.state);
        }

        self.update_controllers();
    }

    fn update_controllers(&mut self) {
        let (Some(timestamp), Some(coordinate_system)) = (
            self.presenter.prediction_timestamp(),
            self.presenter.current_coordinate_system(),
        ) else {
            return;
        };

        for (hand, controller) in [
            (LeftRight::Left, &mut self.left_hand),
            (LeftRight::Right, &mut self.right_hand),
        ] {
            if let Some((state, location)) =
                self.sources.state_for(hand, timestamp, coordinate_system)
            {
                controller.update(state, location);
            }
        }
    }

    /// Writes the eye's view/projection for this frame. On failure the
    /// outputs keep whatever the caller supplied and false is returned;
    /// those matrices must not be trusted for the frame.
    pub fn read_eye_parameters(
        &self,
        eye: LeftRight,
        _near_plane: f32,
        _far_plane: f32,
        view: &mut Mat4,
        projection: &mut Mat4,
    ) -> bool {
        match self.presenter.try_get_camera_pose(eye) {
            Some((_viewport, eye_view, eye_projection)) => {
                *view = eye_view;
                *projection = eye_projection;
                true
            }
            None => false,
        }
    }

    pub fn presenter(&self) -> &HoloPresenter {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut HoloPresenter {
        &mut self.presenter
    }

    pub fn can_initialize(&self) -> bool {
        true
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn head_position(&self) -> Vec3 {
        self.head_position
    }

    pub fn head_rotation(&self) -> Quat {
        self.head_rotation
    }

    pub fn head_linear_velocity(&self) -> Vec3 {
        self.head_linear_velocity
    }

    pub fn head_angular_velocity(&self) -> Vec3 {
        self.head_angular_velocity
    }

    pub fn left_hand(&self) -> &TouchController {
        &self.left_hand
    }

    pub fn right_hand(&self) -> &TouchController {
        &self.right_hand
    }

    pub fn mirror_texture(&self) -> Option<TextureHandle> {
        self.mirror_texture
    }

    pub fn optimal_render_frame_size(&self) -> Extent2D {
        self.optimal_render_frame_size
    }

    pub fn actual_render_frame_size(&self) -> Extent2D {
        self.actual_render_frame_size
    }

    pub fn render_frame_scaling(&self) -> f32 {
        self.render_frame_scaling
    }

    pub fn set_render_frame_scaling(&mut self, scaling: f32) {
        self.render_frame_scaling = scaling;
    }

    /// Tears down what the facade itself allocated.
    pub fn disable(mut self) {
        if let Some(mirror) = self.mirror_texture.take() {
            self.device.destroy_texture(mirror);
        }
    }
}
