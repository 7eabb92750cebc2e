use std::sync::Arc;

use smallvec::SmallVec;
use strum::Display;

use crate::graphics::{Extent2D, GpuDevice, TextureFormat, TextureHandle};
use crate::math;

pub type CameraId = u32;
pub type AdapterId = u64;

/// Prediction timestamp handed out by the compositor, in its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

/// Token identifying a coordinate system issued by a spatial locator.
/// Tokens from a replaced locator stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateSystem(pub u64);

#[derive(Debug, Clone, Copy)]
pub struct StationaryReference {
    coordinate_system: CoordinateSystem,
}

impl StationaryReference {
    pub const fn new(coordinate_system: CoordinateSystem) -> Self {
        Self { coordinate_system }
    }

    pub const fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };
}

/// Left/right matrix pair as the compositor hands it out.
#[derive(Debug, Clone, Copy)]
pub struct StereoTransform {
    pub left: mint::ColumnMatrix4<f32>,
    pub right: mint::ColumnMatrix4<f32>,
}

/// Device location in a coordinate system at a timestamp.
#[derive(Debug, Clone, Copy)]
pub struct SpatialLocation {
    pub position: mint::Vector3<f32>,
    pub orientation: mint::Quaternion<f32>,
    pub linear_velocity: mint::Vector3<f32>,
    pub angular_velocity: mint::Quaternion<f32>,
}

impl Default for SpatialLocation {
    fn default() -> Self {
        Self {
            position: math::zero_vector(),
            orientation: math::identity_orientation(),
            linear_velocity: math::zero_vector(),
            angular_velocity: math::identity_orientation(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Locatability {
    Unavailable,
    PositionalTrackingActivating,
    OrientationOnly,
    PositionalTrackingInhibited,
    PositionalTrackingActive,
}

#[derive(Debug, Clone, Copy)]
pub struct CameraDescriptor {
    pub id: CameraId,
    pub render_target_size: Extent2D,
    pub is_stereo: bool,
    pub viewport_scale_factor: f32,
    pub max_quad_layers: u32,
}

/// Predicted position of one camera for the frame being composed.
#[derive(Debug, Clone)]
pub struct CameraPose {
    pub camera: CameraId,
    pub render_target_size: Extent2D,
    pub viewport: Viewport,
    pub near_plane: f32,
    pub far_plane: f32,
    pub projection: StereoTransform,
}

pub struct FramePrediction {
    pub timestamp: Timestamp,
    pub camera_poses: SmallVec<[CameraPose; 2]>,
}

/// Per-frame, per-camera resources owned by the compositor. The back buffer
/// is a system-owned swap chain image and may differ from frame to frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderingParameters {
    pub back_buffer: TextureHandle,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Success,
    DeviceRemoved,
}

/// Completion token for a camera-added event. The compositor keeps the new
/// camera out of frame predictions until this completes, so resource
/// allocation is ordered before the camera's first frame.
pub struct Deferral {
    complete: Box<dyn FnOnce() + Send>,
}

impl Deferral {
    pub fn new(complete: impl FnOnce() + Send + 'static) -> Self {
        Self {
            complete: Box::new(complete),
        }
    }

    pub fn complete(self) {
        (self.complete)();
    }
}

/// Camera topology and tracking notifications, delivered on the
/// compositor's callback thread.
pub trait SpaceListener: Send + Sync {
    fn camera_added(&self, camera: CameraDescriptor, deferral: Deferral);
    fn camera_removed(&self, camera: CameraId);
    fn availability_changed(&self);
    fn locatability_changed(&self, locatability: Locatability);
}

pub trait SpatialLocator: Send + Sync {
    fn locatability(&self) -> Locatability;
    fn create_stationary_reference(&self) -> StationaryReference;
    fn try_locate(
        &self,
        timestamp: Timestamp,
        coordinate_system: CoordinateSystem,
    ) -> Option<SpatialLocation>;
}

/// One compositor frame between acquisition and present.
pub trait CompositorFrame: Send {
    /// Re-predicts camera poses closer to the actual present time.
    fn update_prediction(&mut self);
    fn prediction(&self) -> &FramePrediction;
    fn rendering_parameters(&self, camera: CameraId) -> anyhow::Result<RenderingParameters>;

    /// View matrices of a camera pose in the given coordinate system. None
    /// means the pose and coordinate system cannot be related this frame,
    /// typically because positional tracking is not active.
    fn try_view_transform(
        &self,
        camera: CameraId,
        coordinate_system: CoordinateSystem,
    ) -> Option<StereoTransform>;

    /// Waits for the frame to finish and hands it to the compositor.
    fn present(&mut self) -> PresentResult;
}

/// The system compositor owning the stereo swap chain.
pub trait HolographicSpace: Send + Sync {
    fn set_gpu_device(&self, device: Arc<dyn GpuDevice>) -> anyhow::Result<()>;

    /// Adapter the compositor wants frames rendered on; 0 when it has no
    /// preference.
    fn primary_adapter_id(&self) -> AdapterId;

    /// Must be called before the first frame is created so no camera event
    /// is missed.
    fn subscribe(&self, listener: Arc<dyn SpaceListener>);

    fn create_next_frame(&self) -> anyhow::Result<Box<dyn CompositorFrame>>;
    fn default_locator(&self) -> Option<Arc<dyn SpatialLocator>>;
}
