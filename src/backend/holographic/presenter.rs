use std::any::Any;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Result;
use glam::Mat4;
use log::{info, trace, warn};

use crate::backend::common::LeftRight;
use crate::graphics::{
    Extent2D, GpuDevice, PresentOutcome, Presenter, Region, StereoTexture, TextureFormat,
};

use super::camera::CameraMap;
use super::space::{
    CameraDescriptor, CameraId, CompositorFrame, CoordinateSystem, Deferral, HolographicSpace,
    Locatability, PresentResult, SpaceListener, SpatialLocation, SpatialLocator,
    StationaryReference, Timestamp, Viewport,
};

struct TrackingState {
    locator: Option<Arc<dyn SpatialLocator>>,
    reference_frame: Option<StationaryReference>,
}

/// State shared between the render thread and the compositor's callback
/// thread. The camera table mutex serializes topology changes against the
/// per-frame resource refresh.
struct SpaceState {
    device: Arc<dyn GpuDevice>,
    space: Arc<dyn HolographicSpace>,
    cameras: Arc<Mutex<CameraMap>>,
    tracking: Mutex<TrackingState>,
}

impl SpaceState {
    /// Re-acquires the default spatial locator. A swapped locator discards
    /// the stationary reference frame; no pose survives the swap.
    fn refresh_locator(&self) {
        let mut tracking = self.tracking.lock().unwrap();
        let locator = self.space.default_locator();

        let changed = match (&tracking.locator, &locator) {
            (Some(old), Some(new)) => !Arc::ptr_eq(old, new),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            return;
        }

        tracking.reference_frame = None;
        tracking.locator = locator;

        if let Some(locator) = &tracking.locator {
            info!("spatial locator changed, creating stationary reference frame");
            tracking.reference_frame = Some(locator.create_stationary_reference());
        } else {
            warn!("no spatial locator available");
        }
    }

    fn coordinate_system(&self) -> Option<CoordinateSystem> {
        self.tracking
            .lock()
            .unwrap()
            .reference_frame
            .map(|reference| reference.coordinate_system())
    }

    fn locator_and_reference(&self) -> Option<(Arc<dyn SpatialLocator>, StationaryReference)> {
        let tracking = self.tracking.lock().unwrap();
        match (&tracking.locator, &tracking.reference_frame) {
            (Some(locator), Some(reference)) => Some((locator.clone(), *reference)),
            _ => None,
        }
    }
}

impl SpaceListener for SpaceState {
    fn camera_added(&self, camera: CameraDescriptor, deferral: Deferral) {
        // Resource bookkeeping happens off the callback thread; the camera
        // stays out of frame predictions until the deferral completes, so
        // allocation is ordered before the camera's first frame.
        let cameras = Arc::clone(&self.cameras);
        thread::spawn(move || {
            cameras.lock().unwrap().insert(&camera);
            deferral.complete();
        });
    }

    fn camera_removed(&self, camera: CameraId) {
        info!("camera {camera}: removed");
        self.cameras.lock().unwrap().remove(camera, &self.device);
    }

    fn availability_changed(&self) {
        self.refresh_locator();
    }

    fn locatability_changed(&self, locatability: Locatability) {
        match locatability {
            Locatability::Unavailable => warn!("positional tracking is {locatability}"),
            _ => info!("positional tracking is {locatability}"),
        }
    }
}

/// Per-frame negotiation with the holographic compositor: acquires frames,
/// keeps camera resources valid, copies the engine's side-by-side stereo
/// texture into the active camera's back buffer and presents.
///
/// Lives on the render thread; camera events reach it through [`SpaceState`].
pub struct HoloPresenter {
    device: Arc<dyn GpuDevice>,
    space: Arc<dyn HolographicSpace>,
    state: Arc<SpaceState>,
    frame: Option<Box<dyn CompositorFrame>>,
    back_buffer: Option<StereoTexture>,
    device_lost: bool,
}

impl HoloPresenter {
    pub fn new(device: Arc<dyn GpuDevice>, space: Arc<dyn HolographicSpace>) -> Result<Self> {
        space.set_gpu_device(device.clone())?;

        let state = Arc::new(SpaceState {
            device: device.clone(),
            space: space.clone(),
            cameras: Arc::new(Mutex::new(CameraMap::new())),
            tracking: Mutex::new(TrackingState {
                locator: None,
                reference_frame: None,
            }),
        });

        // Locator first, then events: registration must precede the first
        // frame so no camera notification is missed.
        state.refresh_locator();
        space.subscribe(state.clone());

        Ok(Self {
            device,
            space,
            state,
            frame: None,
            back_buffer: None,
            device_lost: false,
        })
    }

    /// Acquires the next compositor frame, refreshes its pose prediction and
    /// validates camera resources for every predicted camera.
    pub fn begin_draw(&mut self) -> Result<()> {
        trace!("begin_draw");
        let mut frame = self.space.create_next_frame()?;
        frame.update_prediction();
        self.ensure_camera_resources(frame.as_ref())?;
        self.frame = Some(frame);
        Ok(())
    }

    fn ensure_camera_resources(&mut self, frame: &dyn CompositorFrame) -> Result<()> {
        let coordinate_system = self.state.coordinate_system();
        let cameras_lock = Arc::clone(&self.state.cameras);
        let mut cameras = cameras_lock.lock().unwrap();

        for pose in &frame.prediction().camera_poses {
            let is_current = cameras.current() == Some(pose.camera);
            let Some(resources) = cameras.get_mut(pose.camera) else {
                // Deferral ordering makes this unreachable; a skipped pose
                // self-heals next frame.
                warn!("no resources for predicted camera {}", pose.camera);
                continue;
            };

            let params = frame.rendering_parameters(pose.camera)?;
            resources.ensure_back_buffer(&self.device, &params, pose.render_target_size)?;

            match coordinate_system {
                Some(coordinate_system) => resources.update_pose(pose, frame, coordinate_system),
                None => resources.invalidate_view_transform(),
            }

            if is_current {
                let extent = Extent2D::new(
                    pose.render_target_size.width * 2,
                    pose.render_target_size.height,
                );
                self.ensure_back_buffer(extent, params.format)?;
            }
        }

        Ok(())
    }

    fn ensure_back_buffer(&mut self, extent: Extent2D, format: TextureFormat) -> Result<()> {
        match &mut self.back_buffer {
            Some(back_buffer)
                if back_buffer.extent() == extent && back_buffer.format() == format => {}
            Some(back_buffer) => {
                info!(
                    "resizing stereo back buffer to {}x{}",
                    extent.width, extent.height
                );
                back_buffer.resize(&self.device, extent, format)?;
            }
            None => {
                info!(
                    "creating stereo back buffer at {}x{}",
                    extent.width, extent.height
                );
                self.back_buffer = Some(StereoTexture::new(&self.device, extent, format)?);
            }
        }
        Ok(())
    }

    /// Locates the device at the current prediction timestamp. Re-predicts
    /// first; up-to-date predictions improve image stabilization.
    pub fn try_update_spatial_location(&mut self) -> Option<SpatialLocation> {
        let Some((locator, reference)) = self.state.locator_and_reference() else {
            trace!("spatial locator not ready");
            return None;
        };
        let frame = self.frame.as_mut()?;

        frame.update_prediction();
        let timestamp = frame.prediction().timestamp;

        let location = locator.try_locate(timestamp, reference.coordinate_system());
        if location.is_none() {
            trace!("cannot update spatial location");
        }
        location
    }

    /// Viewport plus view/projection of the active camera for one eye, as
    /// cached in `begin_draw`. None while the view transform could not be
    /// resolved; callers must treat their matrices as stale for the frame.
    pub fn try_get_camera_pose(&self, eye: LeftRight) -> Option<(Viewport, Mat4, Mat4)> {
        let cameras = self.state.cameras.lock().unwrap();
        let resources = cameras.current_resources()?;
        if !resources.view_transform_acquired() {
            trace!("view transform not acquired for eye {}", eye.index());
            return None;
        }
        Some((
            resources.viewport(),
            resources.view(eye),
            resources.projection(eye),
        ))
    }

    /// Copies each eye's half of the engine back buffer into the active
    /// camera's stereo back buffer. No-op without an active camera or back
    /// buffer.
    pub fn end_draw(&mut self) -> Result<()> {
        let Some(back_buffer) = &self.back_buffer else {
            return Ok(());
        };
        let cameras = self.state.cameras.lock().unwrap();
        let Some(resources) = cameras.current_resources() else {
            return Ok(());
        };
        let Some(camera_target) = resources.back_buffer() else {
            return Ok(());
        };

        let Extent2D { width, height } = resources.render_target_size();

        self.device.copy_region(
            back_buffer.handle(),
            Region {
                x: 0,
                y: 0,
                width,
                height,
            },
            camera_target,
            0,
        )?;

        if resources.is_stereo() {
            self.device.copy_region(
                back_buffer.handle(),
                Region {
                    x: width,
                    y: 0,
                    width,
                    height,
                },
                camera_target,
                1,
            )?;
        }

        Ok(())
    }

    /// Presents the frame. Waits for the frame to finish: starting work on a
    /// new frame only after the previous one improves the compositor's
    /// predictions. A device-removed result tears down all camera resources;
    /// recreating the device is the host's responsibility.
    pub fn present(&mut self) -> Result<PresentOutcome> {
        let Some(mut frame) = self.frame.take() else {
            anyhow::bail!("present without begin_draw");
        };

        match frame.present() {
            PresentResult::Success => Ok(PresentOutcome::Presented),
            PresentResult::DeviceRemoved => {
                warn!("graphics device removed during present");
                self.handle_device_lost();
                Ok(PresentOutcome::DeviceLost)
            }
        }
    }

    fn handle_device_lost(&mut self) {
        self.device_lost = true;
        self.state.cameras.lock().unwrap().release_all(&self.device);
        if let Some(back_buffer) = self.back_buffer.take() {
            back_buffer.release(&self.device);
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    pub fn back_buffer(&self) -> Option<&StereoTexture> {
        self.back_buffer.as_ref()
    }

    pub fn prediction_timestamp(&self) -> Option<Timestamp> {
        self.frame.as_ref().map(|frame| frame.prediction().timestamp)
    }

    pub fn current_coordinate_system(&self) -> Option<CoordinateSystem> {
        self.state.coordinate_system()
    }

    pub fn active_camera(&self) -> Option<CameraId> {
        self.state.cameras.lock().unwrap().current()
    }

    pub fn camera_count(&self) -> usize {
        self.state.cameras.lock().unwrap().len()
    }

    pub fn has_camera(&self, camera: CameraId) -> bool {
        self.state.cameras.lock().unwrap().contains(camera)
    }
}

impl Presenter for HoloPresenter {
    fn begin_draw(&mut self) -> Result<()> {
        HoloPresenter::begin_draw(self)
    }

    fn end_draw(&mut self) -> Result<()> {
        HoloPresenter::end_draw(self)
    }

    fn present(&mut self) -> Result<PresentOutcome> {
        HoloPresenter::present(self)
    }

    fn back_buffer(&self) -> Option<&StereoTexture> {
        HoloPresenter::back_buffer(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
