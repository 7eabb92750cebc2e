use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use glam::{Affine3A, Mat4, Quat, Vec3};
use log::info;
use smallvec::SmallVec;

use crate::backend::holographic::space::{
    AdapterId, CameraDescriptor, CameraId, CameraPose, CompositorFrame, CoordinateSystem,
    Deferral, FramePrediction, HolographicSpace, Locatability, PresentResult,
    RenderingParameters, SpaceListener, SpatialLocation, SpatialLocator, StationaryReference,
    StereoTransform, Timestamp, Viewport,
};
use crate::graphics::{
    Extent2D, GpuDevice, TextureDesc, TextureFormat, TextureHandle, TextureUsage,
};

pub struct SimParams {
    pub adapter_id: AdapterId,
    pub near_plane: f32,
    pub far_plane: f32,
    pub ipd: f32,
    pub frame_wait: Duration,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            adapter_id: 1,
            near_plane: 0.05,
            far_plane: 100.0,
            ipd: 0.064,
            frame_wait: Duration::ZERO,
        }
    }
}

/// Tracking state scripted by tests and the demo host. Coordinate system
/// tokens carry the locator generation; tokens of a replaced locator stop
/// resolving, like reference frames across a real locator swap.
struct TrackingScript {
    generation: AtomicU64,
    lost: AtomicBool,
    locatability: Mutex<Locatability>,
    head: Mutex<(Vec3, Quat)>,
    ipd: f32,
}

struct SimLocator {
    tracking: Arc<TrackingScript>,
}

impl SpatialLocator for SimLocator {
    fn locatability(&self) -> Locatability {
        *self.tracking.locatability.lock().unwrap()
    }

    fn create_stationary_reference(&self) -> StationaryReference {
        StationaryReference::new(CoordinateSystem(self.tracking.generation.load(Ordering::Acquire)))
    }

    fn try_locate(
        &self,
        _timestamp: Timestamp,
        coordinate_system: CoordinateSystem,
    ) -> Option<SpatialLocation> {
        if self.tracking.lost.load(Ordering::Acquire) {
            return None;
        }
        if coordinate_system.0 != self.tracking.generation.load(Ordering::Acquire) {
            return None;
        }

        let (position, orientation) = *self.tracking.head.lock().unwrap();
        Some(SpatialLocation {
            position: position.into(),
            orientation: orientation.into(),
            ..Default::default()
        })
    }
}

struct SimCamera {
    descriptor: CameraDescriptor,
    ready: Arc<AtomicBool>,
    swap_images: Vec<TextureHandle>,
    next_image: usize,
}

struct SpaceInner {
    device: Option<Arc<dyn GpuDevice>>,
    listener: Option<Arc<dyn SpaceListener>>,
    cameras: Vec<SimCamera>,
    locator: Option<Arc<SimLocator>>,
    next_camera_id: CameraId,
}

/// In-process holographic compositor. Owns the per-camera swap chains,
/// builds frame predictions from deferral-completed cameras only, and lets
/// tests script tracking loss, locator swaps and device removal.
pub struct SimHolographicSpace {
    params: SimParams,
    inner: Mutex<SpaceInner>,
    tracking: Arc<TrackingScript>,
    device_removed: Arc<AtomicBool>,
    timestamp: Arc<AtomicI64>,
}

impl SimHolographicSpace {
    pub fn new(params: SimParams) -> Arc<Self> {
        let tracking = Arc::new(TrackingScript {
            generation: AtomicU64::new(1),
            lost: AtomicBool::new(false),
            locatability: Mutex::new(Locatability::PositionalTrackingActive),
            head: Mutex::new((Vec3::ZERO, Quat::IDENTITY)),
            ipd: params.ipd,
        });
        let locator = Arc::new(SimLocator {
            tracking: tracking.clone(),
        });
        Arc::new(Self {
            params,
            inner: Mutex::new(SpaceInner {
                device: None,
                listener: None,
                cameras: Vec::new(),
                locator: Some(locator),
                next_camera_id: 0,
            }),
            tracking,
            device_removed: Arc::new(AtomicBool::new(false)),
            timestamp: Arc::new(AtomicI64::new(0)),
        })
    }

    fn swap_ring(
        device: &Arc<dyn GpuDevice>,
        size: Extent2D,
        stereo: bool,
    ) -> Result<Vec<TextureHandle>> {
        let desc = TextureDesc {
            extent: size,
            format: TextureFormat::Bgra8Unorm,
            array_layers: if stereo { 2 } else { 1 },
            usage: TextureUsage::COLOR,
        };
        (0..2)
            .map(|_| device.create_texture(&desc, "holographic camera back buffer"))
            .collect()
    }

    /// Attaches a camera. The listener gets the event on the calling thread
    /// and the camera joins frame predictions once its deferral completes.
    pub fn add_camera(&self, size: Extent2D, stereo: bool) -> Result<CameraId> {
        let (descriptor, ready, listener) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(device) = inner.device.clone() else {
                bail!("no gpu device attached to the holographic space");
            };
            inner.next_camera_id += 1;
            let descriptor = CameraDescriptor {
                id: inner.next_camera_id,
                render_target_size: size,
                is_stereo: stereo,
                viewport_scale_factor: 1.0,
                max_quad_layers: 1,
            };
            let ready = Arc::new(AtomicBool::new(false));
            inner.cameras.push(SimCamera {
                descriptor,
                ready: ready.clone(),
                swap_images: Self::swap_ring(&device, size, stereo)?,
                next_image: 0,
            });
            (descriptor, ready, inner.listener.clone())
        };

        match listener {
            Some(listener) => {
                let deferral = Deferral::new(move || ready.store(true, Ordering::Release));
                listener.camera_added(descriptor, deferral);
            }
            None => ready.store(true, Ordering::Release),
        }
        Ok(descriptor.id)
    }

    /// Detaches a camera; its swap chain dies after the listener has let go
    /// of the buffers.
    pub fn remove_camera(&self, camera: CameraId) {
        let (removed, device, listener) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(index) = inner.cameras.iter().position(|c| c.descriptor.id == camera) else {
                return;
            };
            let removed = inner.cameras.swap_remove(index);
            (removed, inner.device.clone(), inner.listener.clone())
        };

        if let Some(listener) = listener {
            listener.camera_removed(camera);
        }
        if let Some(device) = device {
            for image in removed.swap_images {
                device.destroy_texture(image);
            }
        }
    }

    /// Changes a camera's render target size; the swap chain is replaced and
    /// the new size shows up in the next prediction.
    pub fn resize_camera(&self, camera: CameraId, size: Extent2D) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(device) = inner.device.clone() else {
            bail!("no gpu device attached to the holographic space");
        };
        let Some(entry) = inner
            .cameras
            .iter_mut()
            .find(|c| c.descriptor.id == camera)
        else {
            bail!("unknown camera {camera}");
        };

        for image in entry.swap_images.drain(..) {
            device.destroy_texture(image);
        }
        entry.descriptor.render_target_size = size;
        let stereo = entry.descriptor.is_stereo;
        entry.swap_images = Self::swap_ring(&device, size, stereo)?;
        entry.next_image = 0;
        Ok(())
    }

    pub fn set_tracking_lost(&self, lost: bool) {
        self.tracking.lost.store(lost, Ordering::Release);
    }

    pub fn set_head_pose(&self, position: Vec3, orientation: Quat) {
        *self.tracking.head.lock().unwrap() = (position, orientation);
    }

    pub fn set_locatability(&self, locatability: Locatability) {
        *self.tracking.locatability.lock().unwrap() = locatability;
        let listener = self.inner.lock().unwrap().listener.clone();
        if let Some(listener) = listener {
            listener.locatability_changed(locatability);
        }
    }

    /// Replaces the spatial locator, invalidating every coordinate system
    /// issued so far, then announces the availability change.
    pub fn swap_locator(&self) {
        self.tracking.generation.fetch_add(1, Ordering::AcqRel);
        let listener = {
            let mut inner = self.inner.lock().unwrap();
            inner.locator = Some(Arc::new(SimLocator {
                tracking: self.tracking.clone(),
            }));
            inner.listener.clone()
        };
        if let Some(listener) = listener {
            listener.availability_changed();
        }
    }

    /// Takes the spatial locator away entirely, as when the display backing
    /// it disappears.
    pub fn clear_locator(&self) {
        self.tracking.generation.fetch_add(1, Ordering::AcqRel);
        let listener = {
            let mut inner = self.inner.lock().unwrap();
            inner.locator = None;
            inner.listener.clone()
        };
        if let Some(listener) = listener {
            listener.availability_changed();
        }
    }

    /// The next present reports a removed device.
    pub fn trigger_device_removed(&self) {
        self.device_removed.store(true, Ordering::Release);
    }

    pub fn ready_camera_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .cameras
            .iter()
            .filter(|c| c.ready.load(Ordering::Acquire))
            .count()
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.inner
            .lock()
            .unwrap()
            .cameras
            .iter()
            .map(|c| c.descriptor.id)
            .collect()
    }

    fn eye_views(&self, head: (Vec3, Quat)) -> StereoTransform {
        let head_transform = Affine3A::from_rotation_translation(head.1, head.0);
        let half_ipd = self.tracking.ipd * 0.5;
        let left = head_transform * Affine3A::from_translation(Vec3::new(-half_ipd, 0.0, 0.0));
        let right = head_transform * Affine3A::from_translation(Vec3::new(half_ipd, 0.0, 0.0));
        StereoTransform {
            left: Mat4::from(left.inverse()).into(),
            right: Mat4::from(right.inverse()).into(),
        }
    }
}

impl HolographicSpace for SimHolographicSpace {
    fn set_gpu_device(&self, device: Arc<dyn GpuDevice>) -> Result<()> {
        info!("holographic space bound to adapter {}", self.params.adapter_id);
        self.inner.lock().unwrap().device = Some(device);
        Ok(())
    }

    fn primary_adapter_id(&self) -> AdapterId {
        self.params.adapter_id
    }

    fn subscribe(&self, listener: Arc<dyn SpaceListener>) {
        self.inner.lock().unwrap().listener = Some(listener);
    }

    fn create_next_frame(&self) -> Result<Box<dyn CompositorFrame>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.device.is_none() {
            bail!("no gpu device attached to the holographic space");
        }

        let timestamp = Timestamp(self.timestamp.fetch_add(1, Ordering::AcqRel) + 1);
        let mut camera_poses = SmallVec::new();
        let mut parameters = HashMap::new();

        for camera in &mut inner.cameras {
            if !camera.ready.load(Ordering::Acquire) {
                continue;
            }

            let size = camera.descriptor.render_target_size;
            let aspect = size.width as f32 / size.height as f32;
            let projection: mint::ColumnMatrix4<f32> = Mat4::perspective_rh(
                std::f32::consts::FRAC_PI_2,
                aspect,
                self.params.near_plane,
                self.params.far_plane,
            )
            .into();

            camera_poses.push(CameraPose {
                camera: camera.descriptor.id,
                render_target_size: size,
                viewport: Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: size.width as f32,
                    height: size.height as f32,
                },
                near_plane: self.params.near_plane,
                far_plane: self.params.far_plane,
                projection: StereoTransform {
                    left: projection,
                    right: projection,
                },
            });

            // The system walks its swap chain under the app.
            let image = camera.swap_images[camera.next_image];
            camera.next_image = (camera.next_image + 1) % camera.swap_images.len();
            parameters.insert(
                camera.descriptor.id,
                RenderingParameters {
                    back_buffer: image,
                    format: TextureFormat::Bgra8Unorm,
                },
            );
        }

        let head = *self.tracking.head.lock().unwrap();
        Ok(Box::new(SimFrame {
            prediction: FramePrediction {
                timestamp,
                camera_poses,
            },
            parameters,
            views: self.eye_views(head),
            tracking: self.tracking.clone(),
            device_removed: self.device_removed.clone(),
            timestamp_counter: self.timestamp.clone(),
            frame_wait: self.params.frame_wait,
        }))
    }

    fn default_locator(&self) -> Option<Arc<dyn SpatialLocator>> {
        self.inner
            .lock()
            .unwrap()
            .locator
            .clone()
            .map(|locator| locator as Arc<dyn SpatialLocator>)
    }
}

struct SimFrame {
    prediction: FramePrediction,
    parameters: HashMap<CameraId, RenderingParameters>,
    views: StereoTransform,
    tracking: Arc<TrackingScript>,
    device_removed: Arc<AtomicBool>,
    timestamp_counter: Arc<AtomicI64>,
    frame_wait: Duration,
}

impl CompositorFrame for SimFrame {
    fn update_prediction(&mut self) {
        self.prediction.timestamp =
            Timestamp(self.timestamp_counter.fetch_add(1, Ordering::AcqRel) + 1);
    }

    fn prediction(&self) -> &FramePrediction {
        &self.prediction
    }

    fn rendering_parameters(&self, camera: CameraId) -> Result<RenderingParameters> {
        match self.parameters.get(&camera) {
            Some(parameters) => Ok(*parameters),
            None => bail!("camera {camera} is not part of this frame"),
        }
    }

    fn try_view_transform(
        &self,
        camera: CameraId,
        coordinate_system: CoordinateSystem,
    ) -> Option<StereoTransform> {
        if !self.parameters.contains_key(&camera) {
            return None;
        }
        if self.tracking.lost.load(Ordering::Acquire) {
            return None;
        }
        if coordinate_system.0 != self.tracking.generation.load(Ordering::Acquire) {
            return None;
        }
        Some(self.views)
    }

    fn present(&mut self) -> PresentResult {
        if !self.frame_wait.is_zero() {
            thread::sleep(self.frame_wait);
        }
        if self.device_removed.swap(false, Ordering::AcqRel) {
            PresentResult::DeviceRemoved
        } else {
            PresentResult::Success
        }
    }
}
