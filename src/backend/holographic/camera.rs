use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::Mat4;
use log::{debug, info};

use crate::backend::common::LeftRight;
use crate::graphics::{
    Extent2D, GpuDevice, TextureDesc, TextureFormat, TextureHandle, TextureUsage, ViewDesc,
    ViewHandle,
};
use crate::math;

use super::space::{
    CameraDescriptor, CameraId, CameraPose, CompositorFrame, CoordinateSystem,
    RenderingParameters, Viewport,
};

/// Buffers and cached transforms for one physical camera.
///
/// The back buffer belongs to the compositor's swap chain; only the views
/// and the depth buffer are ours. The render target view is recreated only
/// when the compositor hands back a different underlying resource, the
/// depth buffer whenever the render target size changes.
pub struct CameraResources {
    id: CameraId,
    is_stereo: bool,
    render_target_size: Extent2D,
    format: TextureFormat,
    back_buffer: Option<TextureHandle>,
    render_target_view: Option<ViewHandle>,
    depth_buffer: Option<TextureHandle>,
    depth_view: Option<ViewHandle>,
    viewport: Viewport,
    near_plane: f32,
    far_plane: f32,
    view: [Mat4; 2],
    projection: [Mat4; 2],
    view_transform_acquired: bool,
}

impl CameraResources {
    pub fn new(camera: &CameraDescriptor) -> Self {
        Self {
            id: camera.id,
            is_stereo: camera.is_stereo,
            render_target_size: camera.render_target_size,
            format: TextureFormat::Rgba8Unorm,
            back_buffer: None,
            render_target_view: None,
            depth_buffer: None,
            depth_view: None,
            viewport: Viewport::ZERO,
            near_plane: 0.0,
            far_plane: 0.0,
            view: [Mat4::IDENTITY; 2],
            projection: [Mat4::IDENTITY; 2],
            view_transform_acquired: false,
        }
    }

    /// Validates this camera's buffers against what the compositor handed
    /// back for the current frame.
    pub fn ensure_back_buffer(
        &mut self,
        device: &Arc<dyn GpuDevice>,
        params: &RenderingParameters,
        target_size: Extent2D,
    ) -> anyhow::Result<()> {
        if self.back_buffer != Some(params.back_buffer) {
            debug!("camera {}: back buffer changed, recreating views", self.id);

            if let Some(view) = self.render_target_view.take() {
                device.destroy_view(view);
            }

            // The compositor moves through its swap chain; the resource can
            // change every frame under certain rendering modes.
            self.back_buffer = Some(params.back_buffer);
            let layers = if self.is_stereo { 2 } else { 1 };
            self.render_target_view =
                Some(device.create_view(params.back_buffer, &ViewDesc::render_target(layers))?);
            self.format = params.format;

            if self.render_target_size != target_size {
                debug!(
                    "camera {}: render target size changed to {}x{}",
                    self.id, target_size.width, target_size.height
                );
                self.render_target_size = target_size;

                // Forces the depth buffer to be rebuilt at the new size.
                if let Some(view) = self.depth_view.take() {
                    device.destroy_view(view);
                }
            }
        }

        if self.depth_view.is_none() {
            debug!("camera {}: recreating depth buffer", self.id);

            if let Some(texture) = self.depth_buffer.take() {
                device.destroy_texture(texture);
            }

            let layers = if self.is_stereo { 2 } else { 1 };
            let desc = TextureDesc {
                extent: self.render_target_size,
                format: TextureFormat::D16Unorm,
                array_layers: layers,
                usage: TextureUsage::DEPTH,
            };
            let depth = device.create_texture(&desc, "camera depth buffer")?;
            self.depth_view = Some(device.create_view(depth, &ViewDesc::depth_stencil(layers))?);
            self.depth_buffer = Some(depth);
        }

        Ok(())
    }

    /// Refreshes the per-frame pose data and resolves the view transform
    /// against the given coordinate system. When the transform cannot be
    /// resolved the acquired flag clears and the stale matrices remain.
    pub fn update_pose(
        &mut self,
        pose: &CameraPose,
        frame: &dyn CompositorFrame,
        coordinate_system: CoordinateSystem,
    ) {
        self.viewport = pose.viewport;
        self.near_plane = pose.near_plane;
        self.far_plane = pose.far_plane;
        self.projection = [
            math::mat4(pose.projection.left),
            math::mat4(pose.projection.right),
        ];

        match frame.try_view_transform(self.id, coordinate_system) {
            Some(transform) => {
                self.view = [math::mat4(transform.left), math::mat4(transform.right)];
                self.view_transform_acquired = true;
            }
            None => {
                debug!("camera {}: view transform not available", self.id);
                self.view_transform_acquired = false;
            }
        }
    }

    /// Drops the acquired flag without touching the matrices. Used when no
    /// reference frame exists, e.g. across a locator swap.
    pub fn invalidate_view_transform(&mut self) {
        self.view_transform_acquired = false;
    }

    /// Releases everything this camera holds on the device. The back buffer
    /// itself is system-owned and only forgotten here; render targets are
    /// unbound and the device flushed so driver-held references drop too.
    pub fn release(&mut self, device: &Arc<dyn GpuDevice>) {
        if let Some(view) = self.render_target_view.take() {
            device.destroy_view(view);
        }
        self.back_buffer = None;

        if let Some(view) = self.depth_view.take() {
            device.destroy_view(view);
        }
        if let Some(texture) = self.depth_buffer.take() {
            device.destroy_texture(texture);
        }

        device.unbind_render_targets();
        device.flush();

        self.view_transform_acquired = false;
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn is_stereo(&self) -> bool {
        self.is_stereo
    }

    pub fn render_target_size(&self) -> Extent2D {
        self.render_target_size
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn back_buffer(&self) -> Option<TextureHandle> {
        self.back_buffer
    }

    pub fn render_target_view(&self) -> Option<ViewHandle> {
        self.render_target_view
    }

    pub fn depth_view(&self) -> Option<ViewHandle> {
        self.depth_view
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn view(&self, eye: LeftRight) -> Mat4 {
        self.view[eye.index()]
    }

    pub fn projection(&self, eye: LeftRight) -> Mat4 {
        self.projection[eye.index()]
    }

    pub fn view_transform_acquired(&self) -> bool {
        self.view_transform_acquired
    }
}

/// The camera resource table. Only ever touched through the presenter's
/// mutex; camera topology changes and the per-frame refresh serialize on it.
pub struct CameraMap {
    cameras: HashMap<CameraId, CameraResources>,
    // Removals that arrived before their deferred insertion completed.
    // Camera ids are never reused, so these only ever suppress one add.
    removed_early: HashSet<CameraId>,
    current: Option<CameraId>,
}

impl CameraMap {
    pub fn new() -> Self {
        Self {
            cameras: HashMap::new(),
            removed_early: HashSet::new(),
            current: None,
        }
    }

    pub fn insert(&mut self, camera: &CameraDescriptor) {
        if self.removed_early.remove(&camera.id) {
            debug!("camera {}: removed before its resources were ready", camera.id);
            return;
        }
        info!(
            "camera {}: {}x{}, stereo: {}, viewport scale: {}, max quad layers: {}",
            camera.id,
            camera.render_target_size.width,
            camera.render_target_size.height,
            camera.is_stereo,
            camera.viewport_scale_factor,
            camera.max_quad_layers
        );
        self.cameras.insert(camera.id, CameraResources::new(camera));

        // First camera in becomes the presentation target.
        if self.current.is_none() {
            self.current = Some(camera.id);
        }
    }

    pub fn remove(&mut self, camera: CameraId, device: &Arc<dyn GpuDevice>) {
        match self.cameras.remove(&camera) {
            Some(mut resources) => resources.release(device),
            None => {
                self.removed_early.insert(camera);
            }
        }
        if self.current == Some(camera) {
            self.current = self.cameras.keys().next().copied();
        }
    }

    pub fn release_all(&mut self, device: &Arc<dyn GpuDevice>) {
        for resources in self.cameras.values_mut() {
            resources.release(device);
        }
        self.cameras.clear();
        self.current = None;
    }

    pub fn get_mut(&mut self, camera: CameraId) -> Option<&mut CameraResources> {
        self.cameras.get_mut(&camera)
    }

    pub fn contains(&self, camera: CameraId) -> bool {
        self.cameras.contains_key(&camera)
    }

    pub fn current(&self) -> Option<CameraId> {
        self.current
    }

    pub fn current_resources(&self) -> Option<&CameraResources> {
        self.current.and_then(|id| self.cameras.get(&id))
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulator::SimGpuDevice;
    use crate::graphics::GpuDevice;

    fn descriptor(id: CameraId) -> CameraDescriptor {
        CameraDescriptor {
            id,
            render_target_size: Extent2D::new(640, 480),
            is_stereo: true,
            viewport_scale_factor: 1.0,
            max_quad_layers: 1,
        }
    }

    fn device() -> Arc<dyn GpuDevice> {
        Arc::new(SimGpuDevice::new(0))
    }

    fn swap_image(device: &Arc<dyn GpuDevice>, extent: Extent2D) -> TextureHandle {
        device
            .create_texture(
                &TextureDesc {
                    extent,
                    format: TextureFormat::Bgra8Unorm,
                    array_layers: 2,
                    usage: TextureUsage::COLOR,
                },
                "test swap image",
            )
            .unwrap()
    }

    #[test]
    fn back_buffer_recreated_only_on_resource_change() {
        let device = device();
        let mut resources = CameraResources::new(&descriptor(1));
        let extent = Extent2D::new(640, 480);
        let image_a = swap_image(&device, extent);
        let image_b = swap_image(&device, extent);

        let params_a = RenderingParameters {
            back_buffer: image_a,
            format: TextureFormat::Bgra8Unorm,
        };
        resources.ensure_back_buffer(&device, &params_a, extent).unwrap();
        let first_view = resources.render_target_view().unwrap();
        let first_depth = resources.depth_view().unwrap();

        // Same resource again: nothing is recreated.
        resources.ensure_back_buffer(&device, &params_a, extent).unwrap();
        assert_eq!(resources.render_target_view(), Some(first_view));
        assert_eq!(resources.depth_view(), Some(first_depth));

        // Next swap chain image: new render target view, same depth buffer.
        let params_b = RenderingParameters {
            back_buffer: image_b,
            format: TextureFormat::Bgra8Unorm,
        };
        resources.ensure_back_buffer(&device, &params_b, extent).unwrap();
        assert_ne!(resources.render_target_view(), Some(first_view));
        assert_eq!(resources.depth_view(), Some(first_depth));
    }

    #[test]
    fn depth_buffer_recreated_on_size_change() {
        let device = device();
        let mut resources = CameraResources::new(&descriptor(1));
        let image_a = swap_image(&device, Extent2D::new(640, 480));
        resources
            .ensure_back_buffer(
                &device,
                &RenderingParameters {
                    back_buffer: image_a,
                    format: TextureFormat::Bgra8Unorm,
                },
                Extent2D::new(640, 480),
            )
            .unwrap();
        let first_depth = resources.depth_view().unwrap();

        let larger = Extent2D::new(800, 600);
        let image_b = swap_image(&device, larger);
        resources
            .ensure_back_buffer(
                &device,
                &RenderingParameters {
                    back_buffer: image_b,
                    format: TextureFormat::Bgra8Unorm,
                },
                larger,
            )
            .unwrap();
        assert_ne!(resources.depth_view(), Some(first_depth));
        assert_eq!(resources.render_target_size(), larger);
    }

    #[test]
    fn removal_before_deferred_insert_suppresses_the_add() {
        let device = device();
        let mut map = CameraMap::new();

        // Removal raced ahead of the deferred insertion.
        map.remove(5, &device);
        map.insert(&descriptor(5));
        assert!(!map.contains(5));
        assert_eq!(map.current(), None);

        // A later, distinct camera is unaffected.
        map.insert(&descriptor(6));
        assert!(map.contains(6));
        assert_eq!(map.current(), Some(6));
    }

    #[test]
    fn removal_reelects_the_active_camera() {
        let device = device();
        let mut map = CameraMap::new();
        map.insert(&descriptor(1));
        map.insert(&descriptor(2));
        assert_eq!(map.current(), Some(1));

        map.remove(1, &device);
        assert_eq!(map.current(), Some(2));
        assert!(!map.contains(1));

        map.remove(2, &device);
        assert_eq!(map.current(), None);
        assert!(map.is_empty());
    }
}
