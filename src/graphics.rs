use std::any::Any;
use std::sync::Arc;

use anyhow::Result;

/// Opaque handle to a native 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a render-target/depth/shader view of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    D16Unorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureUsage {
    pub render_target: bool,
    pub depth_stencil: bool,
    pub shader_resource: bool,
}

impl TextureUsage {
    pub const COLOR: Self = Self {
        render_target: true,
        depth_stencil: false,
        shader_resource: true,
    };
    pub const DEPTH: Self = Self {
        render_target: false,
        depth_stencil: true,
        shader_resource: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub array_layers: u32,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    RenderTarget,
    DepthStencil,
    ShaderResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDesc {
    pub kind: ViewKind,
    pub first_layer: u32,
    pub layer_count: u32,
}

impl ViewDesc {
    pub const fn render_target(layer_count: u32) -> Self {
        Self {
            kind: ViewKind::RenderTarget,
            first_layer: 0,
            layer_count,
        }
    }

    pub const fn depth_stencil(layer_count: u32) -> Self {
        Self {
            kind: ViewKind::DepthStencil,
            first_layer: 0,
            layer_count,
        }
    }

    pub const fn shader_resource(layer_count: u32) -> Self {
        Self {
            kind: ViewKind::ShaderResource,
            first_layer: 0,
            layer_count,
        }
    }
}

/// Source rectangle of a sub-resource copy, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The native graphics device. Presentation only needs texture and view
/// creation plus region copies; everything else stays on the engine side
/// of this seam.
pub trait GpuDevice: Send + Sync {
    fn create_texture(&self, desc: &TextureDesc, label: &str) -> Result<TextureHandle>;
    fn create_view(&self, texture: TextureHandle, desc: &ViewDesc) -> Result<ViewHandle>;
    fn destroy_texture(&self, texture: TextureHandle);
    fn destroy_view(&self, view: ViewHandle);
    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc>;

    /// Copies `region` of `src` into array layer `dst_layer` of `dst`,
    /// at the destination origin.
    fn copy_region(
        &self,
        src: TextureHandle,
        region: Region,
        dst: TextureHandle,
        dst_layer: u32,
    ) -> Result<()>;

    /// Detaches all render targets from the pipeline so buffer references
    /// held by the driver can be dropped.
    fn unbind_render_targets(&self);
    fn flush(&self);

    /// Releases cached device memory (suspend path).
    fn trim(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The device backing the compositor was lost. Per-camera resources are
    /// already torn down; the host owns recreation.
    DeviceLost,
}

/// Engine-facing per-frame presentation surface.
pub trait Presenter: Send {
    fn begin_draw(&mut self) -> Result<()>;
    fn end_draw(&mut self) -> Result<()>;
    fn present(&mut self) -> Result<PresentOutcome>;
    fn back_buffer(&self) -> Option<&StereoTexture>;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

pub struct ChildView {
    pub view: ViewHandle,
    pub desc: ViewDesc,
}

/// The engine-visible side-by-side stereo back buffer. Child views survive a
/// resize: they are destroyed with the old texture and re-initialized
/// against the resized parent, keeping their view descriptions.
pub struct StereoTexture {
    handle: TextureHandle,
    desc: TextureDesc,
    children: Vec<ChildView>,
}

impl StereoTexture {
    pub fn new(device: &Arc<dyn GpuDevice>, extent: Extent2D, format: TextureFormat) -> Result<Self> {
        let desc = TextureDesc {
            extent,
            format,
            array_layers: 1,
            usage: TextureUsage::COLOR,
        };
        let handle = device.create_texture(&desc, "stereo back buffer")?;
        let children = vec![
            ChildView {
                view: device.create_view(handle, &ViewDesc::render_target(1))?,
                desc: ViewDesc::render_target(1),
            },
            ChildView {
                view: device.create_view(handle, &ViewDesc::shader_resource(1))?,
                desc: ViewDesc::shader_resource(1),
            },
        ];
        Ok(Self {
            handle,
            desc,
            children,
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn extent(&self) -> Extent2D {
        self.desc.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn children(&self) -> &[ChildView] {
        &self.children
    }

    pub fn resize(
        &mut self,
        device: &Arc<dyn GpuDevice>,
        extent: Extent2D,
        format: TextureFormat,
    ) -> Result<()> {
        for child in &self.children {
            device.destroy_view(child.view);
        }
        device.destroy_texture(self.handle);

        self.desc.extent = extent;
        self.desc.format = format;
        self.handle = device.create_texture(&self.desc, "stereo back buffer")?;
        for child in &mut self.children {
            child.view = device.create_view(self.handle, &child.desc)?;
        }
        Ok(())
    }

    pub fn release(self, device: &Arc<dyn GpuDevice>) {
        for child in &self.children {
            device.destroy_view(child.view);
        }
        device.destroy_texture(self.handle);
    }
}
