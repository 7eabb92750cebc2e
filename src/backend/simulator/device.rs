use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, ensure, Result};
use log::trace;

use crate::backend::holographic::space::AdapterId;
use crate::graphics::{
    GpuDevice, Region, TextureDesc, TextureHandle, ViewDesc, ViewHandle,
};

struct CopyRecord {
    src: TextureHandle,
    dst: TextureHandle,
    dst_layer: u32,
    region: Region,
}

#[derive(Default)]
struct DeviceTables {
    next_id: u64,
    textures: HashMap<TextureHandle, TextureDesc>,
    views: HashMap<ViewHandle, (TextureHandle, ViewDesc)>,
    copies: Vec<CopyRecord>,
}

/// Software stand-in for the native graphics device. Tracks live textures
/// and views, validates copies and keeps enough bookkeeping for tests to
/// check resource lifetimes.
pub struct SimGpuDevice {
    adapter_id: AdapterId,
    tables: Mutex<DeviceTables>,
    flushes: AtomicUsize,
    unbinds: AtomicUsize,
    trims: AtomicUsize,
}

impl SimGpuDevice {
    pub fn new(adapter_id: AdapterId) -> Self {
        Self {
            adapter_id,
            tables: Mutex::new(DeviceTables::default()),
            flushes: AtomicUsize::new(0),
            unbinds: AtomicUsize::new(0),
            trims: AtomicUsize::new(0),
        }
    }

    pub fn adapter_id(&self) -> AdapterId {
        self.adapter_id
    }

    pub fn texture_alive(&self, texture: TextureHandle) -> bool {
        self.tables.lock().unwrap().textures.contains_key(&texture)
    }

    pub fn view_alive(&self, view: ViewHandle) -> bool {
        self.tables.lock().unwrap().views.contains_key(&view)
    }

    pub fn view_parent(&self, view: ViewHandle) -> Option<TextureHandle> {
        self.tables
            .lock()
            .unwrap()
            .views
            .get(&view)
            .map(|(parent, _)| *parent)
    }

    pub fn live_texture_count(&self) -> usize {
        self.tables.lock().unwrap().textures.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.tables.lock().unwrap().views.len()
    }

    pub fn copy_count(&self) -> usize {
        self.tables.lock().unwrap().copies.len()
    }

    /// Every copy recorded against `dst`, as (source, destination layer,
    /// source region) triples.
    pub fn copies_into(&self, dst: TextureHandle) -> Vec<(TextureHandle, u32, Region)> {
        self.tables
            .lock()
            .unwrap()
            .copies
            .iter()
            .filter(|copy| copy.dst == dst)
            .map(|copy| (copy.src, copy.dst_layer, copy.region))
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn unbind_count(&self) -> usize {
        self.unbinds.load(Ordering::Relaxed)
    }

    pub fn trim_count(&self) -> usize {
        self.trims.load(Ordering::Relaxed)
    }
}

impl GpuDevice for SimGpuDevice {
    fn create_texture(&self, desc: &TextureDesc, label: &str) -> Result<TextureHandle> {
        ensure!(
            desc.extent.width > 0 && desc.extent.height > 0,
            "zero-sized texture: {label}"
        );
        ensure!(desc.array_layers > 0, "texture without layers: {label}");

        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let handle = TextureHandle(tables.next_id);
        tables.textures.insert(handle, *desc);
        trace!(
            "created texture {:?} ({}x{}, {} layers): {label}",
            handle,
            desc.extent.width,
            desc.extent.height,
            desc.array_layers
        );
        Ok(handle)
    }

    fn create_view(&self, texture: TextureHandle, desc: &ViewDesc) -> Result<ViewHandle> {
        let mut tables = self.tables.lock().unwrap();
        let Some(texture_desc) = tables.textures.get(&texture).copied() else {
            bail!("view of unknown texture {texture:?}");
        };
        ensure!(
            desc.first_layer + desc.layer_count <= texture_desc.array_layers,
            "view layers out of range for {texture:?}"
        );

        tables.next_id += 1;
        let handle = ViewHandle(tables.next_id);
        tables.views.insert(handle, (texture, *desc));
        Ok(handle)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.tables.lock().unwrap().textures.remove(&texture);
    }

    fn destroy_view(&self, view: ViewHandle) {
        self.tables.lock().unwrap().views.remove(&view);
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.tables.lock().unwrap().textures.get(&texture).copied()
    }

    fn copy_region(
        &self,
        src: TextureHandle,
        region: Region,
        dst: TextureHandle,
        dst_layer: u32,
    ) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let Some(src_desc) = tables.textures.get(&src).copied() else {
            bail!("copy from unknown texture {src:?}");
        };
        let Some(dst_desc) = tables.textures.get(&dst).copied() else {
            bail!("copy into unknown texture {dst:?}");
        };
        ensure!(dst_layer < dst_desc.array_layers, "copy layer out of range");
        ensure!(
            region.x + region.width <= src_desc.extent.width
                && region.y + region.height <= src_desc.extent.height,
            "copy region outside source"
        );
        ensure!(
            region.width <= dst_desc.extent.width && region.height <= dst_desc.extent.height,
            "copy region larger than destination"
        );

        tables.copies.push(CopyRecord {
            src,
            dst,
            dst_layer,
            region,
        });
        Ok(())
    }

    fn unbind_render_targets(&self) {
        self.unbinds.fetch_add(1, Ordering::Relaxed);
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn trim(&self) {
        self.trims.fetch_add(1, Ordering::Relaxed);
    }
}
