pub mod camera;
pub mod hmd;
pub mod input;
pub mod presenter;
pub mod space;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{Mat4, Quat, Vec3};
use log::{info, trace, warn};

use crate::backend::common::{BackendError, LeftRight};
use crate::backend::simulator::{SimGpuDevice, SimHolographicSpace, SimParams, SimSources};
use crate::graphics::{Extent2D, GpuDevice, PresentOutcome};
use crate::state::AppState;

use self::hmd::HmdDevice;
use self::presenter::HoloPresenter;
use self::space::HolographicSpace;

/// Hosts the holographic backend: builds the compositor binding, then
/// drives begin/update/end/present until shutdown or the frame limit.
pub fn holographic_run(
    running: Arc<AtomicBool>,
    app: &mut AppState,
    frame_limit: Option<u64>,
) -> Result<(), BackendError> {
    let config = &app.session.config;

    let space = SimHolographicSpace::new(SimParams {
        adapter_id: 1,
        near_plane: config.near_plane,
        far_plane: config.far_plane,
        ipd: config.sim_ipd,
        frame_wait: Duration::from_millis(config.sim_frame_interval_ms),
    });

    // The compositor may require frames to come from a specific adapter.
    let adapter = space.primary_adapter_id();
    let device: Arc<dyn GpuDevice> = Arc::new(SimGpuDevice::new(adapter));

    let presenter = HoloPresenter::new(device.clone(), space.clone() as Arc<dyn HolographicSpace>)?;
    let sources = Arc::new(SimSources::new());
    let mut hmd = HmdDevice::enable(
        device.clone(),
        Box::new(presenter),
        sources,
        config.require_mirror,
    )?;

    // Cameras hot-plug from the compositor's own thread.
    {
        let space = space.clone();
        let count = config.sim_cameras;
        let size = Extent2D::new(config.sim_camera_size[0], config.sim_camera_size[1]);
        let stereo = config.sim_camera_stereo;
        thread::spawn(move || {
            for _ in 0..count {
                if let Err(e) = space.add_camera(size, stereo) {
                    warn!("could not attach camera: {e:?}");
                }
            }
        });
    }

    let near_plane = config.near_plane;
    let far_plane = config.far_plane;
    let mut view = Mat4::IDENTITY;
    let mut projection = Mat4::IDENTITY;
    let mut frame: u64 = 0;

    while running.load(Ordering::Relaxed) {
        if frame_limit.is_some_and(|limit| frame >= limit) {
            break;
        }
        frame += 1;

        // A little head sway so the demo has something to track.
        let t = frame as f32 / 90.0;
        space.set_head_pose(
            Vec3::new(t.sin() * 0.1, 1.6, 0.0),
            Quat::from_rotation_y(t.sin() * 0.2),
        );

        hmd.presenter_mut().begin_draw()?;
        hmd.update();

        for eye in [LeftRight::Left, LeftRight::Right] {
            if hmd.read_eye_parameters(eye, near_plane, far_plane, &mut view, &mut projection) {
                trace!("eye {}: view translation {:?}", eye.index(), view.w_axis);
            }
        }

        hmd.presenter_mut().end_draw()?;

        match hmd.presenter_mut().present()? {
            PresentOutcome::Presented => {}
            PresentOutcome::DeviceLost => {
                warn!("stopping after device loss; the host owns device recreation");
                break;
            }
        }
    }

    // Suspend path: hand cached device memory back before going quiet.
    device.trim();

    info!("presented {frame} frames, hmd state: {}", hmd.state());
    hmd.disable();
    Ok(())
}
