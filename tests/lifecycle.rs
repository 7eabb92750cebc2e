use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::{Mat4, Quat, Vec3};

use hololink::backend::common::LeftRight;
use hololink::backend::holographic::hmd::HmdDevice;
use hololink::backend::holographic::presenter::HoloPresenter;
use hololink::backend::holographic::space::HolographicSpace;
use hololink::backend::input::{DeviceState, SourceState};
use hololink::backend::simulator::{SimGpuDevice, SimHolographicSpace, SimParams, SimSources};
use hololink::graphics::{Extent2D, GpuDevice, PresentOutcome, Presenter};

const CAMERA_SIZE: Extent2D = Extent2D {
    width: 640,
    height: 480,
};

fn setup() -> (Arc<SimGpuDevice>, Arc<SimHolographicSpace>, HoloPresenter) {
    let space = SimHolographicSpace::new(SimParams::default());
    let device = Arc::new(SimGpuDevice::new(space.primary_adapter_id()));
    let gpu: Arc<dyn GpuDevice> = device.clone();
    let holo: Arc<dyn HolographicSpace> = space.clone();
    let presenter = HoloPresenter::new(gpu, holo).unwrap();
    (device, space, presenter)
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// One full frame. The camera-added deferral guarantees resources exist for
/// every camera in the prediction.
fn run_frame(presenter: &mut HoloPresenter) -> PresentOutcome {
    presenter.begin_draw().unwrap();
    presenter.end_draw().unwrap();
    presenter.present().unwrap()
}

#[test]
fn camera_becomes_visible_after_deferral() {
    let (_device, space, mut presenter) = setup();

    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("camera resources", || presenter.has_camera(camera));
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    assert_eq!(presenter.active_camera(), Some(camera));
    assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);

    // Engine back buffer is allocated side by side at twice the camera width.
    let back_buffer = presenter.back_buffer().expect("back buffer after frame");
    assert_eq!(
        back_buffer.extent(),
        Extent2D::new(CAMERA_SIZE.width * 2, CAMERA_SIZE.height)
    );
}

#[test]
fn end_draw_copies_both_eyes() {
    let (device, space, mut presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("camera resources", || presenter.has_camera(camera));
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    presenter.begin_draw().unwrap();
    presenter.end_draw().unwrap();

    // Left half into layer 0, right half into layer 1.
    assert_eq!(device.copy_count(), 2);
    presenter.present().unwrap();
}

#[test]
fn removed_camera_leaves_no_entry() {
    let (_device, space, mut presenter) = setup();

    let first = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("first camera", || presenter.has_camera(first));
    let second = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("second camera", || presenter.has_camera(second));
    assert_eq!(presenter.active_camera(), Some(first));

    space.remove_camera(first);
    assert!(!presenter.has_camera(first));

    // Presentation re-elects a surviving camera.
    assert_eq!(presenter.active_camera(), Some(second));
    wait_until("deferral completion", || space.ready_camera_count() == 1);
    assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);

    space.remove_camera(second);
    assert_eq!(presenter.active_camera(), None);
    assert_eq!(presenter.camera_count(), 0);
}

#[test]
fn device_loss_releases_everything() {
    let (device, space, mut presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("camera resources", || presenter.has_camera(camera));
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);

    space.trigger_device_removed();
    assert_eq!(run_frame(&mut presenter), PresentOutcome::DeviceLost);

    assert!(presenter.is_device_lost());
    assert_eq!(presenter.camera_count(), 0);
    assert_eq!(presenter.active_camera(), None);
    assert!(presenter.back_buffer().is_none());

    // Depth buffers, views and the engine texture are gone; only the
    // compositor's own swap chain images survive on the device.
    assert_eq!(device.live_view_count(), 0);
    assert_eq!(device.live_texture_count(), 2);
}

#[test]
fn resize_reinitializes_back_buffer_children() {
    let (device, space, mut presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("camera resources", || presenter.has_camera(camera));
    wait_until("deferral completion", || space.ready_camera_count() == 1);
    assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);

    let (old_parent, old_children) = {
        let back_buffer = presenter.back_buffer().unwrap();
        (
            back_buffer.handle(),
            back_buffer
                .children()
                .iter()
                .map(|child| child.view)
                .collect::<Vec<_>>(),
        )
    };

    let larger = Extent2D::new(800, 600);
    space.resize_camera(camera, larger).unwrap();
    assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);

    let back_buffer = presenter.back_buffer().unwrap();
    assert_eq!(
        back_buffer.extent(),
        Extent2D::new(larger.width * 2, larger.height)
    );
    assert_ne!(back_buffer.handle(), old_parent);
    assert!(!device.texture_alive(old_parent));

    // Children were re-initialized against the resized parent.
    assert_eq!(back_buffer.children().len(), old_children.len());
    for child in back_buffer.children() {
        assert!(device.view_alive(child.view));
        assert_eq!(device.view_parent(child.view), Some(back_buffer.handle()));
    }
    for old_child in old_children {
        assert!(!device.view_alive(old_child));
    }
}

#[test]
fn eye_parameters_stay_untouched_without_tracking() {
    let (device, space, presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();

    let gpu: Arc<dyn GpuDevice> = device.clone();
    let sources = Arc::new(SimSources::new());
    let mut hmd = HmdDevice::enable(gpu, Box::new(presenter), sources, false).unwrap();

    wait_until("camera resources", || {
        hmd.presenter().has_camera(camera)
    });
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    space.set_head_pose(Vec3::new(0.0, 1.6, 0.0), Quat::IDENTITY);

    hmd.presenter_mut().begin_draw().unwrap();
    hmd.update();
    assert_eq!(hmd.state(), DeviceState::Valid);
    assert_eq!(hmd.head_position(), Vec3::new(0.0, 1.6, 0.0));

    let sentinel = Mat4::from_scale(Vec3::splat(7.0));
    let mut view = sentinel;
    let mut projection = sentinel;
    assert!(hmd.read_eye_parameters(LeftRight::Left, 0.05, 100.0, &mut view, &mut projection));
    assert_ne!(view, sentinel);
    hmd.presenter_mut().end_draw().unwrap();
    hmd.presenter_mut().present().unwrap();

    // Tracking drops out: state goes out of range, outputs stay whatever the
    // caller put in, and the head pose falls back to identity/zero.
    space.set_tracking_lost(true);
    hmd.presenter_mut().begin_draw().unwrap();
    hmd.update();
    assert_eq!(hmd.state(), DeviceState::OutOfRange);
    assert_eq!(hmd.head_position(), Vec3::ZERO);
    assert_eq!(hmd.head_rotation(), Quat::IDENTITY);

    let mut view = sentinel;
    let mut projection = sentinel;
    assert!(!hmd.read_eye_parameters(LeftRight::Left, 0.05, 100.0, &mut view, &mut projection));
    assert_eq!(view, sentinel);
    assert_eq!(projection, sentinel);
    hmd.presenter_mut().end_draw().unwrap();
    hmd.presenter_mut().present().unwrap();

    // And back.
    space.set_tracking_lost(false);
    hmd.presenter_mut().begin_draw().unwrap();
    hmd.update();
    assert_eq!(hmd.state(), DeviceState::Valid);
}

#[test]
fn locator_teardown_invalidates_view_transforms() {
    let (_device, space, mut presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();
    wait_until("camera resources", || presenter.has_camera(camera));
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    presenter.begin_draw().unwrap();
    assert!(presenter.try_get_camera_pose(LeftRight::Left).is_some());
    presenter.end_draw().unwrap();
    presenter.present().unwrap();

    space.clear_locator();
    presenter.begin_draw().unwrap();
    assert!(presenter.try_get_camera_pose(LeftRight::Left).is_none());
    assert!(presenter.try_update_spatial_location().is_none());
    presenter.end_draw().unwrap();
    presenter.present().unwrap();

    // A replacement locator brings a fresh reference frame.
    space.swap_locator();
    presenter.begin_draw().unwrap();
    assert!(presenter.try_get_camera_pose(LeftRight::Left).is_some());
    presenter.end_draw().unwrap();
    presenter.present().unwrap();
}

#[test]
fn controller_state_needs_two_updates() {
    let (device, space, presenter) = setup();
    let camera = space.add_camera(CAMERA_SIZE, true).unwrap();

    let gpu: Arc<dyn GpuDevice> = device.clone();
    let sources = Arc::new(SimSources::new());
    let mut hmd =
        HmdDevice::enable(gpu, Box::new(presenter), sources.clone(), false).unwrap();

    wait_until("camera resources", || {
        hmd.presenter().has_camera(camera)
    });
    wait_until("deferral completion", || space.ready_camera_count() == 1);

    sources.set_state(
        LeftRight::Left,
        SourceState {
            select_pressed: true,
            select_value: 1.0,
            ..Default::default()
        },
        None,
    );

    hmd.presenter_mut().begin_draw().unwrap();
    hmd.update();
    assert_eq!(hmd.left_hand().state(), DeviceState::Invalid);
    assert!(!hmd
        .left_hand()
        .is_pressed_down(hololink::backend::input::TouchButton::Trigger));
    hmd.presenter_mut().end_draw().unwrap();
    hmd.presenter_mut().present().unwrap();

    hmd.presenter_mut().begin_draw().unwrap();
    hmd.update();
    assert_eq!(hmd.left_hand().state(), DeviceState::Valid);
    // Held since before the previous update: no edge.
    assert!(!hmd
        .left_hand()
        .is_pressed_down(hololink::backend::input::TouchButton::Trigger));
    assert!(hmd
        .left_hand()
        .is_pressed(hololink::backend::input::TouchButton::Trigger));
    hmd.presenter_mut().end_draw().unwrap();
    hmd.presenter_mut().present().unwrap();
}

#[test]
fn wrong_presenter_type_fails_enable() {
    struct OtherPresenter;
    impl Presenter for OtherPresenter {
        fn begin_draw(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn end_draw(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn present(&mut self) -> anyhow::Result<PresentOutcome> {
            Ok(PresentOutcome::Presented)
        }
        fn back_buffer(&self) -> Option<&hololink::graphics::StereoTexture> {
            None
        }
        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }

    let device = Arc::new(SimGpuDevice::new(0));
    let gpu: Arc<dyn GpuDevice> = device;
    let sources = Arc::new(SimSources::new());
    let result = HmdDevice::enable(gpu, Box::new(OtherPresenter), sources, false);
    assert!(matches!(
        result,
        Err(hololink::backend::common::BackendError::PresenterRequired)
    ));
}

#[test]
fn concurrent_topology_changes_keep_the_table_consistent() {
    let (_device, space, mut presenter) = setup();

    let adders: Vec<_> = (0..4)
        .map(|_| {
            let space = space.clone();
            thread::spawn(move || space.add_camera(CAMERA_SIZE, true).unwrap())
        })
        .collect();

    // Frames keep running while cameras attach from other threads.
    for _ in 0..50 {
        assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);
    }

    let ids: Vec<_> = adders.into_iter().map(|t| t.join().unwrap()).collect();
    wait_until("all cameras attached", || presenter.camera_count() == 4);
    wait_until("all deferrals completed", || {
        space.ready_camera_count() == 4
    });

    for &id in &ids[..3] {
        space.remove_camera(id);
    }
    for _ in 0..10 {
        assert_eq!(run_frame(&mut presenter), PresentOutcome::Presented);
    }

    assert_eq!(presenter.camera_count(), 1);
    assert!(presenter.has_camera(ids[3]));
    for &id in &ids[..3] {
        assert!(!presenter.has_camera(id));
    }
    assert_eq!(presenter.active_camera(), Some(ids[3]));
}
