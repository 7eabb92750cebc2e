use glam::{Quat, Vec2, Vec3};
use strum::Display;

use crate::backend::common::LeftRight;
use crate::math;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DeviceState {
    Invalid,
    Valid,
    OutOfRange,
}

/// Raw per-frame snapshot of one spatial interaction source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceState {
    pub select_pressed: bool,
    pub select_value: f32,
    pub grasped: bool,
    pub menu_pressed: bool,
    pub thumbstick_pressed: bool,
    pub thumbstick: Vec2,
    pub touchpad_pressed: bool,
    pub touchpad_touched: bool,
    pub touchpad: Vec2,
}

/// Resolved source pose. The tracking system may only know some of the
/// fields for a given frame; unknown fields leave the previous value alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceLocation {
    pub position: Option<mint::Vector3<f32>>,
    pub orientation: Option<mint::Quaternion<f32>>,
    pub velocity: Option<mint::Vector3<f32>>,
    pub angular_velocity: Option<mint::Vector3<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchButton {
    Thumbstick,
    Touchpad,
    A,
    B,
    X,
    Y,
    Trigger,
    Grip,
    Menu,
}

/// One hand's controller. Keeps the current and previous raw snapshot so
/// press/touch transitions can be answered without the caller keeping
/// history. Edges are only valid once both snapshots exist; the very first
/// update reports an invalid device and no transitions.
pub struct TouchController {
    hand: LeftRight,
    position: Vec3,
    rotation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    now: Option<SourceState>,
    before: Option<SourceState>,
    state: DeviceState,
}

impl TouchController {
    pub fn new(hand: LeftRight) -> Self {
        Self {
            hand,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            now: None,
            before: None,
            state: DeviceState::Invalid,
        }
    }

    pub fn update(&mut self, state: SourceState, location: Option<SourceLocation>) {
        if let Some(location) = location {
            self.apply_location(location);
        }

        self.before = self.now;
        self.now = Some(state);

        self.state = if self.before.is_some() {
            DeviceState::Valid
        } else {
            DeviceState::Invalid
        };
    }

    fn apply_location(&mut self, location: SourceLocation) {
        if let Some(position) = location.position {
            self.position = math::vec3(position);
        }
        if let Some(orientation) = location.orientation {
            self.rotation = math::quat(orientation);
        }
        if let Some(velocity) = location.velocity {
            self.linear_velocity = math::vec3(velocity);
        }
        if let Some(angular_velocity) = location.angular_velocity {
            self.angular_velocity = math::vec3(angular_velocity);
        }
    }

    pub fn hand(&self) -> LeftRight {
        self.hand
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn trigger(&self) -> f32 {
        self.now.map_or(0.0, |s| s.select_value)
    }

    pub fn grip(&self) -> f32 {
        match self.now {
            Some(s) if s.grasped => 1.0,
            _ => 0.0,
        }
    }

    pub fn thumb_axis(&self) -> Vec2 {
        self.now.map_or(Vec2::ZERO, |s| s.touchpad)
    }

    pub fn thumbstick_axis(&self) -> Vec2 {
        self.now.map_or(Vec2::ZERO, |s| s.thumbstick)
    }

    pub fn index_pointing(&self) -> bool {
        false
    }

    pub fn index_resting(&self) -> bool {
        true
    }

    pub fn thumb_up(&self) -> bool {
        !self.now.is_some_and(|s| s.touchpad_touched)
    }

    pub fn thumb_resting(&self) -> bool {
        self.now.is_some_and(|s| s.touchpad_touched)
    }

    pub fn is_pressed(&self, button: TouchButton) -> bool {
        self.now
            .is_some_and(|s| button_pressed(self.hand, button, &s))
    }

    pub fn is_pressed_down(&self, button: TouchButton) -> bool {
        match (&self.before, &self.now) {
            (Some(before), Some(now)) => {
                !button_pressed(self.hand, button, before) && button_pressed(self.hand, button, now)
            }
            _ => false,
        }
    }

    pub fn is_press_released(&self, button: TouchButton) -> bool {
        match (&self.before, &self.now) {
            (Some(before), Some(now)) => {
                button_pressed(self.hand, button, before) && !button_pressed(self.hand, button, now)
            }
            _ => false,
        }
    }

    pub fn is_touched(&self, button: TouchButton) -> bool {
        self.now
            .is_some_and(|s| button_touched(self.hand, button, &s))
    }

    pub fn is_touched_down(&self, button: TouchButton) -> bool {
        match (&self.before, &self.now) {
            (Some(before), Some(now)) => {
                !button_touched(self.hand, button, before) && button_touched(self.hand, button, now)
            }
            _ => false,
        }
    }

    pub fn is_touch_released(&self, button: TouchButton) -> bool {
        match (&self.before, &self.now) {
            (Some(before), Some(now)) => {
                button_touched(self.hand, button, before) && !button_touched(self.hand, button, now)
            }
            _ => false,
        }
    }
}

// A/B sit on the right touchpad, X/Y on the left one; the pad half decides
// which of the pair is meant.
fn button_pressed(hand: LeftRight, button: TouchButton, state: &SourceState) -> bool {
    match button {
        TouchButton::Thumbstick => state.thumbstick_pressed,
        TouchButton::Touchpad => state.touchpad_pressed,
        TouchButton::A if state.touchpad_pressed && hand == LeftRight::Right => {
            state.touchpad.x >= 0.0
        }
        TouchButton::B if state.touchpad_pressed && hand == LeftRight::Right => {
            state.touchpad.x < 0.0
        }
        TouchButton::X if state.touchpad_pressed && hand == LeftRight::Left => {
            state.touchpad.x < 0.0
        }
        TouchButton::Y if state.touchpad_pressed && hand == LeftRight::Left => {
            state.touchpad.x >= 0.0
        }
        TouchButton::Trigger => state.select_pressed,
        TouchButton::Grip => state.grasped,
        TouchButton::Menu => state.menu_pressed,
        _ => false,
    }
}

fn button_touched(hand: LeftRight, button: TouchButton, state: &SourceState) -> bool {
    match button {
        TouchButton::Touchpad => state.touchpad_touched,
        TouchButton::A if state.touchpad_pressed && hand == LeftRight::Right => {
            state.touchpad.x >= 0.0
        }
        TouchButton::B if state.touchpad_pressed && hand == LeftRight::Right => {
            state.touchpad.x < 0.0
        }
        TouchButton::X if state.touchpad_pressed && hand == LeftRight::Left => {
            state.touchpad.x < 0.0
        }
        TouchButton::Y if state.touchpad_pressed && hand == LeftRight::Left => {
            state.touchpad.x >= 0.0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pressed_trigger() -> SourceState {
        SourceState {
            select_pressed: true,
            select_value: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn first_update_reports_invalid_and_no_edges() {
        let mut controller = TouchController::new(LeftRight::Right);
        assert_eq!(controller.state(), DeviceState::Invalid);

        controller.update(pressed_trigger(), None);
        assert_eq!(controller.state(), DeviceState::Invalid);
        assert!(controller.is_pressed(TouchButton::Trigger));
        assert!(!controller.is_pressed_down(TouchButton::Trigger));
        assert!(!controller.is_press_released(TouchButton::Trigger));
    }

    #[test]
    fn edges_require_both_snapshots() {
        let mut controller = TouchController::new(LeftRight::Right);
        controller.update(SourceState::default(), None);
        controller.update(pressed_trigger(), None);

        assert_eq!(controller.state(), DeviceState::Valid);
        assert!(controller.is_pressed_down(TouchButton::Trigger));
        assert!(!controller.is_press_released(TouchButton::Trigger));

        controller.update(SourceState::default(), None);
        assert!(controller.is_press_released(TouchButton::Trigger));
        assert!(!controller.is_pressed_down(TouchButton::Trigger));
    }

    #[test]
    fn touchpad_halves_map_to_face_buttons() {
        let state = SourceState {
            touchpad_pressed: true,
            touchpad: Vec2::new(0.5, 0.0),
            ..Default::default()
        };

        let mut right = TouchController::new(LeftRight::Right);
        right.update(SourceState::default(), None);
        right.update(state, None);
        assert!(right.is_pressed(TouchButton::A));
        assert!(!right.is_pressed(TouchButton::B));
        assert!(right.is_pressed_down(TouchButton::A));

        let mut left = TouchController::new(LeftRight::Left);
        left.update(SourceState::default(), None);
        left.update(state, None);
        assert!(left.is_pressed(TouchButton::Y));
        assert!(!left.is_pressed(TouchButton::X));
    }

    #[test]
    fn unresolved_location_keeps_previous_pose() {
        let mut controller = TouchController::new(LeftRight::Left);
        let location = SourceLocation {
            position: Some(mint::Vector3 {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            }),
            ..Default::default()
        };
        controller.update(SourceState::default(), Some(location));
        assert_eq!(controller.position(), Vec3::new(1.0, 2.0, 3.0));

        // Tracking dropout: no location resolved this frame.
        controller.update(SourceState::default(), None);
        assert_eq!(controller.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(controller.rotation(), Quat::IDENTITY);

        // Partially resolved: only orientation known.
        let partial = SourceLocation {
            orientation: Some(mint::Quaternion {
                v: mint::Vector3 {
                    x: 0.0,
                    y: 1.0,
                    z: 0.0,
                },
                s: 0.0,
            }),
            ..Default::default()
        };
        controller.update(SourceState::default(), Some(partial));
        assert_eq!(controller.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(controller.rotation() != Quat::IDENTITY);
    }
}
