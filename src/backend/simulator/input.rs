use std::sync::Mutex;

use crate::backend::common::LeftRight;
use crate::backend::holographic::input::InteractionSource;
use crate::backend::holographic::space::{CoordinateSystem, Timestamp};
use crate::backend::input::{SourceLocation, SourceState};

/// Scripted motion controllers. A hand without a scripted state is treated
/// as switched off.
pub struct SimSources {
    hands: Mutex<[Option<(SourceState, Option<SourceLocation>)>; 2]>,
}

impl SimSources {
    pub fn new() -> Self {
        Self {
            hands: Mutex::new([None, None]),
        }
    }

    pub fn set_state(
        &self,
        hand: LeftRight,
        state: SourceState,
        location: Option<SourceLocation>,
    ) {
        self.hands.lock().unwrap()[hand.index()] = Some((state, location));
    }

    pub fn clear(&self, hand: LeftRight) {
        self.hands.lock().unwrap()[hand.index()] = None;
    }
}

impl Default for SimSources {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionSource for SimSources {
    fn state_for(
        &self,
        hand: LeftRight,
        _timestamp: Timestamp,
        _coordinate_system: CoordinateSystem,
    ) -> Option<(SourceState, Option<SourceLocation>)> {
        self.hands.lock().unwrap()[hand.index()]
    }
}
