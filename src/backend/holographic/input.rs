use crate::backend::common::LeftRight;
use crate::backend::input::{SourceLocation, SourceState};

use super::space::{CoordinateSystem, Timestamp};

/// Per-hand spatial interaction sources (motion controllers). Another
/// system-owned seam: state snapshots are polled at a prediction timestamp
/// and poses resolve against a caller-supplied coordinate system.
pub trait InteractionSource: Send + Sync {
    /// Latest raw state for one hand, with the source pose resolved against
    /// `coordinate_system` where the tracking system managed to. None while
    /// no source is detected for that hand.
    fn state_for(
        &self,
        hand: LeftRight,
        timestamp: Timestamp,
        coordinate_system: CoordinateSystem,
    ) -> Option<(SourceState, Option<SourceLocation>)>;
}
