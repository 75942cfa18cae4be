//! Closed-position persistence seam

use crate::domain::record::ClosedPositionRecord;

/// Fire-and-forget persistence of closed positions. Implementations must
/// never block the calling event loop; hand the record off to a background
/// task or channel and return.
pub trait ClosedPositionSink: Send + Sync {
    fn log(&self, record: ClosedPositionRecord);
}
