//! Real-time event fan-out to connected viewers
//!
//! The core only produces structured [`Event`]s; wire framing belongs to
//! the transport (see [`Event::sse_frame`]).

mod broadcaster;
mod event;

pub use broadcaster::{ConnectionState, EventBroadcaster, Subscription};
pub use event::{ConnectionId, Event, EventKind, unix_timestamp};
