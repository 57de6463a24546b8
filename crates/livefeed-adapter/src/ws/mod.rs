/*
[INPUT]:  Stream URL, room subscriptions and listener registrations
[OUTPUT]: Real-time depth/trade/ticker payloads delivered to listeners
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new payload kinds or changing connection logic
*/

pub mod message;
pub mod registry;
pub mod router;
pub mod session;
pub mod stream;

pub use message::{ControlType, Envelope, PayloadError, PendingMessage};
pub use registry::{Listener, ListenerHandle, RoomSnapshot, SubscriptionRegistry};
pub use router::{EnvelopeRouter, RouteOutcome, RouterStats};
pub use session::{
    DEFAULT_STREAM_URL, FrameHandler, SendOutcome, SessionEvent, SessionState, TransportSession,
};
pub use stream::MarketStream;
