/// Diagnostic events published by a session.
///
/// Subscribers only see events sent after they subscribed; a subscriber that
/// falls more than the configured capacity behind loses the oldest events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session started its receive loop.
    Connected { transport: &'static str },
    /// The receive loop ended.
    Disconnected { reason: String },
    /// An incoming message matched no pending request, or only one of a
    /// different kind.
    Unsolicited {
        op: &'static str,
        id: Option<String>,
        topic: Option<String>,
    },
    /// A response arrived for an id that was already resolved.
    ///
    /// This is the unsolicited case for a resolved id, reported separately
    /// so it can be told apart from traffic nobody asked for. Only the most
    /// recently resolved ids are remembered; older ones are `Unsolicited`.
    DuplicateResponse { id: String },
    /// An incoming block could not be decoded; the connection stays up.
    DecodeFailed { error: String },
    /// The incoming stream lost alignment; the connection is closed.
    FramingError { error: String },
}
