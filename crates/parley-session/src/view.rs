//! The UI boundary.

use std::fmt;
use std::future::Future;

/// How a line in the chat panel should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Chat,
    Info,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Info => write!(f, "info"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What a session needs from whatever is showing it to the user.
///
/// Calls come from the session's processor task, so implementations use
/// interior mutability.
pub trait View: Send + Sync + 'static {
    /// The session is now in `room_id`.
    fn view_room(&self, room_id: &str);

    /// A line for the chat panel. `from` is empty for non-chat lines.
    fn view_message(&self, kind: MessageKind, from: &str, text: &str);

    /// The room's member list changed.
    fn update_peers(&self, peers: &[String]);

    /// Resolves when the user is done (or [`quit`](Self::quit) is called).
    fn show(&self) -> impl Future<Output = ()> + Send;

    /// Ends the view; a pending [`show`](Self::show) resolves.
    fn quit(&self);
}
