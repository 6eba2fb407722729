//! Control messages for the stream worker.

/// Sent from the supervisor to a running [`crate::WsManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Add symbols to the tracked set.
    Subscribe(Vec<String>),
    /// Drop symbols from the tracked set.
    Unsubscribe(Vec<String>),
    /// Close the session and stop.
    Shutdown,
}
