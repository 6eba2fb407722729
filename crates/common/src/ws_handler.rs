//! Seam between the stream manager and an exchange adapter.

use crate::error::Result;
use crate::messages::ControlCommand;
use async_trait::async_trait;

/// What a successfully handled text frame carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Market data was delivered.
    Data,
    /// Acknowledgements, status and other frames with nothing to deliver.
    Control,
}

/// Exchange-specific half of a stream session. [`crate::WsManager`] owns the
/// socket and drives these callbacks.
#[async_trait]
pub trait WsHandler: Send + Sync + 'static {
    fn url(&self) -> &str;

    /// Frames sent right after connecting, one per subscription batch.
    fn on_connect_messages(&self) -> Vec<String>;

    /// Handle one text frame.
    ///
    /// `Error::MalformedFrame` is counted by the manager, not treated as a
    /// session failure. Only `FrameOutcome::Data` counts as streaming.
    async fn on_message(&self, msg: &str) -> Result<FrameOutcome>;

    /// Binary frames are ignored unless overridden.
    async fn on_binary_message(&self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn on_disconnect(&self) {}

    /// Runs once the subscription frames have gone out.
    async fn on_reconnect(&self) {}

    /// Apply a subscribe/unsubscribe to the handler's symbol set and return
    /// the frames that bring the live session in line with it.
    async fn handle_command(&self, cmd: ControlCommand) -> Vec<String>;

    /// Symbols the next session will subscribe to.
    fn subscribed_ids(&self) -> Vec<String>;

    fn subscription_count(&self) -> usize {
        self.subscribed_ids().len()
    }
}
