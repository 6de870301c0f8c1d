use assay_core::events::{EventSink, ProgressEvent};
use tokio::sync::mpsc;

/// Publishes progress events on an unbounded channel. Sending never blocks
/// and a dropped receiver is ignored, so a slow or absent subscriber cannot
/// stall a run.
#[derive(Clone, Debug)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}
