//! Outbound channel: backend requests and status notifications as
//! `Outbound` messages on one mpsc stream.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{BackendRequest, DocumentUri, Outbound, StatusNotification};
use crate::error::ChannelError;
use crate::ports::{CommandChannel, EventSink};

#[derive(Debug, Clone)]
pub struct OutboundChannel {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl OutboundChannel {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Channel plus the receiving end the host drains.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn request(&self, request: BackendRequest) -> Result<(), ChannelError> {
        self.tx
            .send(Outbound::Request(request))
            .map_err(|_| ChannelError::Closed)
    }
}

impl CommandChannel for OutboundChannel {
    fn send_verify(
        &self,
        uri: &DocumentUri,
        manually_triggered: bool,
        workspace_root: Option<&Path>,
    ) -> Result<(), ChannelError> {
        self.request(BackendRequest::Verify {
            uri: uri.clone(),
            manually_triggered,
            workspace_root: workspace_root.map(Path::to_path_buf),
        })
    }

    fn send_stop(&self, uri: &DocumentUri) -> Result<(), ChannelError> {
        self.request(BackendRequest::Stop { uri: uri.clone() })
    }
}

impl EventSink for OutboundChannel {
    fn notify(&self, notification: StatusNotification) {
        if self.tx.send(Outbound::Status(notification)).is_err() {
            debug!("status receiver gone, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_and_notifications_share_the_stream() {
        let (channel, mut rx) = OutboundChannel::pair();
        let uri = DocumentUri::new("file:///a.vpr");

        channel.send_verify(&uri, true, None).unwrap();
        channel.notify(StatusNotification::Hint {
            message: "hi".into(),
        });
        channel.send_stop(&uri).unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Request(BackendRequest::Verify { manually_triggered: true, .. }))
        ));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Status(_))));
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Request(BackendRequest::Stop { .. }))
        ));
    }

    #[test]
    fn closed_receiver_fails_requests() {
        let (channel, rx) = OutboundChannel::pair();
        drop(rx);
        let err = channel
            .send_stop(&DocumentUri::new("file:///a.vpr"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }
}
