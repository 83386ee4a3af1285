//! In-memory backend service for tests.
//!
//! Each successful `connect()` hands the test a [`PeerLink`] standing in for
//! the service end of that link. Dropping the `PeerLink` drops the link.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::TransportError;
use crate::ipc::frames::{ClientFrame, ReplyFrame, RequestFrame, ServiceFrame};
use crate::ports::outbound::{BackendConnector, BackendLink};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct ChannelConnector {
    accepted: mpsc::UnboundedSender<PeerLink>,
    refusing: Arc<AtomicBool>,
}

impl ChannelConnector {
    /// Make subsequent `connect()` calls fail until re-enabled.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

/// The service's end of one client link.
#[derive(Debug)]
pub struct PeerLink {
    pub frames: mpsc::UnboundedReceiver<ClientFrame>,
    pub replies: mpsc::UnboundedSender<ServiceFrame>,
}

impl PeerLink {
    /// Next command frame, skipping subscribe/unsubscribe frames.
    pub async fn next_command(&mut self) -> Option<RequestFrame> {
        while let Some(frame) = self.frames.recv().await {
            if let ClientFrame::Command(request) = frame {
                return Some(request);
            }
        }
        None
    }

    pub fn reply(&self, id: CorrelationId, operation: &str, result: Value) -> bool {
        self.send_reply(id, operation, false, result)
    }

    pub fn reply_error(&self, id: CorrelationId, operation: &str, error: Value) -> bool {
        self.send_reply(id, operation, true, error)
    }

    pub fn notify(&self) -> bool {
        self.replies.send(ServiceFrame::Notification).is_ok()
    }

    fn send_reply(&self, id: CorrelationId, operation: &str, is_error: bool, result: Value) -> bool {
        self.replies
            .send(ServiceFrame::Reply(ReplyFrame {
                id,
                operation: operation.to_string(),
                is_error,
                result,
            }))
            .is_ok()
    }
}

/// Create an in-memory connector and the stream of links it accepts.
pub fn channel_connector() -> (ChannelConnector, mpsc::UnboundedReceiver<PeerLink>) {
    let (accepted, links) = mpsc::unbounded_channel();
    (
        ChannelConnector {
            accepted,
            refusing: Arc::new(AtomicBool::new(false)),
        },
        links,
    )
}

#[async_trait]
impl BackendConnector for ChannelConnector {
    async fn connect(&self) -> Result<BackendLink, TransportError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(PeerLink {
                frames: frame_rx,
                replies: reply_tx,
            })
            .map_err(|_| TransportError::ServiceStopped)?;
        Ok(BackendLink {
            outbound: frame_tx,
            inbound: reply_rx,
        })
    }
}
