//! Transport binding.
//!
//! Owns the client side of the link to the backend service. Frames sent
//! while the link is down wait in an outgoing queue and are flushed, in
//! order, as soon as a link is attached. Queueing and transmission happen
//! under one lock, so frames reach the service in the order `send` was
//! called no matter how connects and sends interleave.

use crate::domain::correlation::CorrelationId;
use crate::ipc::frames::ClientFrame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use wallet_telemetry::QUEUED_FRAMES;

use crate::domain::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Default)]
struct LinkState {
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    queue: VecDeque<ClientFrame>,
}

pub struct TransportBinding {
    link: Mutex<LinkState>,
    state: watch::Sender<ConnectionState>,
}

impl TransportBinding {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            link: Mutex::new(LinkState::default()),
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Transmit `frame`, or queue it if no link is attached. Never blocks.
    pub fn send(&self, mut frame: ClientFrame) {
        let mut link = self.link.lock();
        if let Some(outbound) = link.outbound.as_ref() {
            match outbound.send(frame) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => frame = returned,
            }
            debug!("Backend link closed under us, queueing frame");
            link.outbound = None;
            self.state.send_replace(ConnectionState::Disconnected);
        }

        debug!(kind = frame.kind(), queued = link.queue.len() + 1, "Queueing frame");
        link.queue.push_back(frame);
        QUEUED_FRAMES.set(link.queue.len() as f64);
    }

    pub fn mark_connecting(&self) {
        self.state.send_replace(ConnectionState::Connecting);
    }

    /// Attach a freshly established link: flush the queue in FIFO order,
    /// then subscribe to notifications.
    ///
    /// Returns the number of queued frames flushed. On failure the unsent
    /// frames stay queued for the next link.
    pub fn attach(&self, outbound: mpsc::UnboundedSender<ClientFrame>) -> Result<usize, TransportError> {
        let mut link = self.link.lock();
        let mut flushed = 0;
        while let Some(frame) = link.queue.pop_front() {
            if let Err(mpsc::error::SendError(frame)) = outbound.send(frame) {
                link.queue.push_front(frame);
                QUEUED_FRAMES.set(link.queue.len() as f64);
                return Err(TransportError::ChannelClosed);
            }
            flushed += 1;
        }
        QUEUED_FRAMES.set(0.0);

        outbound
            .send(ClientFrame::Subscribe)
            .map_err(|_| TransportError::ChannelClosed)?;

        link.outbound = Some(outbound);
        self.state.send_replace(ConnectionState::Connected);
        info!(flushed = flushed, "Backend link attached");
        Ok(flushed)
    }

    /// Forget the current link. Later frames queue until the next `attach`.
    ///
    /// Returns true if a link was attached.
    pub fn detach(&self) -> bool {
        let had_link = self.link.lock().outbound.take().is_some();
        self.state.send_replace(ConnectionState::Disconnected);
        had_link
    }

    /// Tell the service to stop sending notifications on the current link.
    pub fn unsubscribe(&self) -> bool {
        let link = self.link.lock();
        match link.outbound.as_ref() {
            Some(outbound) => outbound.send(ClientFrame::Unsubscribe).is_ok(),
            None => false,
        }
    }

    /// Drop queued commands for calls that have already been answered
    /// locally, so the backend never runs them.
    ///
    /// Returns the number of frames dropped.
    pub fn discard(&self, ids: &[CorrelationId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut link = self.link.lock();
        let before = link.queue.len();
        link.queue.retain(|frame| {
            !matches!(frame, ClientFrame::Command(command) if ids.contains(&command.id))
        });
        let dropped = before - link.queue.len();
        if dropped > 0 {
            QUEUED_FRAMES.set(link.queue.len() as f64);
            debug!(dropped = dropped, "Discarded queued commands");
        }
        dropped
    }

    pub fn queued_len(&self) -> usize {
        self.link.lock().queue.len()
    }
}

impl Default for TransportBinding {
    fn default() -> Self {
        Self::new()
    }
}
