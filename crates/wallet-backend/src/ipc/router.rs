//! Request router.
//!
//! Turns `(operation, args)` into a command frame with a fresh correlation
//! ID, and routes each reply frame back to the caller that issued it.

use crate::domain::config::BridgeConfig;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::BridgeError;
use crate::domain::pending::{CallOutcome, PendingCallTable};
use crate::ipc::frames::{ClientFrame, ReplyFrame, RequestFrame};
use crate::ipc::transport::TransportBinding;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;
use wallet_telemetry::BACKEND_REQUESTS_SENT;

pub struct RequestRouter {
    pending: Arc<PendingCallTable>,
    transport: Arc<TransportBinding>,
    operation_timeouts: HashMap<String, Duration>,
}

impl RequestRouter {
    pub fn new(
        pending: Arc<PendingCallTable>,
        transport: Arc<TransportBinding>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            pending,
            transport,
            operation_timeouts: config.operation_timeouts.clone(),
        }
    }

    /// Issue a command. Returns immediately; the reply arrives through the
    /// returned future, at most once.
    pub fn send_request(&self, operation: &str, args: Option<Value>) -> PendingReply {
        let timeout = self.operation_timeouts.get(operation).copied();
        let (id, rx) = self.pending.register(operation, timeout);

        self.transport
            .send(ClientFrame::Command(RequestFrame::new(operation, id, args)));
        BACKEND_REQUESTS_SENT.with_label_values(&[operation]).inc();
        debug!(correlation_id = %id, operation = operation, "Sent request");

        PendingReply {
            id,
            operation: operation.to_string(),
            rx,
        }
    }

    /// Complete the call a reply belongs to.
    ///
    /// Returns false if the reply matched nothing and was dropped.
    pub fn dispatch_reply(&self, reply: ReplyFrame) -> bool {
        let outcome = if reply.is_error {
            Err(BridgeError::Backend {
                operation: reply.operation,
                payload: reply.result,
            })
        } else {
            Ok(reply.result)
        };
        self.pending.complete(reply.id, outcome)
    }

    /// Fail every outstanding call with `error`. Commands still waiting in
    /// the outgoing queue are dropped with their calls.
    pub fn fail_pending(&self, error: BridgeError) -> usize {
        let failed = self.pending.fail_all(error);
        self.transport.discard(&failed);
        failed.len()
    }

    /// Time out overdue calls and drop their queued commands.
    pub fn expire_overdue(&self) -> usize {
        let expired = self.pending.remove_expired();
        self.transport.discard(&expired);
        expired.len()
    }

    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }
}

/// The eventual reply to one command.
///
/// Resolves exactly once: with the reply, a backend error, a timeout, or
/// `Shutdown` if the call was dropped without an answer.
#[derive(Debug)]
#[must_use = "the reply is lost if this is dropped"]
pub struct PendingReply {
    id: CorrelationId,
    operation: String,
    rx: oneshot::Receiver<CallOutcome>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Await the reply and decode it into `T`.
    pub async fn decode<T: DeserializeOwned>(self) -> Result<T, BridgeError> {
        let operation = self.operation.clone();
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| BridgeError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

/// Background task timing out overdue calls. Runs until aborted.
pub async fn sweep_task(router: Arc<RequestRouter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let expired = router.expire_overdue();
        if expired > 0 {
            debug!(expired = expired, "Expired overdue pending calls");
        }
    }
}

impl Future for PendingReply {
    type Output = CallOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::Shutdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn setup() -> (RequestRouter, mpsc::UnboundedReceiver<ClientFrame>) {
        let mut config = BridgeConfig::default();
        config
            .operation_timeouts
            .insert("withdrawTestkudos".into(), Duration::from_secs(120));
        let pending = Arc::new(PendingCallTable::new(config.default_timeout));
        let transport = Arc::new(TransportBinding::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ClientFrame::Subscribe);
        (RequestRouter::new(pending, transport, &config), rx)
    }

    fn sent_id(rx: &mut mpsc::UnboundedReceiver<ClientFrame>) -> CorrelationId {
        match rx.try_recv().unwrap() {
            ClientFrame::Command(frame) => frame.id,
            other => panic!("expected command, got {other:?}"),
        }
    }

    fn reply(id: CorrelationId, operation: &str, result: Value) -> ReplyFrame {
        ReplyFrame {
            id,
            operation: operation.into(),
            is_error: false,
            result,
        }
    }

    #[tokio::test]
    async fn test_reply_reaches_caller() {
        let (router, mut rx) = setup();
        let call = router.send_request("getBalances", None);
        let id = sent_id(&mut rx);
        assert_eq!(call.correlation_id(), id);
        assert_eq!(call.operation(), "getBalances");

        assert!(router.dispatch_reply(reply(id, "getBalances", json!({"byCurrency": {}}))));
        assert_eq!(call.await, Ok(json!({"byCurrency": {}})));
    }

    #[tokio::test]
    async fn test_out_of_order_replies() {
        let (router, mut rx) = setup();
        let first = router.send_request("getBalances", None);
        let second = router.send_request("getPendingOperations", None);
        let first_id = sent_id(&mut rx);
        let second_id = sent_id(&mut rx);

        router.dispatch_reply(reply(second_id, "getPendingOperations", json!("B")));
        router.dispatch_reply(reply(first_id, "getBalances", json!("A")));

        assert_eq!(first.await, Ok(json!("A")));
        assert_eq!(second.await, Ok(json!("B")));
    }

    #[tokio::test]
    async fn test_error_flag_becomes_backend_error() {
        let (router, mut rx) = setup();
        let call = router.send_request("confirmPay", Some(json!({"proposalId": "p1"})));
        let id = sent_id(&mut rx);

        router.dispatch_reply(ReplyFrame {
            id,
            operation: "confirmPay".into(),
            is_error: true,
            result: json!({"message": "no coins"}),
        });

        assert_eq!(
            call.await,
            Err(BridgeError::Backend {
                operation: "confirmPay".into(),
                payload: json!({"message": "no coins"}),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_reply_dropped() {
        let (router, _rx) = setup();
        assert!(!router.dispatch_reply(reply(CorrelationId::from_raw(404), "x", json!(null))));
    }

    #[tokio::test]
    async fn test_decode_typed() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Answer {
            value: u32,
        }

        let (router, mut rx) = setup();
        let call = router.send_request("answer", None);
        let id = sent_id(&mut rx);
        router.dispatch_reply(reply(id, "answer", json!({"value": 42})));
        assert_eq!(call.decode::<Answer>().await, Ok(Answer { value: 42 }));

        let call = router.send_request("answer", None);
        let id = sent_id(&mut rx);
        router.dispatch_reply(reply(id, "answer", json!("not an object")));
        assert!(matches!(
            call.decode::<Answer>().await,
            Err(BridgeError::Decode { .. })
        ));
    }

    #[test]
    fn test_pending_until_reply() {
        let (router, mut rx) = setup();
        let mut call = task::spawn(router.send_request("getHistory", None));
        assert_pending!(call.poll());

        let id = sent_id(&mut rx);
        router.dispatch_reply(reply(id, "getHistory", json!([])));
        assert!(call.is_woken());
        assert_ready_eq!(call.poll(), Ok(json!([])));
    }

    #[tokio::test]
    async fn test_cancelled_call_resolves_shutdown() {
        let (router, mut rx) = setup();
        let call = router.send_request("getBalances", None);
        let id = sent_id(&mut rx);
        router.pending().cancel(&id);
        assert_eq!(call.await, Err(BridgeError::Shutdown));
    }

    #[tokio::test]
    async fn test_fail_pending() {
        let (router, _rx) = setup();
        let call = router.send_request("getBalances", None);
        assert_eq!(router.fail_pending(BridgeError::Disconnected), 1);
        assert_eq!(call.await, Err(BridgeError::Disconnected));
    }

    fn offline_router(config: &BridgeConfig) -> (RequestRouter, Arc<TransportBinding>) {
        let pending = Arc::new(PendingCallTable::new(config.default_timeout));
        let transport = Arc::new(TransportBinding::new());
        (RequestRouter::new(pending, Arc::clone(&transport), config), transport)
    }

    #[tokio::test]
    async fn test_failed_call_never_reaches_next_link() {
        let (router, transport) = offline_router(&BridgeConfig::default());
        let call = router.send_request("confirmPay", Some(json!({"proposalId": "p1"})));
        assert_eq!(transport.queued_len(), 1);

        router.fail_pending(BridgeError::Disconnected);
        assert_eq!(call.await, Err(BridgeError::Disconnected));
        assert_eq!(transport.queued_len(), 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(transport.attach(tx).unwrap(), 0);
        assert_eq!(rx.try_recv().unwrap(), ClientFrame::Subscribe);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_call_dropped_from_queue() {
        let mut config = BridgeConfig::default();
        config
            .operation_timeouts
            .insert("confirmPay".into(), Duration::from_millis(10));
        let (router, transport) = offline_router(&config);

        let expiring = router.send_request("confirmPay", None);
        let waiting = router.send_request("getBalances", None);
        let waiting_id = waiting.correlation_id();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(router.expire_overdue(), 1);
        assert!(expiring.await.unwrap_err().is_timeout());

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(transport.attach(tx).unwrap(), 1);
        assert_eq!(sent_id(&mut rx), waiting_id);
    }

    #[tokio::test]
    async fn test_sweep_task_expires_calls() {
        let config = BridgeConfig {
            default_timeout: Duration::from_millis(10),
            ..BridgeConfig::default()
        };
        let (router, transport) = offline_router(&config);
        let router = Arc::new(router);
        let call = router.send_request("getBalances", None);

        let sweeper = tokio::spawn(sweep_task(Arc::clone(&router), Duration::from_millis(5)));
        let outcome = tokio::time::timeout(Duration::from_secs(2), call).await.unwrap();
        sweeper.abort();

        assert!(outcome.unwrap_err().is_timeout());
        assert_eq!(transport.queued_len(), 0);
    }
}
