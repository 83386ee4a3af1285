//! # Full-Stack Tests
//!
//! Wallet model, backend client and relay service wired together, with an
//! in-memory engine standing in for the engine process:
//!
//! ```text
//! WalletModel ──► WalletBackendApi ──► ServiceHandle ──► BackendService ──► EngineEnd (test)
//! ```

// =============================================================================
// TEST FIXTURES (only compiled during tests)
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;
    use wallet_backend::engine::channel::{channel_engine, EngineEnd};
    use wallet_backend::{BackendService, BridgeConfig, EngineConfig, EngineRequest, ServiceHandle, WalletBackendApi};
    use wallet_bus::{EventFilter, EventTopic, InMemoryEventBus, WalletEvent};

    pub const WAIT: Duration = Duration::from_secs(2);

    pub struct Stack {
        pub bus: Arc<InMemoryEventBus>,
        pub service: ServiceHandle,
        pub engine: EngineEnd,
        pub instances: mpsc::UnboundedReceiver<EngineEnd>,
    }

    pub fn bridge_config() -> BridgeConfig {
        BridgeConfig {
            default_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_millis(10),
            reconnect_initial_backoff: Duration::from_millis(10),
            reconnect_max_backoff: Duration::from_millis(50),
            ..BridgeConfig::default()
        }
    }

    /// Start the relay on an in-memory engine and answer its `init`.
    pub async fn stack() -> Stack {
        let (engine, mut instances) = channel_engine();
        let bus = Arc::new(InMemoryEventBus::new());
        let config = EngineConfig {
            storage_dir: "/tmp/wallet-test".into(),
            ..EngineConfig::default()
        };
        let service = BackendService::spawn(Arc::new(engine), &config, Arc::clone(&bus))
            .await
            .unwrap();
        let mut end = instances.recv().await.unwrap();
        let init = next_request(&mut end).await;
        assert_eq!(init.operation, "init");
        assert_eq!(
            init.args,
            json!({"persistentStoragePath": "/tmp/wallet-test/talerwalletdb.json"})
        );
        end.respond(&init, json!({}));
        // Let the relay handle the init reply before any client subscribes.
        tokio::time::sleep(Duration::from_millis(20)).await;

        Stack {
            bus,
            service,
            engine: end,
            instances,
        }
    }

    impl Stack {
        pub fn client(&self, config: BridgeConfig) -> Arc<WalletBackendApi> {
            WalletBackendApi::start(Arc::new(self.service.clone()), Arc::clone(&self.bus), config)
        }

        /// Start a client and wait for its connection event to pass.
        pub async fn connected_client(&self, config: BridgeConfig) -> Arc<WalletBackendApi> {
            let mut events = self
                .bus
                .subscribe(EventFilter::topics(vec![EventTopic::Connection]));
            let api = self.client(config);
            loop {
                let event = tokio::time::timeout(WAIT, events.recv())
                    .await
                    .expect("client never connected")
                    .expect("bus closed");
                if event == WalletEvent::BackendConnected {
                    return api;
                }
            }
        }

        /// Next request the engine sees, which must be `operation`.
        pub async fn expect(&mut self, operation: &str) -> EngineRequest {
            let request = next_request(&mut self.engine).await;
            assert_eq!(request.operation, operation, "unexpected {request:?}");
            request
        }
    }

    pub async fn next_request(end: &mut EngineEnd) -> EngineRequest {
        tokio::time::timeout(WAIT, end.next_request())
            .await
            .expect("engine saw no request")
            .expect("relay closed the engine link")
    }
}

// =============================================================================
// INTEGRATION TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Map, Value};
    use wallet_backend::{BridgeError, EngineMessage};
    use wallet_bus::{EventFilter, EventTopic, WalletEvent};
    use wallet_model::{LoadState, WalletModel, WithdrawStatus};

    #[tokio::test]
    async fn test_model_loads_through_relay() {
        let mut stack = stack().await;
        let model = WalletModel::new(stack.client(bridge_config()));

        // The connect event triggers both loads, in no particular order.
        let mut first = next_request(&mut stack.engine).await;
        let mut second = next_request(&mut stack.engine).await;
        if first.operation != "getBalances" {
            std::mem::swap(&mut first, &mut second);
        }
        let (balances, pending) = (first, second);
        assert_eq!(pending.operation, "getPendingOperations");
        stack.engine.respond(&pending, json!({"pendingOperations": []}));
        stack.engine.respond(
            &balances,
            json!({"byCurrency": {"KUDOS": {"available": "KUDOS:7", "pendingIncoming": "KUDOS:0"}}}),
        );

        let mut state = model.balances().state();
        let loaded = tokio::time::timeout(WAIT, state.wait_for(|s| matches!(s, LoadState::Loaded(_))))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(loaded.loaded().unwrap().by_currency[0].available.to_string(), "KUDOS:7");

        // An engine notification fans out and triggers both refreshes again.
        stack.engine.notify();
        let mut seen = vec![
            stack.engine.next_request().await.unwrap().operation,
            stack.engine.next_request().await.unwrap().operation,
        ];
        seen.sort();
        assert_eq!(seen, vec!["getBalances", "getPendingOperations"]);
        model.shutdown().await;
    }

    #[tokio::test]
    async fn test_two_clients_get_their_own_replies() {
        let mut stack = stack().await;
        let first = stack.connected_client(bridge_config()).await;
        let second = stack.connected_client(bridge_config()).await;

        let a = first.send_request("getHistory", None);
        let a_request = stack.expect("getHistory").await;
        let b = second.send_request("getHistory", None);
        let b_request = stack.expect("getHistory").await;
        assert_ne!(a_request.id, b_request.id);

        stack.engine.respond(&b_request, json!({"history": ["b"]}));
        stack.engine.respond(&a_request, json!({"history": ["a"]}));
        assert_eq!(a.await, Ok(json!({"history": ["a"]})));
        assert_eq!(b.await, Ok(json!({"history": ["b"]})));

        first.shutdown().await;
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_fails_in_flight_and_reinitializes() {
        let mut stack = stack().await;
        let api = stack.connected_client(bridge_config()).await;

        let stuck = api.send_request("getHistory", None);
        stack.expect("getHistory").await;
        let reset = api.send_request("reset", None);
        let reset_request = stack.expect("reset").await;
        stack.engine.respond(&reset_request, json!({}));

        assert_eq!(reset.await, Ok(json!({})));
        assert!(matches!(stuck.await, Err(BridgeError::Backend { .. })));

        let mut fresh = tokio::time::timeout(WAIT, stack.instances.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next_request(&mut fresh).await.operation, "init");
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_withdrawal_with_terms_of_service() {
        let mut stack = stack().await;
        let api = stack.connected_client(bridge_config()).await;
        let model = WalletModel::new(Arc::clone(&api));
        // Drain the initial loads.
        stack.expect("getBalances").await;
        stack.expect("getPendingOperations").await;

        let uri = "taler://withdraw/bank.test/api/wop";
        model.withdraw().get_withdrawal_info(uri);
        let details = stack.expect("getWithdrawDetailsForUri").await;
        stack.engine.respond(
            &details,
            json!({
                "bankWithdrawDetails": {"amount": "KUDOS:10", "suggestedExchange": "https://ex.test/"},
                "exchangeWithdrawDetails": {
                    "termsOfServiceAccepted": false,
                    "exchangeInfo": {
                        "baseUrl": "https://ex.test/",
                        "termsOfServiceText": "terms",
                        "termsOfServiceLastEtag": "0"
                    }
                }
            }),
        );

        let mut status = model.withdraw().status();
        tokio::time::timeout(
            WAIT,
            status.wait_for(|s| matches!(s, WithdrawStatus::TermsReviewRequired { .. })),
        )
        .await
        .unwrap()
        .unwrap();

        model.withdraw().accept_current_terms_of_service().unwrap();
        let accept = stack.expect("acceptExchangeTermsOfService").await;
        assert_eq!(accept.args, json!({"exchangeBaseUrl": "https://ex.test/", "etag": "0"}));
        stack.engine.respond(&accept, json!({}));

        let details = stack.expect("getWithdrawDetailsForUri").await;
        assert_eq!(details.args["selectedExchange"], json!("https://ex.test/"));
        stack.engine.respond(
            &details,
            json!({
                "bankWithdrawDetails": {"amount": "KUDOS:10", "suggestedExchange": "https://ex.test/"},
                "exchangeWithdrawDetails": {
                    "termsOfServiceAccepted": true,
                    "exchangeInfo": {"baseUrl": "https://ex.test/"}
                }
            }),
        );
        let ready = tokio::time::timeout(
            WAIT,
            status.wait_for(|s| matches!(s, WithdrawStatus::DetailsReady { .. })),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        let WithdrawStatus::DetailsReady { uri, exchange, .. } = ready else {
            unreachable!()
        };

        model.withdraw().accept_withdrawal(uri, exchange).unwrap();
        let confirm = stack.expect("acceptWithdrawal").await;
        stack.engine.respond(&confirm, json!({}));
        tokio::time::timeout(WAIT, status.wait_for(|s| *s == WithdrawStatus::Succeeded))
            .await
            .unwrap()
            .unwrap();
        model.shutdown().await;
    }

    #[tokio::test]
    async fn test_tunnel_round_trip() {
        let mut stack = stack().await;
        let api = stack.connected_client(bridge_config()).await;
        let model = WalletModel::new(Arc::clone(&api));
        stack.expect("getBalances").await;
        stack.expect("getPendingOperations").await;

        let mut tunnel = stack.bus.subscribe(EventFilter::topics(vec![EventTopic::Tunnel]));
        let mut request = Map::new();
        request.insert("url".into(), json!("https://ex.test/keys"));
        request.insert("method".into(), json!("GET"));
        stack.engine.send(EngineMessage::TunnelHttp { request });

        let event = tokio::time::timeout(WAIT, tunnel.recv()).await.unwrap().unwrap();
        let WalletEvent::TunnelRequest(payload) = event else {
            panic!("unexpected {event:?}");
        };
        assert_eq!(payload["type"], json!("tunnelHttp"));
        assert_eq!(payload["url"], json!("https://ex.test/keys"));

        model.tunnel_response(r#"{"status": 200, "body": "{}"}"#).unwrap();
        let response = stack.expect("tunnelResponse").await;
        assert_eq!(response.args, json!({"status": 200, "body": "{}"}));
        model.shutdown().await;
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let mut stack = stack().await;
        let mut config = bridge_config();
        config
            .operation_timeouts
            .insert("withdrawTestkudos".into(), Duration::from_millis(100));
        let api = stack.connected_client(config).await;

        let call = api.send_request("withdrawTestkudos", None);
        stack.expect("withdrawTestkudos").await;
        let outcome: Result<Value, BridgeError> = call.await;
        assert!(outcome.unwrap_err().is_timeout());
        assert_eq!(api.pending_count(), 0);
        api.shutdown().await;
    }
}
