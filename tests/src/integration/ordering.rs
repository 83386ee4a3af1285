//! # Reply Ordering Properties
//!
//! However the backend orders its replies, each caller receives exactly the
//! reply sent for its own request, and nothing is left pending.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;
    use wallet_backend::ipc::channel::channel_connector;
    use wallet_backend::ipc::ClientFrame;
    use wallet_backend::{BridgeConfig, WalletBackendApi};
    use wallet_bus::InMemoryEventBus;

    fn run_shuffled(order: Vec<usize>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let (connector, mut links) = channel_connector();
            let bus = Arc::new(InMemoryEventBus::new());
            let config = BridgeConfig {
                default_timeout: Duration::from_secs(5),
                ..BridgeConfig::default()
            };
            let api = WalletBackendApi::start(Arc::new(connector), bus, config);
            let mut peer = links.recv().await.unwrap();
            assert_eq!(peer.frames.recv().await, Some(ClientFrame::Subscribe));

            let calls: Vec<_> = (0..order.len())
                .map(|i| api.send_request("getBalances", Some(json!({"call": i}))))
                .collect();
            let mut commands = Vec::with_capacity(order.len());
            for _ in 0..order.len() {
                commands.push(peer.next_command().await.unwrap());
            }

            for &index in &order {
                let command = &commands[index];
                peer.reply(command.id, "getBalances", json!({"echo": command.args["call"]}));
            }
            // A duplicate of an already answered reply is ignored.
            if let Some(command) = commands.first() {
                peer.reply(command.id, "getBalances", json!({"echo": "duplicate"}));
            }

            for (i, call) in calls.into_iter().enumerate() {
                assert_eq!(call.await, Ok(json!({"echo": i})));
            }
            assert_eq!(api.pending_count(), 0);
            api.shutdown().await;
        });
    }

    fn shuffled_indices() -> impl Strategy<Value = Vec<usize>> {
        (1usize..24).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_replies_reach_their_caller(order in shuffled_indices()) {
            run_shuffled(order);
        }
    }
}
