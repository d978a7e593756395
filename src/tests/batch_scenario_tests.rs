//! Batch chunking, halving and early termination

#[cfg(test)]
mod batch_scenario_tests {
    use crate::test_utils::fixtures::*;
    use crate::tx_builder::envelope::{BoxedMsg, RawMsg};
    use crate::tx_builder::errors::TxError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_250_messages_in_three_chunks() {
        let env = test_env(test_config());
        let alice = env.address("alice");

        let results = env
            .client
            .send_batch(&transfer_msgs(&alice, 250), &base_tx("alice"))
            .await
            .unwrap();

        let sizes: Vec<usize> = results.iter().map(|r| r.msg_count).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        let sequences: Vec<u64> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![5, 6, 7]);
        assert_eq!(env.chain.query_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_chunks_are_halved() {
        let env = test_env(test_config());
        let alice = env.address("alice");
        env.chain.set_max_msgs_per_tx(30);

        let results = env
            .client
            .send_batch(&transfer_msgs(&alice, 100), &base_tx("alice"))
            .await
            .unwrap();

        let attempted: Vec<usize> = env.chain.submissions().iter().map(|s| s.msg_count).collect();
        assert_eq!(attempted, vec![100, 50, 25, 25, 25, 25]);
        // the size never grows back within the call
        assert!(attempted.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().map(|r| r.msg_count).sum::<usize>(), 100);
        assert_eq!(env.client.metrics().batch_halvings.get(), 2);
    }

    #[tokio::test]
    async fn test_too_large_at_size_one_is_terminal() {
        let mut config = test_config();
        config.batch.max_batch_size = 8;
        config.batch.max_tx_bytes = 64;
        let env = test_env(config);
        let alice = env.address("alice");

        let err = env
            .client
            .send_batch(&transfer_msgs(&alice, 8), &base_tx("alice"))
            .await
            .unwrap_err();
        assert!(err.completed.is_empty());
        assert!(err.source.is_too_large());
        assert_eq!(env.client.metrics().batch_halvings.get(), 3);
        assert!(env.chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_error_keeps_partial_progress() {
        let mut config = test_config();
        config.batch.max_batch_size = 10;
        let env = test_env(config);
        let alice = env.address("alice");

        let mut msgs = transfer_msgs(&alice, 25);
        msgs[15] = RawMsg::new("not-a-type-url", vec![], alice.clone()).boxed();

        let err = env
            .client
            .send_batch(&msgs, &base_tx("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.completed.len(), 1);
        assert_eq!(err.completed[0].msg_count, 10);
        assert!(matches!(err.source, TxError::InvalidMessage(_)));
        assert!(err.to_string().contains("1 accepted"));
    }

    #[tokio::test]
    async fn test_panic_in_chunk_is_caught() {
        let mut config = test_config();
        config.batch.max_batch_size = 10;
        let env = test_env(config);
        let alice = env.address("alice");

        let mut msgs = transfer_msgs(&alice, 30);
        msgs[22] = Arc::new(PanickingMsg {
            signer: alice.clone(),
        }) as BoxedMsg;

        let err = env
            .client
            .send_batch(&msgs, &base_tx("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.completed.len(), 2);
        assert!(matches!(err.source, TxError::Internal(ref m) if m.contains("message encoding exploded")));

        // the shard guard was released during unwinding
        assert_eq!(env.client.metrics().held_shards.get(), 0);
        let next = env
            .client
            .build_and_send(&transfer_msgs(&alice, 1), &base_tx("alice"))
            .await
            .unwrap();
        assert_eq!(next.sequence, 7);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let env = test_env(test_config());
        let results = env.client.send_batch(&[], &base_tx("alice")).await.unwrap();
        assert!(results.is_empty());
        assert!(env.chain.submissions().is_empty());
    }
}
