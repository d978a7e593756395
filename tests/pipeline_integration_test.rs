//! End-to-end tests through the public client API

#[cfg(test)]
mod pipeline_integration_tests {
    use std::io::Write;
    use std::sync::Arc;
    use tx_pipeline::test_utils::fixtures::*;
    use tx_pipeline::test_utils::MockChain;
    use tx_pipeline::tx_builder::{
        DefaultTxConfig, Msg, PipelineResult, SignMode, TxConfig, TxError,
    };
    use tx_pipeline::wallet::{verify_signature, KeyManager};
    use tx_pipeline::{BaseTx, BroadcastMode, ClientConfig, TxClient};

    /// A module-level message as a bank wrapper would define it
    #[derive(Debug)]
    struct MsgSend {
        from: String,
        to: String,
        amount: String,
    }

    impl Msg for MsgSend {
        fn type_url(&self) -> &str {
            "/cosmos.bank.v1beta1.MsgSend"
        }

        fn validate_basic(&self) -> PipelineResult<()> {
            if self.to.is_empty() {
                return Err(TxError::InvalidMessage("missing recipient".to_string()));
            }
            self.amount
                .parse::<tx_pipeline::tx_builder::Coin>()
                .map(|_| ())
                .map_err(|e| TxError::InvalidMessage(e.to_string()))
        }

        fn signers(&self) -> Vec<String> {
            vec![self.from.clone()]
        }

        fn encode(&self) -> Vec<u8> {
            serde_json::to_vec(&(&self.from, &self.to, &self.amount)).unwrap_or_default()
        }
    }

    fn send(from: &str, to: &str, amount: &str) -> tx_pipeline::BoxedMsg {
        Arc::new(MsgSend {
            from: from.to_string(),
            to: to.to_string(),
            amount: amount.to_string(),
        })
    }

    #[tokio::test]
    async fn test_client_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
chain_id = "{}"
gas_prices = "0.025uiris"
mode = "commit"
sign_mode = "legacy_json"
"#,
            CHAIN_ID
        )
        .unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        let env = test_env(config);
        let alice = env.address("alice");
        let bob = env.address("bob");

        let result = env
            .client
            .build_and_send(&[send(&alice, &bob, "100uiris")], &base_tx("alice"))
            .await
            .unwrap();
        assert_eq!(result.mode, BroadcastMode::Commit);
        assert_eq!(result.gas_wanted, 200_000);
        assert_eq!(result.msg_count, 1);
        assert_eq!(env.chain.sequence_of(&alice), Some(6));
    }

    #[tokio::test]
    async fn test_invalid_message_is_rejected_before_submit() {
        let env = test_env(test_config());
        let alice = env.address("alice");

        let err = env
            .client
            .build_and_send(&[send(&alice, "", "100uiris")], &base_tx("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidMessage(_)));
        assert_eq!(err.category(), "message");
        assert!(env.chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_factory_builds_verifiable_json() {
        let env = test_env(test_config());
        let alice = env.keys.find("alice").unwrap();
        let tx_config = DefaultTxConfig::default();

        let bytes = env
            .client
            .factory()
            .unwrap()
            .with_address(alice.address.clone())
            .with_account_number(1)
            .with_sequence(5)
            .with_password(PASSWORD)
            .build_and_sign("alice", &transfer_msgs(&alice.address, 2), true)
            .unwrap();

        let envelope: tx_pipeline::tx_builder::TxEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.messages().len(), 2);
        let signatures = envelope.signatures().unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].sequence, 5);
        assert_eq!(signatures[0].sign_mode, SignMode::Direct);

        let sign_bytes = tx_config
            .sign_mode_handler()
            .sign_bytes(
                SignMode::Direct,
                &tx_pipeline::tx_builder::SignerData {
                    chain_id: CHAIN_ID.to_string(),
                    account_number: 1,
                    sequence: 5,
                },
                &envelope,
            )
            .unwrap();
        assert!(verify_signature(
            &signatures[0].public_key,
            &sign_bytes,
            &signatures[0].signature
        ));
    }

    #[tokio::test]
    async fn test_query_account_bypasses_cache() {
        let env = test_env(test_config());
        let bob = env.address("bob");

        env.client.account_state(&bob).await.unwrap();
        env.chain.bump_sequence(&bob);
        assert_eq!(env.client.account_state(&bob).await.unwrap().sequence, 0);
        assert_eq!(env.client.query_account(&bob).await.unwrap().sequence, 1);
        assert_eq!(env.chain.query_count(), 2);

        assert!(matches!(
            env.client.query_account("unknown").await,
            Err(TxError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics_export() {
        let env = test_env(test_config());
        let carol = env.address("carol");
        env.client
            .send_batch(&transfer_msgs(&carol, 3), &base_tx("carol"))
            .await
            .unwrap();

        let text = env.client.metrics().encode_text().unwrap();
        assert!(text.contains("txs_sent_total 1"));
        assert!(text.contains("sequence_cache_misses_total 1"));
        assert!(text.contains("broadcast_latency_seconds_count 1"));
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let chain = Arc::new(MockChain::new(CHAIN_ID));
        let mut config = ClientConfig::new(CHAIN_ID);
        config.sequence.lock_shards = 0;

        let result = TxClient::new(
            config,
            chain.clone(),
            chain,
            keyring(),
            Arc::new(DefaultTxConfig::default()),
        );
        assert!(matches!(result, Err(TxError::Config(_))));
    }

    #[tokio::test]
    async fn test_base_tx_overrides_config_fee() {
        let mut config = test_config();
        config.fee = Some("5000uiris".to_string());
        let env = test_env(config);
        let alice = env.address("alice");

        // gas prices on the call replace the configured explicit fee
        let base = BaseTx::new("alice", PASSWORD)
            .with_gas(100_000)
            .with_gas_prices("0.015uiris")
            .with_memo("override");
        let hash = env
            .client
            .build_tx_hash(&transfer_msgs(&alice, 1), &base)
            .await
            .unwrap();
        let result = env
            .client
            .build_and_send(&transfer_msgs(&alice, 1), &base)
            .await
            .unwrap();
        assert_eq!(result.hash, hash);
        assert_eq!(result.gas_wanted, 100_000);
    }
}
