//! Message and definition builders.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use batch_anchor::batch::{BatchListener, LocalBatchManager};
use batch_anchor::batchpin::{LedgerPinSubmitter, PinBatchHandler};
use batch_anchor::config::RetryConfig;
use batch_anchor::context::Context;
use batch_anchor::data::LocalDataManager;
use batch_anchor::error::BroadcastError;
use batch_anchor::model::{
    Batch, Bytes32, Datatype, Identity, IdentityClaim, InlineData, MessageInput, MessageState,
    MessageType, NamespaceDef, OpType, SignerRef, TokenPool, TokenPoolAnnouncement,
    TransactionRef, TransactionType,
};
use batch_anchor::operations::OperationRegistry;
use batch_anchor::plugins::Database;

mod common;
use common::{Harness, SIGNING_KEY};

#[tokio::test]
async fn test_send_applies_defaults_and_stages() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();

    let msg = manager
        .new_broadcast("ns1", MessageInput::with_value(json!({"a": 1})))
        .send(&ctx)
        .await
        .unwrap();

    assert_eq!(msg.header.msg_type, MessageType::Broadcast);
    assert_eq!(msg.header.tx_type, TransactionType::BatchPin);
    assert_eq!(msg.header.topics, vec!["default".to_string()]);
    assert_eq!(msg.header.signer.author, "org1");
    assert_eq!(msg.header.signer.key, SIGNING_KEY);
    assert!(msg.hash.is_some());
    assert!(msg.header.datahash.is_some());
    assert_eq!(msg.data.len(), 1);

    let staged = h.scheduler.staged();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].header.id, msg.header.id);
    assert!(h.db.get_message(&ctx, &msg.header.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_send_rejects_invalid_input() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();

    let empty = manager.new_broadcast("ns1", MessageInput::default()).send(&ctx).await;
    assert!(matches!(empty, Err(BroadcastError::InvalidInput(_))));

    let mut unpinned = MessageInput::with_value(json!(1));
    unpinned.header.tx_type = Some(TransactionType::None);
    let unpinned = manager.new_broadcast("ns1", unpinned).send(&ctx).await;
    assert!(matches!(unpinned, Err(BroadcastError::InvalidInput(_))));

    let oversized = MessageInput::with_value(json!("x".repeat(200_000)));
    let oversized = manager.new_broadcast("ns1", oversized).send(&ctx).await;
    assert!(matches!(oversized, Err(BroadcastError::InvalidInput(_))));

    let mut stranger = MessageInput::with_value(json!(1));
    stranger.header.signer.author = "org9".into();
    let stranger = manager.new_broadcast("ns1", stranger).send(&ctx).await;
    assert!(matches!(stranger, Err(BroadcastError::Identity(_))));

    assert!(h.scheduler.staged().is_empty());
}

#[tokio::test]
async fn test_send_and_wait_resolves_on_dispatch() {
    let h = Harness::new();
    let manager = h.manager();
    let sender = manager.new_broadcast("ns1", MessageInput::with_value(json!({"b": 2})));
    let id = sender.id();

    let scheduler = h.scheduler.clone();
    let bridge = h.bridge.clone();
    tokio::spawn(async move {
        loop {
            if let Some(msg) = scheduler.staged().first().cloned() {
                let batch = Batch::seal(
                    "ns1",
                    msg.header.signer.clone(),
                    TransactionRef::new_batch_pin(),
                    vec![msg],
                    vec![],
                )
                .unwrap();
                bridge.batch_dispatched(&batch);
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let msg = sender.send_and_wait(&Context::background()).await.unwrap();
    assert_eq!(msg.header.id, id);
    assert_eq!(h.bridge.pending_waiters(), 0);
}

#[tokio::test]
async fn test_send_and_wait_times_out() {
    let h = Harness::new();
    let manager = h.manager();
    let err = manager
        .broadcast_message(&Context::background(), "ns1", MessageInput::with_value(json!(1)), true)
        .await
        .unwrap_err();
    assert!(matches!(err, BroadcastError::ConfirmTimeout(_)));
    assert_eq!(h.bridge.pending_waiters(), 0);
}

#[tokio::test]
async fn test_datatype_definition() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();
    let mut datatype = Datatype {
        name: "widget".into(),
        version: "1.0.0".into(),
        value: Some(json!({"type": "object"})),
        ..Default::default()
    };

    let msg = manager
        .broadcast_datatype(&ctx, "ns1", &mut datatype, false)
        .await
        .unwrap();

    assert_eq!(msg.header.msg_type, MessageType::Definition);
    assert_eq!(msg.header.tag, "ff_define_datatype");
    assert_eq!(msg.header.topics, vec!["ff_definition_ns1".to_string()]);
    assert_eq!(datatype.validator, "json");
    assert_eq!(datatype.namespace, "ns1");
    assert_eq!(datatype.message, Some(msg.header.id));
    assert_eq!(
        datatype.hash,
        Some(Bytes32::hash(serde_json::to_vec(&json!({"type": "object"})).unwrap()))
    );

    let data = h.db.get_data(&ctx, &msg.data[0].id).await.unwrap().unwrap();
    assert_eq!(data.validator, "definition");
    assert_eq!(data.value.unwrap()["name"], "widget");
}

#[tokio::test]
async fn test_datatype_requires_version_and_value() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();

    let mut no_version = Datatype {
        name: "widget".into(),
        value: Some(json!({})),
        ..Default::default()
    };
    assert!(manager
        .broadcast_datatype(&ctx, "ns1", &mut no_version, false)
        .await
        .is_err());

    let mut no_value = Datatype {
        name: "widget".into(),
        version: "1".into(),
        ..Default::default()
    };
    assert!(manager
        .broadcast_datatype(&ctx, "ns1", &mut no_value, false)
        .await
        .is_err());

    let mut bad_name = Datatype {
        name: "-widget".into(),
        version: "1".into(),
        value: Some(json!({})),
        ..Default::default()
    };
    assert!(manager
        .broadcast_datatype(&ctx, "ns1", &mut bad_name, false)
        .await
        .is_err());
    assert!(h.scheduler.staged().is_empty());
}

#[tokio::test]
async fn test_namespace_goes_to_system_namespace() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();
    let mut ns = NamespaceDef {
        name: "ns2".into(),
        description: "second".into(),
        ..Default::default()
    };

    let msg = manager.broadcast_namespace(&ctx, &mut ns, false).await.unwrap();
    assert_eq!(msg.header.namespace, "ff_system");
    assert_eq!(msg.header.tag, "ff_define_namespace");
    assert!(ns.id.is_some());
    assert_eq!(ns.message, Some(msg.header.id));

    let mut invalid = NamespaceDef {
        name: "bad name".into(),
        ..Default::default()
    };
    assert!(manager.broadcast_namespace(&ctx, &mut invalid, false).await.is_err());
}

#[tokio::test]
async fn test_namespace_description_limit_counts_characters() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();

    // 4096 two-byte characters fit.
    let mut ns = NamespaceDef {
        name: "accents".into(),
        description: "é".repeat(4096),
        ..Default::default()
    };
    manager.broadcast_namespace(&ctx, &mut ns, false).await.unwrap();

    let mut long = NamespaceDef {
        name: "accents2".into(),
        description: "é".repeat(4097),
        ..Default::default()
    };
    let err = manager.broadcast_namespace(&ctx, &mut long, false).await.unwrap_err();
    assert!(matches!(err, BroadcastError::InvalidInput(_)));
}

#[tokio::test]
async fn test_identity_claim_uses_supplied_signer() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();
    let mut claim = IdentityClaim {
        identity: Identity {
            did: "did:firefly:org/org2".into(),
            namespace: "ff_system".into(),
            name: "org2".into(),
            ..Default::default()
        },
    };

    let unsigned = manager
        .broadcast_identity_claim(&ctx, "ff_system", &mut claim, SignerRef::default(), "ff_identity_claim", false)
        .await;
    assert!(matches!(unsigned, Err(BroadcastError::Identity(_))));

    let signer = SignerRef {
        author: "did:firefly:org/org2".into(),
        key: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into(),
    };
    let msg = manager
        .broadcast_identity_claim(&ctx, "ff_system", &mut claim, signer.clone(), "ff_identity_claim", false)
        .await
        .unwrap();
    assert_eq!(msg.header.signer, signer);
    assert_eq!(claim.identity.message, Some(msg.header.id));
}

#[tokio::test]
async fn test_token_pool_announcement() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();

    let mut mismatched = TokenPoolAnnouncement {
        pool: TokenPool {
            name: "pool1".into(),
            namespace: "ns2".into(),
            ..Default::default()
        },
    };
    assert!(manager
        .broadcast_token_pool(&ctx, "ns1", &mut mismatched, false)
        .await
        .is_err());

    let mut announcement = TokenPoolAnnouncement {
        pool: TokenPool {
            name: "pool1".into(),
            standard: "ERC1155".into(),
            ..Default::default()
        },
    };
    let msg = manager
        .broadcast_token_pool(&ctx, "ns1", &mut announcement, false)
        .await
        .unwrap();
    assert_eq!(msg.header.tag, "ff_define_pool");
    assert_eq!(announcement.pool.namespace, "ns1");
    assert!(announcement.pool.id.is_some());
}

#[tokio::test]
async fn test_definition_with_explicit_signer() {
    let h = Harness::new();
    let manager = h.manager();
    let ctx = Context::background();
    h.identity.register("org2", "0xabc");
    let mut ns = NamespaceDef {
        name: "ns3".into(),
        ..Default::default()
    };

    let msg = manager
        .broadcast_definition(
            &ctx,
            "ns1",
            &mut ns,
            Some(SignerRef {
                author: "org2".into(),
                key: String::new(),
            }),
            "custom_tag",
            false,
        )
        .await
        .unwrap();
    assert_eq!(msg.header.signer.author, "org2");
    assert_eq!(msg.header.signer.key, "0xabc");
    assert_eq!(msg.header.tag, "custom_tag");

    let as_node = manager
        .broadcast_definition_as_node(&ctx, "ns1", &mut ns, "custom_tag", false)
        .await
        .unwrap();
    assert_eq!(as_node.header.signer.author, "org1");
}

#[tokio::test]
async fn test_confirmed_broadcast_end_to_end() {
    let h = Harness::new();
    let (root, cancel) = Context::cancellable();
    let scheduler = Arc::new(LocalBatchManager::new(
        h.db.clone(),
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            dispatch_timeout_secs: 5,
        },
        root,
    ));
    scheduler.add_listener(h.bridge.clone());
    h.operations.register_handler(
        Arc::new(PinBatchHandler::new(h.chain.clone(), h.db.clone())),
        &[OpType::BlockchainPinBatch],
    );
    let data = Arc::new(LocalDataManager::new(
        h.db.clone(),
        h.exchange.clone(),
        scheduler.clone(),
    ));
    let manager = h
        .builder()
        .scheduler(scheduler.clone())
        .data(data)
        .batchpin(Arc::new(LedgerPinSubmitter::new(
            h.chain.as_ref(),
            h.operations.clone(),
        )))
        .build()
        .unwrap();
    let ctx = Context::background();

    let blob = manager
        .upload_blob(&ctx, "ns1", "report.pdf", b"%PDF-1.7 report".to_vec())
        .await
        .unwrap();
    let input = MessageInput {
        data: vec![
            InlineData {
                id: Some(blob.id),
                hash: Some(blob.hash),
                ..Default::default()
            },
            InlineData {
                value: Some(json!({"summary": "quarterly"})),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let msg = manager.broadcast_message(&ctx, "ns1", input, true).await.unwrap();
    assert_eq!(msg.state, MessageState::Sent);
    assert!(msg.batch.is_some());

    let pins = h.chain.pins();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].1.batch_id, msg.batch.unwrap());
    assert_eq!(pins[0].1.contexts.len(), 1);

    // Blob first, then the batch payload.
    let published = h.storage.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], b"%PDF-1.7 report".to_vec());

    let stored = h.db.get_data(&ctx, &blob.id).await.unwrap().unwrap();
    assert_eq!(
        stored.blob.unwrap().public.as_deref(),
        Some(common::ScriptedStorage::public_ref(b"%PDF-1.7 report").as_str())
    );
    cancel.cancel();
}
