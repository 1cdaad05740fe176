//! Definition broadcasts: datatypes, namespaces, identity claims and token pools.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::broadcast::manager::BroadcastManager;
use crate::context::Context;
use crate::data::DEFAULT_VALIDATOR;
use crate::error::BroadcastError;
use crate::model::{
    validate_name, Bytes32, Data, Datatype, Definition, IdentityClaim, InlineData, Message,
    MessageHeaderInput, MessageInput, MessageType, NamespaceDef, NamespaceType, SignerRef,
    TokenPoolAnnouncement, DEFINITION_VALIDATOR, SYSTEM_NAMESPACE, TAG_DEFINE_DATATYPE,
    TAG_DEFINE_NAMESPACE, TAG_DEFINE_POOL,
};

fn invalid(field: &str, e: String) -> BroadcastError {
    BroadcastError::InvalidInput(format!("{}: {}", field, e))
}

impl BroadcastManager {
    /// Serialize `def` into a definition data record and send it as a
    /// definition message. `signer` is resolved unless `resolve_signer` is
    /// false.
    #[allow(clippy::too_many_arguments)]
    async fn broadcast_definition_common<D: Definition>(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        def: &mut D,
        signer: SignerRef,
        tag: &str,
        resolve_signer: bool,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        let msg_id = Uuid::new_v4();
        def.set_broadcast_message(msg_id);

        let value = serde_json::to_value(&*def)?;
        let data = Data::from_value(namespace, DEFINITION_VALIDATOR, value)?;
        self.database
            .insert_data(ctx, &data)
            .await
            .map_err(BroadcastError::Persistence)?;

        let input = MessageInput {
            header: MessageHeaderInput {
                msg_type: Some(MessageType::Definition),
                signer,
                topics: vec![def.topic()],
                tag: tag.to_string(),
                ..Default::default()
            },
            data: vec![InlineData {
                id: Some(data.id),
                hash: Some(data.hash),
                ..Default::default()
            }],
        };

        let mut sender = self.new_broadcast(namespace, input).with_id(msg_id);
        if !resolve_signer {
            sender = sender.without_signer_resolution();
        }
        tracing::debug!(message = %msg_id, namespace = %namespace, tag = %tag, "Broadcasting definition");
        if wait_confirm {
            sender.send_and_wait(ctx).await
        } else {
            sender.send(ctx).await
        }
    }

    /// Broadcast a definition signed by this node's own identity.
    pub async fn broadcast_definition_as_node<D: Definition>(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        def: &mut D,
        tag: &str,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        let signer = self.identity.node_signer(ctx, namespace).await?;
        self.broadcast_definition_common(ctx, namespace, def, signer, tag, true, wait_confirm)
            .await
    }

    /// Broadcast a definition signed by `signer`, or by the node's default
    /// identity when `None`.
    pub async fn broadcast_definition<D: Definition>(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        def: &mut D,
        signer: Option<SignerRef>,
        tag: &str,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        self.broadcast_definition_common(
            ctx,
            namespace,
            def,
            signer.unwrap_or_default(),
            tag,
            true,
            wait_confirm,
        )
        .await
    }

    /// Broadcast the claim of a new identity. The claimed identity cannot
    /// be resolved yet, so the supplied signing key is used as is.
    pub async fn broadcast_identity_claim(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        claim: &mut IdentityClaim,
        signer: SignerRef,
        tag: &str,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        if signer.key.is_empty() {
            return Err(BroadcastError::Identity(format!(
                "signing key is required to claim identity '{}'",
                claim.identity.did
            )));
        }
        validate_name(&claim.identity.name).map_err(|e| invalid("identity.name", e))?;
        self.broadcast_definition_common(ctx, namespace, claim, signer, tag, false, wait_confirm)
            .await
    }

    /// Validate and broadcast a datatype.
    pub async fn broadcast_datatype(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        datatype: &mut Datatype,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        validate_name(namespace).map_err(|e| invalid("namespace", e))?;
        validate_name(&datatype.name).map_err(|e| invalid("name", e))?;
        if datatype.version.is_empty() {
            return Err(BroadcastError::InvalidInput("version is required".to_string()));
        }
        let value = datatype
            .value
            .as_ref()
            .ok_or_else(|| BroadcastError::InvalidInput("value is required".to_string()))?;

        datatype.id = Some(Uuid::new_v4());
        datatype.created = Some(Utc::now());
        datatype.namespace = namespace.to_string();
        datatype.hash = Some(Bytes32::hash(serde_json::to_vec(value)?));
        if datatype.validator.is_empty() {
            datatype.validator = DEFAULT_VALIDATOR.to_string();
        }

        self.broadcast_definition_as_node(ctx, namespace, datatype, TAG_DEFINE_DATATYPE, wait_confirm)
            .await
    }

    /// Validate and broadcast a namespace on the system namespace.
    pub async fn broadcast_namespace(
        self: &Arc<Self>,
        ctx: &Context,
        ns: &mut NamespaceDef,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        validate_name(&ns.name).map_err(|e| invalid("name", e))?;
        if ns.description.chars().count() > 4096 {
            return Err(BroadcastError::InvalidInput(
                "description must be at most 4096 characters".to_string(),
            ));
        }
        ns.id = Some(Uuid::new_v4());
        ns.created = Some(Utc::now());
        ns.ns_type = NamespaceType::Broadcast;

        self.broadcast_definition_as_node(ctx, SYSTEM_NAMESPACE, ns, TAG_DEFINE_NAMESPACE, wait_confirm)
            .await
    }

    /// Announce a token pool to the other members of its namespace.
    pub async fn broadcast_token_pool(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        announcement: &mut TokenPoolAnnouncement,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        let pool = &mut announcement.pool;
        validate_name(&pool.name).map_err(|e| invalid("pool.name", e))?;
        if pool.namespace.is_empty() {
            pool.namespace = namespace.to_string();
        } else if pool.namespace != namespace {
            return Err(BroadcastError::InvalidInput(format!(
                "pool namespace '{}' does not match '{}'",
                pool.namespace, namespace
            )));
        }
        if pool.id.is_none() {
            pool.id = Some(Uuid::new_v4());
        }

        self.broadcast_definition_as_node(ctx, namespace, announcement, TAG_DEFINE_POOL, wait_confirm)
            .await
    }
}
