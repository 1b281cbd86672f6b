//! The handler contract: the framework's sole extension point.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ber::BerTag;
use crate::conn::Conn;
use crate::message::{Message, MessageId};
use crate::oid;
use crate::proto::{
    AddRequest, BindRequest, CompareRequest, ExtendedRequest, ModifyDnRequest, ModifyRequest,
    SearchRequest, TAG_ADD_RESPONSE, TAG_BIND_RESPONSE, TAG_COMPARE_RESPONSE, TAG_DELETE_RESPONSE,
    TAG_EXTENDED_RESPONSE, TAG_MODIFY_DN_RESPONSE, TAG_MODIFY_RESPONSE, TAG_SEARCH_RESULT_DONE,
};
use crate::result::{ExtendedResult, LdapResult, ResultCode};

/// Implemented by applications to supply directory semantics.
///
/// Every method has a default that answers with `unwillingToPerform`, so
/// implementers override only what they support. The default `extended`
/// handles StartTLS.
///
/// Concurrency: `add`, `compare`, `delete`, `modify`, `modify_dn` and
/// `search` run on their own tasks and may overlap on one connection.
/// `bind`, `abandon`, `extended` and `other` run on the connection's
/// reader task. No callback overlaps a `bind` on the same connection.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Abandon the operation with the given message ID. The engine keeps
    /// no per-operation state; implementers track cancellation through
    /// [`Conn::message_cache`].
    async fn abandon(&self, _conn: Arc<Conn>, _msg: &Message, _message_id: MessageId) {
        // Abandon has no result.
    }

    async fn add(&self, conn: Arc<Conn>, msg: &Message, _req: AddRequest) {
        let _ = conn
            .send_result(msg.id, Vec::new(), TAG_ADD_RESPONSE, &LdapResult::unwilling_to_perform())
            .await;
    }

    async fn bind(&self, conn: Arc<Conn>, msg: &Message, _req: BindRequest) {
        let _ = conn
            .send_result(msg.id, Vec::new(), TAG_BIND_RESPONSE, &LdapResult::unwilling_to_perform())
            .await;
    }

    async fn compare(&self, conn: Arc<Conn>, msg: &Message, _req: CompareRequest) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                TAG_COMPARE_RESPONSE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    async fn delete(&self, conn: Arc<Conn>, msg: &Message, _dn: String) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                TAG_DELETE_RESPONSE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    /// Handle an Extended request. Implementers wanting their own
    /// extended operations should fall back to this default (or to
    /// [`Handler::start_tls`]) for the StartTLS OID.
    async fn extended(&self, conn: Arc<Conn>, msg: &Message, req: ExtendedRequest) {
        match req.name.as_str() {
            oid::START_TLS => self.start_tls(conn, msg).await,
            _ => {
                debug!("unknown extended request: {}", req.name);
                let res = ExtendedResult {
                    result: ResultCode::PROTOCOL_ERROR
                        .as_result("the requested Extended operation is not supported"),
                    ..Default::default()
                };
                let _ = conn
                    .send_result(msg.id, Vec::new(), TAG_EXTENDED_RESPONSE, &res)
                    .await;
            }
        }
    }

    async fn modify(&self, conn: Arc<Conn>, msg: &Message, _req: ModifyRequest) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                TAG_MODIFY_RESPONSE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    async fn modify_dn(&self, conn: Arc<Conn>, msg: &Message, _req: ModifyDnRequest) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                TAG_MODIFY_DN_RESPONSE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    async fn search(&self, conn: Arc<Conn>, msg: &Message, _req: SearchRequest) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                TAG_SEARCH_RESULT_DONE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    /// Called for protocol-op tags the engine does not recognize.
    async fn other(&self, conn: Arc<Conn>, msg: &Message) {
        let _ = conn
            .send_result(
                msg.id,
                Vec::new(),
                BerTag::SEQUENCE,
                &LdapResult::unwilling_to_perform(),
            )
            .await;
    }

    /// Handle a StartTLS extended request.
    ///
    /// The success response is flushed before the handshake starts; the
    /// client must see it on the cleartext stream.
    async fn start_tls(&self, conn: Arc<Conn>, msg: &Message) {
        let mut res = ExtendedResult {
            result: ResultCode::SUCCESS.as_result(""),
            response_name: Some(oid::START_TLS.to_string()),
            response_value: None,
        };
        if conn.is_tls() {
            debug!("TLS is already set up on this connection");
            res.result =
                ResultCode::OPERATIONS_ERROR.as_result("TLS is already set up on this connection");
        } else if !conn.tls_available() {
            debug!("TLS not available for StartTLS");
            res.result =
                ResultCode::UNWILLING_TO_PERFORM.as_result("TLS is not available for StartTLS");
        }
        let upgrade = res.result.result_code == ResultCode::SUCCESS;
        if conn
            .send_result(msg.id, Vec::new(), TAG_EXTENDED_RESPONSE, &res)
            .await
            .is_err()
        {
            conn.close().await;
            return;
        }
        if upgrade {
            if let Err(e) = conn.start_tls().await {
                warn!("StartTLS failed, closing connection: {}", e);
                conn.close().await;
            }
        }
    }
}

/// Basic server functionality: answers every request with
/// `unwillingToPerform` and handles StartTLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseHandler;

#[async_trait]
impl Handler for BaseHandler {}
