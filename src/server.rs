//! Accept loop, per-connection read loop and operation dispatch.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::conn::{ClientStream, Conn};
use crate::error::LdapError;
use crate::handler::{BaseHandler, Handler};
use crate::message::Message;
use crate::proto::{
    decode_abandon_request, decode_delete_request, AddRequest, BindRequest, CompareRequest,
    ExtendedRequest, ModifyDnRequest, ModifyRequest, SearchRequest, TAG_ABANDON_REQUEST,
    TAG_ADD_REQUEST, TAG_BIND_REQUEST, TAG_BIND_RESPONSE, TAG_COMPARE_REQUEST, TAG_DELETE_REQUEST,
    TAG_EXTENDED_REQUEST, TAG_MODIFY_DN_REQUEST, TAG_MODIFY_REQUEST, TAG_SEARCH_REQUEST,
    TAG_UNBIND_REQUEST,
};
use crate::result::{LdapResult, ResultCode};
use crate::tls;

/// An LDAP server: accept loop plus per-connection engine.
///
/// Single-use lifecycle: construct, optionally [`setup_tls`], then one of
/// the serve entry points, then [`shutdown`].
///
/// [`setup_tls`]: LdapServer::setup_tls
/// [`shutdown`]: LdapServer::shutdown
pub struct LdapServer {
    handler: Arc<dyn Handler>,
    /// TLS config for StartTLS and LDAPS connections.
    tls_config: Option<Arc<rustls::ServerConfig>>,
    shutdown_notify: Notify,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    serving: AtomicBool,
}

impl LdapServer {
    /// Create a server driving the given handler.
    pub fn new(handler: impl Handler + 'static) -> LdapServer {
        let (done_tx, done_rx) = watch::channel(false);
        LdapServer {
            handler: Arc::new(handler),
            tls_config: None,
            shutdown_notify: Notify::new(),
            done_tx,
            done_rx,
            serving: AtomicBool::new(false),
        }
    }

    /// Create a server with the default handler, which answers every
    /// request with `unwillingToPerform` but does handle StartTLS.
    pub fn with_base_handler() -> LdapServer {
        LdapServer::new(BaseHandler)
    }

    /// Load a PEM certificate and key to enable TLS connections
    /// (StartTLS upgrades and [`listen_and_serve_tls`]).
    ///
    /// [`listen_and_serve_tls`]: LdapServer::listen_and_serve_tls
    pub fn setup_tls(&mut self, cert_path: &str, key_path: &str) -> anyhow::Result<()> {
        self.tls_config = Some(tls::load_server_config(cert_path, key_path)?);
        Ok(())
    }

    /// Listen for cleartext connections on the given address. Clients
    /// may still upgrade with StartTLS when TLS is set up.
    pub async fn listen_and_serve(&self, address: &str) -> io::Result<()> {
        let listener = TcpListener::bind(address).await?;
        self.serve(listener).await
    }

    /// Listen for TLS-from-byte-zero (ldaps) connections on the given
    /// address. Requires [`LdapServer::setup_tls`] first.
    pub async fn listen_and_serve_tls(&self, address: &str) -> io::Result<()> {
        let config = self
            .tls_config
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "TLS config not set up"))?;
        let listener = TcpListener::bind(address).await?;
        self.serve_with(listener, Some(TlsAcceptor::from(config))).await
    }

    /// Run the accept loop on the given listener until [`shutdown`].
    ///
    /// [`shutdown`]: LdapServer::shutdown
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        self.serve_with(listener, None).await
    }

    async fn serve_with(
        &self,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> io::Result<()> {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "serve called more than once on the same server",
            ));
        }
        info!("LDAP server listening on {}", listener.local_addr()?);
        loop {
            tokio::select! {
                _ = self.shutdown_notify.notified() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            error!("accept error: {}", e);
                            continue;
                        }
                    };
                    debug!("new connection from {}", peer_addr);
                    let handler = Arc::clone(&self.handler);
                    let tls_config = self.tls_config.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        handle_accepted(stream, acceptor, tls_config, handler).await;
                    });
                }
            }
        }
        drop(listener);
        let _ = self.done_tx.send(true);
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already being served run to completion on their own
    /// tasks.
    pub async fn shutdown(&self) {
        if !self.serving.load(Ordering::SeqCst) {
            return;
        }
        self.shutdown_notify.notify_one();
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|exited| *exited).await;
    }
}

async fn handle_accepted(
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    handler: Arc<dyn Handler>,
) {
    let client_stream = match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => ClientStream::Tls(tls_stream),
            Err(e) => {
                warn!("TLS handshake failed: {}", e);
                return;
            }
        },
        None => ClientStream::Tcp(stream),
    };
    let conn = match Conn::new(client_stream, tls_config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            warn!("failed to set up connection: {}", e);
            return;
        }
    };
    handle_connection(handler, conn).await;
}

/// Per-connection read loop: one message at a time, dispatched per the
/// concurrency policy in [`handle_message`].
async fn handle_connection(handler: Arc<dyn Handler>, conn: Arc<Conn>) {
    loop {
        if conn.is_closed() {
            debug!("connection {} closed, discarding", conn.remote_addr());
            return;
        }
        let msg = tokio::select! {
            _ = conn.wait_closed() => return,
            res = conn.read_message() => match res {
                Ok(msg) => msg,
                Err(e) => {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        debug!("client {} disconnected", conn.remote_addr());
                    } else {
                        debug!("error reading message from {}: {}", conn.remote_addr(), e);
                        // A garbled stream is unrecoverable.
                        let _ = conn
                            .notify_disconnect(
                                ResultCode::PROTOCOL_ERROR,
                                "the server could not parse the request",
                            )
                            .await;
                    }
                    conn.close().await;
                    return;
                }
            },
        };
        handle_message(&handler, &conn, msg).await;
    }
}

/// Answer a request whose payload failed to decode: Notice of
/// Disconnection, then close.
async fn decode_failure(conn: &Conn, what: &str, e: LdapError) {
    debug!("error parsing {} request: {}", what, e);
    let _ = conn
        .notify_disconnect(ResultCode::PROTOCOL_ERROR, "the server could not parse the request")
        .await;
    conn.close().await;
}

/// Dispatch one message.
///
/// Add, Compare, Delete, Modify, ModifyDN and Search run on spawned
/// tasks holding the in-flight lock shared; Bind takes it exclusively so
/// it cannot overlap other operations. Abandon, Extended and unknown ops
/// stay on the reader task (StartTLS must finish before the next read).
async fn handle_message(handler: &Arc<dyn Handler>, conn: &Arc<Conn>, msg: Message) {
    match msg.op.tag {
        TAG_BIND_REQUEST => {
            debug!("bind request");
            let req = match BindRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Bind", e).await,
            };
            if req.version != 3 {
                debug!("unsupported protocol version {}", req.version);
                let _ = conn
                    .send_result(
                        msg.id,
                        Vec::new(),
                        TAG_BIND_RESPONSE,
                        &LdapResult::protocol_error(),
                    )
                    .await;
                return;
            }
            let _quiesce = conn.in_flight.write().await;
            handler.bind(Arc::clone(conn), &msg, req).await;
        }
        TAG_ABANDON_REQUEST => {
            debug!("abandon request");
            let _op = conn.in_flight.read().await;
            match decode_abandon_request(&msg.op.data) {
                Ok(message_id) => handler.abandon(Arc::clone(conn), &msg, message_id).await,
                Err(e) => decode_failure(conn, "Abandon", e).await,
            }
        }
        TAG_ADD_REQUEST => {
            debug!("add request");
            let req = match AddRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Add", e).await,
            };
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.add(Arc::clone(&conn), &msg, req).await;
            });
        }
        TAG_COMPARE_REQUEST => {
            debug!("compare request");
            let req = match CompareRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Compare", e).await,
            };
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.compare(Arc::clone(&conn), &msg, req).await;
            });
        }
        TAG_DELETE_REQUEST => {
            debug!("delete request");
            let dn = decode_delete_request(&msg.op.data);
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.delete(Arc::clone(&conn), &msg, dn).await;
            });
        }
        TAG_EXTENDED_REQUEST => {
            debug!("extended request");
            let req = match ExtendedRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Extended", e).await,
            };
            let _op = conn.in_flight.read().await;
            handler.extended(Arc::clone(conn), &msg, req).await;
        }
        TAG_MODIFY_REQUEST => {
            debug!("modify request");
            let req = match ModifyRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Modify", e).await,
            };
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.modify(Arc::clone(&conn), &msg, req).await;
            });
        }
        TAG_MODIFY_DN_REQUEST => {
            debug!("modifyDN request");
            let req = match ModifyDnRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "ModifyDN", e).await,
            };
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.modify_dn(Arc::clone(&conn), &msg, req).await;
            });
        }
        TAG_SEARCH_REQUEST => {
            debug!("search request");
            let req = match SearchRequest::decode(&msg.op.data) {
                Ok(req) => req,
                Err(e) => return decode_failure(conn, "Search", e).await,
            };
            let permit = Arc::clone(&conn.in_flight).read_owned().await;
            let handler = Arc::clone(handler);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let _permit = permit;
                handler.search(Arc::clone(&conn), &msg, req).await;
            });
        }
        TAG_UNBIND_REQUEST => {
            debug!("unbind request");
            conn.close().await;
        }
        other => {
            debug!("unknown operation type {}", other);
            let _op = conn.in_flight.read().await;
            handler.other(Arc::clone(conn), &msg).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber;
    use crate::message::{Encodable, Message};
    use crate::proto::{TAG_EXTENDED_RESPONSE, TAG_SEARCH_RESULT_DONE, TAG_SEARCH_RESULT_ENTRY};
    use crate::result::{ExtendedResult, ResultCode};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start_server(handler: impl Handler + 'static) -> (Arc<LdapServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(LdapServer::new(handler));
        let serve = Arc::clone(&server);
        tokio::spawn(async move {
            serve.serve(listener).await.unwrap();
        });
        (server, addr)
    }

    async fn read_one_message(stream: &mut TcpStream) -> Message {
        let mut buf = Vec::new();
        loop {
            if let Some(total) = ber::peek_element_len(&buf).unwrap() {
                if buf.len() >= total {
                    let frame: Vec<u8> = buf.drain(..total).collect();
                    return Message::decode(&frame).unwrap();
                }
            }
            let mut chunk = vec![0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed while waiting for a message");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn request(id: u32, tag: crate::ber::BerTag, payload: Vec<u8>) -> Vec<u8> {
        Message {
            id,
            op: crate::ber::RawElement { tag, data: payload },
            controls: Vec::new(),
        }
        .encode()
    }

    const SIMPLE_BIND: [u8; 14] = [
        0x30, 0x0c, 0x02, 0x01, 0x01, 0x60, 0x07, 0x02, 0x01, 0x03, 0x04, 0x00, 0x80, 0x00,
    ];

    #[tokio::test]
    async fn test_base_handler_bind_unwilling() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&SIMPLE_BIND).await.unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.id, 1);
        assert_eq!(msg.op.tag, TAG_BIND_RESPONSE);
        let res = LdapResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result_code, ResultCode::UNWILLING_TO_PERFORM);
    }

    #[tokio::test]
    async fn test_bind_version_two_rejected() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut bind = SIMPLE_BIND;
        bind[9] = 0x02; // version byte
        client.write_all(&bind).await.unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.op.tag, TAG_BIND_RESPONSE);
        let res = LdapResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result_code, ResultCode::PROTOCOL_ERROR);
    }

    #[tokio::test]
    async fn test_base_handler_search_unwilling() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let search = SearchRequest {
            base_object: "dc=example,dc=com".to_string(),
            scope: crate::proto::SearchScope::WholeSubtree,
            deref_aliases: crate::proto::DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: crate::filter::Filter::Present("objectClass".to_string()),
            attributes: Vec::new(),
        };
        client
            .write_all(&request(4, TAG_SEARCH_REQUEST, search.encode()))
            .await
            .unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.id, 4);
        assert_eq!(msg.op.tag, TAG_SEARCH_RESULT_DONE);
        let res = LdapResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result_code, ResultCode::UNWILLING_TO_PERFORM);
    }

    #[tokio::test]
    async fn test_unknown_extended_operation() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let req = ExtendedRequest {
            name: "1.2.3.4.5".to_string(),
            value: None,
        };
        client
            .write_all(&request(9, TAG_EXTENDED_REQUEST, req.encode()))
            .await
            .unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.op.tag, TAG_EXTENDED_RESPONSE);
        let res = ExtendedResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result.result_code, ResultCode::PROTOCOL_ERROR);
    }

    #[tokio::test]
    async fn test_start_tls_not_available() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let req = ExtendedRequest {
            name: crate::oid::START_TLS.to_string(),
            value: None,
        };
        client
            .write_all(&request(2, TAG_EXTENDED_REQUEST, req.encode()))
            .await
            .unwrap();
        let msg = read_one_message(&mut client).await;
        let res = ExtendedResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result.result_code, ResultCode::UNWILLING_TO_PERFORM);
        assert_eq!(res.response_name.as_deref(), Some(crate::oid::START_TLS));
    }

    #[tokio::test]
    async fn test_unbind_closes_connection() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&request(3, TAG_UNBIND_REQUEST, Vec::new()))
            .await
            .unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "expected EOF after unbind");
    }

    #[tokio::test]
    async fn test_garbage_gets_notice_of_disconnection() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        // An octet string is not an LDAPMessage.
        client.write_all(&[0x04, 0x02, 0x61, 0x62]).await.unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.id, 0);
        assert_eq!(msg.op.tag, TAG_EXTENDED_RESPONSE);
        let res = ExtendedResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result.result_code, ResultCode::PROTOCOL_ERROR);
        assert_eq!(
            res.response_name.as_deref(),
            Some(crate::oid::NOTICE_OF_DISCONNECTION)
        );
        // The connection is closed afterward.
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_abandon_produces_no_response() {
        let (_server, addr) = start_server(BaseHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&request(6, TAG_ABANDON_REQUEST, ber::encode_integer_raw(5)))
            .await
            .unwrap();
        // A follow-up bind is still answered; nothing was sent for the
        // abandon itself.
        client.write_all(&SIMPLE_BIND).await.unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.id, 1);
        assert_eq!(msg.op.tag, TAG_BIND_RESPONSE);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (server, addr) = start_server(BaseHandler).await;
        // Make sure the loop is up before shutting down.
        let probe = TcpStream::connect(addr).await.unwrap();
        drop(probe);
        server.shutdown().await;
        // Connecting now either fails outright or yields a dead socket.
        match TcpStream::connect(addr).await {
            Err(_) => {}
            Ok(mut stream) => {
                stream.write_all(&SIMPLE_BIND).await.ok();
                let mut buf = [0u8; 16];
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => {}
                    Ok(n) => panic!("server answered {} bytes after shutdown", n),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_without_serve_returns() {
        let server = LdapServer::with_base_handler();
        server.shutdown().await;
    }

    /// A handler whose search stalls before answering, to observe the
    /// bind quiesce: the bind response must come after the search
    /// completes.
    struct SlowSearchHandler;

    #[async_trait::async_trait]
    impl Handler for SlowSearchHandler {
        async fn bind(&self, conn: Arc<Conn>, msg: &Message, _req: BindRequest) {
            let _ = conn
                .send_result(
                    msg.id,
                    Vec::new(),
                    TAG_BIND_RESPONSE,
                    &ResultCode::SUCCESS.as_result(""),
                )
                .await;
        }

        async fn search(&self, conn: Arc<Conn>, msg: &Message, _req: SearchRequest) {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let entry = crate::proto::SearchResultEntry {
                object_name: "dc=example,dc=com".to_string(),
                attributes: Vec::new(),
            };
            let _ = conn
                .send_result(msg.id, Vec::new(), TAG_SEARCH_RESULT_ENTRY, &entry)
                .await;
            let _ = conn
                .send_result(
                    msg.id,
                    Vec::new(),
                    TAG_SEARCH_RESULT_DONE,
                    &ResultCode::SUCCESS.as_result(""),
                )
                .await;
        }
    }

    /// Exercises the handler-owned connection slots: bind records the
    /// authenticated DN, abandon flags the target operation in the
    /// message cache, and search reports both.
    struct SlotHandler;

    #[async_trait::async_trait]
    impl Handler for SlotHandler {
        async fn bind(&self, conn: Arc<Conn>, msg: &Message, req: BindRequest) {
            *conn.authentication.lock().unwrap() = Some(Box::new(req.name));
            let _ = conn
                .send_result(
                    msg.id,
                    Vec::new(),
                    TAG_BIND_RESPONSE,
                    &ResultCode::SUCCESS.as_result(""),
                )
                .await;
        }

        async fn abandon(&self, conn: Arc<Conn>, _msg: &Message, message_id: crate::MessageId) {
            conn.message_cache
                .lock()
                .unwrap()
                .insert(message_id, Box::new(true));
        }

        async fn search(&self, conn: Arc<Conn>, msg: &Message, _req: SearchRequest) {
            let who = conn
                .authentication
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|a| a.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            let abandoned = conn.message_cache.lock().unwrap().contains_key(&msg.id);
            let _ = conn
                .send_result(
                    msg.id,
                    Vec::new(),
                    TAG_SEARCH_RESULT_DONE,
                    &ResultCode::SUCCESS.as_result(format!("{} abandoned={}", who, abandoned)),
                )
                .await;
        }
    }

    #[tokio::test]
    async fn test_handler_owned_connection_slots() {
        let (_server, addr) = start_server(SlotHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let bind = BindRequest {
            version: 3,
            name: "uid=jdoe,ou=People,dc=example,dc=com".to_string(),
            credentials: crate::proto::BindCredentials::Simple("secret123".to_string()),
        };
        client
            .write_all(&request(1, TAG_BIND_REQUEST, bind.encode()))
            .await
            .unwrap();
        let bind_res = read_one_message(&mut client).await;
        assert_eq!(bind_res.op.tag, TAG_BIND_RESPONSE);

        // Mark message 7 abandoned before issuing it.
        client
            .write_all(&request(2, TAG_ABANDON_REQUEST, ber::encode_integer_raw(7)))
            .await
            .unwrap();
        let search = SearchRequest {
            base_object: "dc=example,dc=com".to_string(),
            scope: crate::proto::SearchScope::WholeSubtree,
            deref_aliases: crate::proto::DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: crate::filter::Filter::Present("objectClass".to_string()),
            attributes: Vec::new(),
        };
        client
            .write_all(&request(7, TAG_SEARCH_REQUEST, search.encode()))
            .await
            .unwrap();
        let msg = read_one_message(&mut client).await;
        assert_eq!(msg.id, 7);
        let res = LdapResult::decode(&msg.op.data).unwrap();
        assert_eq!(
            res.diagnostic_message,
            "uid=jdoe,ou=People,dc=example,dc=com abandoned=true"
        );
    }

    #[tokio::test]
    async fn test_bind_waits_for_in_flight_operations() {
        let (_server, addr) = start_server(SlowSearchHandler).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let search = SearchRequest {
            base_object: "dc=example,dc=com".to_string(),
            scope: crate::proto::SearchScope::BaseObject,
            deref_aliases: crate::proto::DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: crate::filter::Filter::Present("objectClass".to_string()),
            attributes: Vec::new(),
        };
        client
            .write_all(&request(10, TAG_SEARCH_REQUEST, search.encode()))
            .await
            .unwrap();
        client.write_all(&SIMPLE_BIND).await.unwrap();

        // The search entry and done precede the bind response even
        // though the search stalls: bind quiesces until it finishes.
        let first = read_one_message(&mut client).await;
        assert_eq!(first.id, 10);
        assert_eq!(first.op.tag, TAG_SEARCH_RESULT_ENTRY);
        let second = read_one_message(&mut client).await;
        assert_eq!(second.id, 10);
        assert_eq!(second.op.tag, TAG_SEARCH_RESULT_DONE);
        let third = read_one_message(&mut client).await;
        assert_eq!(third.id, 1);
        assert_eq!(third.op.tag, TAG_BIND_RESPONSE);
        let res = LdapResult::decode(&third.op.data).unwrap();
        assert_eq!(res.result_code, ResultCode::SUCCESS);
    }
}
