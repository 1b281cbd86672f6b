//! Per-connection state: framing, the send path, StartTLS and the Bind
//! quiesce lock.

use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::ber::{self, BerTag, RawElement};
use crate::error::{ErrorKind, LdapError};
use crate::message::{Control, Encodable, Message, MessageId};
use crate::oid;
use crate::proto::TAG_EXTENDED_RESPONSE;
use crate::result::{ExtendedResult, ResultCode};

/// Client stream as accepted: plain TCP or TLS from byte zero.
pub(crate) enum ClientStream {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
}

/// Read half of a client stream.
enum ClientReadHalf {
    Tcp(OwnedReadHalf),
    Tls(tokio::io::ReadHalf<TlsStream<TcpStream>>),
}

/// Write half of a client stream.
enum ClientWriteHalf {
    Tcp(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

impl AsyncRead for ClientReadHalf {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            ClientReadHalf::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            ClientReadHalf::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientWriteHalf {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            ClientWriteHalf::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            ClientWriteHalf::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            ClientWriteHalf::Tcp(s) => Pin::new(s).poll_flush(cx),
            ClientWriteHalf::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            ClientWriteHalf::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            ClientWriteHalf::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Reader-side state: the read half plus the framing buffer. Guarded by
/// one mutex so the TLS upgrade can swap the half and the buffer stays
/// with it.
struct ConnReader {
    half: Option<ClientReadHalf>,
    buf: BytesMut,
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

/// One client connection.
///
/// The engine drives exactly one reader; any number of tasks may send
/// concurrently (the writer mutex serializes the bytes). The
/// `authentication` and `message_cache` slots belong to the handler; the
/// engine never touches them.
pub struct Conn {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    reader: Mutex<ConnReader>,
    /// The send mutex. Bytes from concurrent send calls never interleave.
    writer: Mutex<Option<ClientWriteHalf>>,
    /// Held shared by reads and sends, exclusively while upgrading to TLS.
    tls_upgrading: RwLock<()>,
    is_tls: AtomicBool,
    closed: AtomicBool,
    closed_notify: Notify,
    /// Read guards are in-flight operations; the write guard is the Bind
    /// quiesce point.
    pub(crate) in_flight: Arc<RwLock<()>>,
    /// Handler-owned authentication state.
    pub authentication: std::sync::Mutex<Option<Box<dyn Any + Send>>>,
    /// Handler-owned per-message state enabling Abandon bookkeeping.
    pub message_cache: std::sync::Mutex<HashMap<MessageId, Box<dyn Any + Send>>>,
}

impl Conn {
    pub(crate) fn new(
        stream: ClientStream,
        tls_config: Option<Arc<rustls::ServerConfig>>,
    ) -> io::Result<Conn> {
        let (local_addr, peer_addr) = match &stream {
            ClientStream::Tcp(s) => (s.local_addr()?, s.peer_addr()?),
            ClientStream::Tls(s) => {
                let tcp = s.get_ref().0;
                (tcp.local_addr()?, tcp.peer_addr()?)
            }
        };
        let (read_half, write_half, is_tls) = match stream {
            ClientStream::Tcp(s) => {
                let (r, w) = s.into_split();
                (ClientReadHalf::Tcp(r), ClientWriteHalf::Tcp(w), false)
            }
            ClientStream::Tls(s) => {
                let (r, w) = tokio::io::split(s);
                (ClientReadHalf::Tls(r), ClientWriteHalf::Tls(w), true)
            }
        };
        Ok(Conn {
            local_addr,
            peer_addr,
            tls_config,
            reader: Mutex::new(ConnReader {
                half: Some(read_half),
                buf: BytesMut::with_capacity(4096),
            }),
            writer: Mutex::new(Some(write_half)),
            tls_upgrading: RwLock::new(()),
            is_tls: AtomicBool::new(is_tls),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            in_flight: Arc::new(RwLock::new(())),
            authentication: std::sync::Mutex::new(None),
            message_cache: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the underlying connection has TLS set up.
    pub fn is_tls(&self) -> bool {
        self.is_tls.load(Ordering::SeqCst)
    }

    /// Whether a TLS config was supplied for StartTLS upgrades.
    pub fn tls_available(&self) -> bool {
        self.tls_config.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the connection: the reader unblocks and exits, and later
    /// sends fail. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed_notify.notify_waiters();
        let mut writer = self.writer.lock().await;
        if let Some(mut half) = writer.take() {
            let _ = half.shutdown().await;
        }
    }

    /// Resolves once [`Conn::close`] has been called.
    pub(crate) async fn wait_closed(&self) {
        loop {
            let notified = self.closed_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Read one LDAPMessage off the connection.
    ///
    /// Takes the TLS-upgrade barrier in shared mode for the duration of
    /// the read; decode errors surface as `InvalidData` wrapping the
    /// [`LdapError`].
    pub(crate) async fn read_message(&self) -> io::Result<Message> {
        let _tls_guard = self.tls_upgrading.read().await;
        let mut reader = self.reader.lock().await;
        let reader = &mut *reader;
        let half = reader.half.as_mut().ok_or_else(not_connected)?;
        loop {
            match ber::peek_element_len(&reader.buf) {
                Ok(Some(total)) if reader.buf.len() >= total => {
                    let frame = reader.buf.split_to(total);
                    return Ok(Message::decode(&frame)?);
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
            let n = half.read_buf(&mut reader.buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
        }
    }

    /// Send an LDAPMessage, serialized against concurrent senders.
    pub async fn send_message(&self, msg: &Message) -> io::Result<()> {
        let data = msg.encode();
        let _tls_guard = self.tls_upgrading.read().await;
        let mut writer = self.writer.lock().await;
        let half = writer.as_mut().ok_or_else(not_connected)?;
        half.write_all(&data).await?;
        half.flush().await
    }

    /// Send a response payload under the given protocol-op tag.
    pub async fn send_result(
        &self,
        message_id: MessageId,
        controls: Vec<Control>,
        op_tag: BerTag,
        res: &dyn Encodable,
    ) -> io::Result<()> {
        let msg = Message {
            id: message_id,
            op: RawElement {
                tag: op_tag,
                data: res.encode(),
            },
            controls,
        };
        self.send_message(&msg).await
    }

    /// Send an Extended Result with message ID 0.
    pub async fn send_unsolicited(
        &self,
        result_code: ResultCode,
        diagnostic: &str,
        oid: &str,
        value: Option<Vec<u8>>,
    ) -> io::Result<()> {
        let res = ExtendedResult {
            result: result_code.as_result(diagnostic),
            response_name: Some(oid.to_string()),
            response_value: value,
        };
        self.send_result(0, Vec::new(), TAG_EXTENDED_RESPONSE, &res).await
    }

    /// Send a Notice of Disconnection to the client.
    pub async fn notify_disconnect(
        &self,
        result_code: ResultCode,
        diagnostic: &str,
    ) -> io::Result<()> {
        self.send_unsolicited(result_code, diagnostic, oid::NOTICE_OF_DISCONNECTION, None)
            .await
    }

    /// Upgrade the connection to TLS in place.
    ///
    /// Takes the upgrade barrier exclusively, so it waits for in-progress
    /// reads and sends to finish and blocks new ones until the handshake
    /// is done. The caller must have flushed the StartTLS success
    /// response first; the client expects it before the handshake bytes.
    pub async fn start_tls(&self) -> io::Result<()> {
        let _guard = self.tls_upgrading.write().await;
        if self.is_tls() {
            return Err(LdapError::from(ErrorKind::TlsAlreadySetUp).into());
        }
        let config = match self.tls_config.clone() {
            Some(c) => c,
            None => return Err(LdapError::from(ErrorKind::TlsNotAvailable).into()),
        };
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;
        let read_half = reader.half.take().ok_or_else(not_connected)?;
        let write_half = match writer.take() {
            Some(h) => h,
            None => return Err(not_connected()),
        };
        let (r, w) = match (read_half, write_half) {
            (ClientReadHalf::Tcp(r), ClientWriteHalf::Tcp(w)) => (r, w),
            // Halves are only ever swapped under the exclusive barrier,
            // and is_tls was false above.
            _ => unreachable!("plaintext connection with TLS stream halves"),
        };
        let stream = r
            .reunite(w)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mismatched stream halves"))?;
        let tls_stream = match TlsAcceptor::from(config).accept(stream).await {
            Ok(s) => s,
            Err(e) => {
                // The socket was consumed by the failed handshake.
                debug!("TLS handshake failed for {}: {}", self.peer_addr, e);
                self.closed.store(true, Ordering::SeqCst);
                self.closed_notify.notify_waiters();
                return Err(e);
            }
        };
        let (r, w) = tokio::io::split(tls_stream);
        reader.half = Some(ClientReadHalf::Tls(r));
        *writer = Some(ClientWriteHalf::Tls(w));
        self.is_tls.store(true, Ordering::SeqCst);
        debug!("TLS upgrade completed for {}", self.peer_addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::LdapResult;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_read_message_reassembles_partial_writes() {
        let (mut client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();

        let bind = [
            0x30, 0x0c, 0x02, 0x01, 0x01, 0x60, 0x07, 0x02, 0x01, 0x03, 0x04, 0x00, 0x80, 0x00,
        ];
        client.write_all(&bind[..5]).await.unwrap();
        client.flush().await.unwrap();
        let read_task = conn.read_message();
        client.write_all(&bind[5..]).await.unwrap();
        client.flush().await.unwrap();
        let msg = read_task.await.unwrap();
        assert_eq!(msg.id, 1);
        assert_eq!(msg.op.tag, crate::proto::TAG_BIND_REQUEST);
    }

    #[tokio::test]
    async fn test_read_message_two_messages_in_one_write() {
        let (mut client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();

        let abandon = [0x30, 0x06, 0x02, 0x01, 0x06, 0x50, 0x01, 0x05];
        let unbind = [0x30, 0x05, 0x02, 0x01, 0x07, 0x42, 0x00];
        let mut both = Vec::new();
        both.extend_from_slice(&abandon);
        both.extend_from_slice(&unbind);
        client.write_all(&both).await.unwrap();

        let first = conn.read_message().await.unwrap();
        assert_eq!(first.id, 6);
        let second = conn.read_message().await.unwrap();
        assert_eq!(second.id, 7);
        assert_eq!(second.op.tag, crate::proto::TAG_UNBIND_REQUEST);
    }

    #[tokio::test]
    async fn test_read_message_decode_error() {
        let (mut client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();

        client.write_all(&[0x04, 0x02, 0x61, 0x62]).await.unwrap();
        let err = conn.read_message().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_message_tls_hello() {
        let (mut client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();

        client.write_all(&[0x16, 0x03, 0x01, 0x02, 0x00]).await.unwrap();
        let err = conn.read_message().await.unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<LdapError>()).unwrap();
        assert_eq!(inner.kind(), ErrorKind::TlsClientHello);
    }

    #[tokio::test]
    async fn test_send_result_bytes() {
        let (client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();

        conn.send_result(
            3,
            Vec::new(),
            crate::proto::TAG_ADD_RESPONSE,
            &ResultCode::SUCCESS.as_result(""),
        )
        .await
        .unwrap();

        let mut client = client;
        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(
            &buf[..n],
            &[0x30, 0x0c, 0x02, 0x01, 0x03, 0x69, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00]
        );
    }

    #[tokio::test]
    async fn test_sends_do_not_interleave() {
        let (client, server) = tcp_pair().await;
        let conn = Arc::new(Conn::new(ClientStream::Tcp(server), None).unwrap());

        let mut tasks = Vec::new();
        for id in 1..=20u32 {
            let conn = Arc::clone(&conn);
            tasks.push(tokio::spawn(async move {
                let res = LdapResult {
                    result_code: ResultCode::SUCCESS,
                    matched_dn: String::new(),
                    diagnostic_message: format!("response number {}", id),
                    referral: Vec::new(),
                };
                conn.send_result(id, Vec::new(), crate::proto::TAG_ADD_RESPONSE, &res)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(conn);

        let mut client = client;
        let mut data = Vec::new();
        client.read_to_end(&mut data).await.unwrap();
        let mut seen = 0;
        let mut rest = data.as_slice();
        while !rest.is_empty() {
            let element = ber::read_element(&mut rest).unwrap();
            let msg = Message::from_element(element).unwrap();
            let res = LdapResult::decode(&msg.op.data).unwrap();
            assert_eq!(res.diagnostic_message, format!("response number {}", msg.id));
            seen += 1;
        }
        assert_eq!(seen, 20);
    }

    #[tokio::test]
    async fn test_close_unblocks_and_fails_sends() {
        let (_client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();
        assert!(!conn.is_closed());
        conn.close().await;
        assert!(conn.is_closed());
        conn.close().await; // idempotent
        let err = conn
            .send_result(1, Vec::new(), crate::proto::TAG_ADD_RESPONSE, &LdapResult::protocol_error())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_start_tls_without_config() {
        let (_client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();
        assert!(!conn.tls_available());
        let err = conn.start_tls().await.unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<LdapError>()).unwrap();
        assert_eq!(inner.kind(), ErrorKind::TlsNotAvailable);
    }

    #[tokio::test]
    async fn test_notify_disconnect_wire_form() {
        let (client, server) = tcp_pair().await;
        let conn = Conn::new(ClientStream::Tcp(server), None).unwrap();
        conn.notify_disconnect(ResultCode::PROTOCOL_ERROR, "invalid PDU")
            .await
            .unwrap();
        drop(conn);

        let mut client = client;
        let mut data = Vec::new();
        client.read_to_end(&mut data).await.unwrap();
        let msg = Message::decode(&data).unwrap();
        assert_eq!(msg.id, 0);
        assert_eq!(msg.op.tag, TAG_EXTENDED_RESPONSE);
        let res = ExtendedResult::decode(&msg.op.data).unwrap();
        assert_eq!(res.result.result_code, ResultCode::PROTOCOL_ERROR);
        assert_eq!(res.result.diagnostic_message, "invalid PDU");
        assert_eq!(res.response_name.as_deref(), Some(oid::NOTICE_OF_DISCONNECTION));
    }
}
