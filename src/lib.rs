//! Embeddable LDAPv3 server framework.
//!
//! The framework owns the wire: BER codec, message framing, protocol
//! validation, per-connection concurrency, StartTLS and graceful
//! shutdown. Directory semantics (authentication, storage, search) are
//! supplied by a [`Handler`] implementation.
//!
//! ```no_run
//! use ldap_server::{BaseHandler, LdapServer};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = LdapServer::new(BaseHandler);
//!     server.listen_and_serve("0.0.0.0:389").await
//! }
//! ```

pub mod ber;
pub mod conn;
pub mod dn;
pub mod error;
pub mod filter;
pub mod handler;
pub mod message;
pub mod oid;
pub mod proto;
pub mod result;
pub mod server;
pub mod tls;

pub use conn::Conn;
pub use dn::{Dn, Rdn, RdnAttribute};
pub use error::{ErrorKind, LdapError};
pub use filter::{Filter, MatchingRuleAssertion, SubstringFilter};
pub use handler::{BaseHandler, Handler};
pub use message::{Control, Encodable, Message, MessageId};
pub use proto::{
    AddRequest, Attribute, AttributeValueAssertion, BindCredentials, BindRequest, CompareRequest,
    DerefAliases, ExtendedRequest, ModifyChange, ModifyDnRequest, ModifyOperation, ModifyRequest,
    SearchRequest, SearchResultEntry, SearchResultReference, SearchScope,
};
pub use result::{BindResult, ExtendedResult, IntermediateResponse, LdapResult, ResultCode};
pub use server::LdapServer;
