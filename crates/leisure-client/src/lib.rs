//! Leisure session client
//!
//! Talks to a document authority over HTTP and keeps a local chunk engine in
//! step with it.
//!
//! ```text
//!   SessionClient ──update──▶ authority     (long poll: anything pending?)
//!        │        ──edit────▶ authority     (batch in, diff out)
//!        ▼
//!   LiveDocument ──apply──▶ Engine (leisure-chunks)
//! ```
//!
//! The drive loop keeps at most one request outstanding. User edits and
//! binding writes go through [`LiveDocument`] and may interleave with it.

pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod live_document;
pub mod plain;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult, TransportError};
pub use live_document::LiveDocument;
pub use plain::PlainDocument;
pub use session::{Mode, SessionClient, SessionState, Update};
pub use transport::{HttpTransport, MemoryTransport, Method, Request, Transport};
