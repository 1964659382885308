//! # mudgate
//!
//! Chat-to-MUD gateway with per-identity game sessions.
//!
//! This crate bridges a chat platform to a telnet-style MUD server.
//! Each chat identity gets its own remote session with automatic
//! account provisioning, and game output is captured by quiescence,
//! cleaned up, and fragmented to fit chat message limits.
//!
//! ## Features
//!
//! - **Per-identity sessions**: one lazy TCP connection per chat user,
//!   multiplexed through a shared registry with idle eviction
//! - **Quiescent capture**: end-of-response inferred from output silence,
//!   with burst extension and a hard ceiling
//! - **Safe fragmentation**: size-bounded chunks that never split ANSI
//!   escape sequences or UTF-8 characters
//! - **Async I/O**: non-blocking operations using tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mudgate::session::{QuiescenceTuning, SessionConfig, SessionRegistry};
//! use mudgate::transport::TcpConnector;
//!
//! #[tokio::main]
//! async fn main() -> mudgate::Result<()> {
//!     // Initialize logging
//!     mudgate::logging::try_init(None).ok();
//!
//!     let config = SessionConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 4000,
//!         idle_timeout: Duration::from_secs(3600),
//!         tuning: QuiescenceTuning::default(),
//!     };
//!     let registry = SessionRegistry::new(Arc::new(TcpConnector), config);
//!
//!     // One session per chat identity, created on first use
//!     let session = registry.get_or_create("alice")?;
//!     let login = session.ensure_logged_in("chat_alice", "pw_0123456789", true).await?;
//!     println!("created account: {}", login.created_account);
//!
//!     let output = session.run_command("look").await?;
//!     println!("{}", output);
//!
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod output;
pub mod session;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use classify::LoginVerdict;
pub use error::{GatewayError, Result};
pub use gateway::{ChatSink, Gateway, GatewayOptions, InboundMessage};
pub use output::{format_text, recover_text, strip_ansi, FormatOptions, TRUNCATION_NOTICE};
pub use session::{
    LoginOutcome, QuiescenceTuning, RemoteSession, SessionConfig, SessionRegistry,
};
pub use store::{CredentialStore, JsonFileStore, MemoryStore, UserRecord};
pub use transport::{Connector, TcpConnector, TransportPair};
