//! Asterisk Gateway Interface (AGI) and FastAGI for Rust
//!
//! This crate speaks the AGI line protocol that Asterisk uses to hand a call
//! to an external program, either over the program's stdin/stdout (classic
//! AGI) or over TCP (FastAGI, `agi://host:4573/...`).
//!
//! # Architecture
//!
//! - [`AgiSession`] owns one call's stream. It reads the `agi_*` environment
//!   block on creation, then runs one command at a time: write a line, read
//!   exactly one reply, under a deadline.
//! - [`Response`] is a parsed reply (`200 result=1 (value) endpos=...`).
//! - [`FastAgiServer`] accepts TCP connections, handshakes each, and hands
//!   sessions to a [`SessionStream`].
//!
//! # Examples
//!
//! ## Classic AGI
//!
//! Asterisk runs the program from the dialplan with
//! `same => n,AGI(/usr/local/bin/my-agi)`:
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiEnv, AgiError, AgiOptions, AgiSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let mut agi = AgiSession::stdio(&AgiOptions::default()).await?;
//!
//!     let caller = agi.env(AgiEnv::CallerId).unwrap_or("unknown").to_string();
//!     agi.answer().await?;
//!     agi.verbose(&format!("call from {}", caller)).await?;
//!
//!     if let Some(pin) = agi.database_get("pins", &caller).await? {
//!         agi.set_variable("EXPECTED_PIN", &pin).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## FastAGI
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiError, FastAgiOptions, FastAgiServer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let (server, mut sessions) =
//!         FastAgiServer::bind("0.0.0.0:4573", FastAgiOptions::default()).await?;
//!
//!     while let Some(mut agi) = sessions.recv().await {
//!         tokio::spawn(async move {
//!             // playback blocks until the file ends
//!             agi.set_command_timeout(Duration::from_secs(60));
//!             let _ = agi.stream_file("hello-world", "").await;
//!             let _ = agi.hangup(None).await;
//!         });
//!     }
//!
//!     if let Some(e) = server.terminated().await {
//!         eprintln!("listener failed: {}", e);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Raw Commands
//!
//! Anything without a wrapper goes through [`AgiSession::execute`] or a typed
//! [`AgiCommand`]; the reply comes back unjudged:
//!
//! ```rust,no_run
//! # async fn run(agi: &mut asterisk_agi_tokio::FastAgiSession) -> Result<(), asterisk_agi_tokio::AgiError> {
//! use asterisk_agi_tokio::AgiCommand;
//!
//! let resp = agi.execute("SPEECH CREATE", &["lumenvox"]).await?;
//! println!("{} -> {}", resp.code(), resp.result());
//!
//! let resp = agi
//!     .send_command(&AgiCommand::SayAlpha {
//!         text: "abc".into(),
//!         escape_digits: String::new(),
//!     })
//!     .await?;
//! assert!(resp.is_success());
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod channel;
pub mod command;
pub mod commands;
pub mod constants;
pub mod environment;
pub mod error;
pub mod response;
pub mod server;
pub mod session;

pub(crate) mod scanner;

pub use channel::{ChannelStatus, ParseChannelStatusError};
pub use command::{AgiCommand, CommandBuilder};
pub use commands::{CollectedDigits, Playback};
pub use constants::DEFAULT_FASTAGI_PORT;
pub use environment::{AgiEnv, ParseAgiEnvError};
pub use error::{AgiError, AgiResult};
pub use response::{ReplyCode, Response};
pub use server::{FastAgiOptions, FastAgiServer, ListenerStatus, SessionStream, StopReason};
pub use session::{AgiOptions, AgiSession, FastAgiSession, SessionState, Stdio};
