//! # twinchat
//!
//! Sends one prompt to two language-model backends at once (a local
//! `ollama` service and a cloud `gemini` service, both behind one HTTP
//! gateway) and collects their answers side by side, streamed or in one
//! piece.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use twinchat::config::Config;
//! use twinchat::dispatch::Backend;
//! use twinchat::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let mut session = Session::new(config.dispatcher()?);
//!
//!     session.set_prompt("Explain borrowing in one paragraph");
//!     session.submit().await;
//!
//!     for backend in Backend::ALL {
//!         println!("[{backend}]\n{}", session.buffer(backend).text());
//!     }
//!     Ok(())
//! }
//! ```

// ── Wire level ────────────────────────────────────────────────────────────────
pub mod client;
pub mod http;
pub mod sse;

// ── Chat level ────────────────────────────────────────────────────────────────
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod session;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use buffer::ResponseBuffer;
pub use client::{Client, ClientError};
pub use config::{Config, ConfigError};
pub use dispatch::{Backend, DispatchReport, Dispatcher, Mode, Outcome, Submission};
pub use session::{Lifecycle, Session, StopHandle};
