//! Model service layer for ZarSage
//!
//! This module owns everything that talks to the locally-hosted model server.
//! It exposes one seam, [`ModelService`], which the controller drives; the
//! production implementation spawns the server as a child process and speaks
//! its OpenAI-compatible HTTP API.
//!
//! # Architecture
//!
//! - `client` - `LocalModelClient`, the production `ModelService`
//! - `openai` - chat-completions wire types and response parsing
//! - `sidecar` - child-process management and port selection
//!
//! # Usage
//!
//! ```rust,no_run
//! use zarsage::ai::{LocalModelClient, ModelService};
//! use zarsage::config::ModelConfig;
//!
//! # async fn example() -> zarsage::error::ChatResult<()> {
//! let client = LocalModelClient::new(ModelConfig::default());
//! client.start().await?;
//! let reply = client.complete("When should I plant maize?").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod openai;
mod sidecar;

use crate::error::ChatResult;
use async_trait::async_trait;

pub use client::LocalModelClient;
pub use openai::{WireMessage, parse_completion};
pub use sidecar::{Sidecar, find_available_port, is_port_available, render_args};

/// The two operations the controller needs from the model backend.
///
/// Implementations perform no retries; every failure is returned so the
/// caller can decide once what to show.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Brings the model up. Calling it while already running must be safe.
    async fn start(&self) -> ChatResult<()>;

    /// Sends one non-empty prompt and returns the full reply.
    async fn complete(&self, prompt: &str) -> ChatResult<String>;

    /// Releases the model process, if one is owned.
    async fn shutdown(&self) -> ChatResult<()> {
        Ok(())
    }

    /// Best-effort synchronous variant of `shutdown`, for teardown paths that
    /// cannot await.
    fn terminate(&self) {}

    /// Forgets earlier exchanges so the next prompt starts a fresh context.
    fn reset_context(&self) {}
}
