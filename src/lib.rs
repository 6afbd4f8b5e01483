//! ZarSage: a desktop chat client for a locally-hosted language model.
//!
//! The crate is split into the session core (`session`, `controller`), the
//! model service layer (`ai`) and, behind the `desktop` feature, a Dioxus
//! presentation layer (`ui`, `views`).

pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod types;

#[cfg(feature = "desktop")]
pub mod ui;
#[cfg(feature = "desktop")]
pub mod views;

pub use controller::{ChatController, SendOutcome, Timeouts, TurnHandle};
pub use error::{ChatError, ChatResult};
pub use session::{LifecycleStatus, Rejection, Session, SessionState};
pub use types::{ChatMessage, Role};
