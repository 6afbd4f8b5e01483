pub mod chat;
pub mod status;

pub use chat::ChatView;
pub use status::StatusBar;
