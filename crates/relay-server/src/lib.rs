pub mod config;
pub mod server;
pub mod session;
pub mod sms;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
pub use session::{ConnectionId, Dispatch, Session};
pub use sms::{SmsOutcome, SmsRelay};
