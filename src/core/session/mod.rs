// Session module - Device session lifecycle
pub mod controller;
pub mod session;
pub mod state;

pub use controller::{Clock, SessionController};
pub use session::Session;
pub use state::{SessionEvent, SessionState};
