// Core module - Line processing, session lifecycle and port watching
pub mod line;
pub mod session;
pub mod watcher;
