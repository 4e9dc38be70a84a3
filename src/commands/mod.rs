pub mod daemon;
pub mod host;
pub mod session;

pub use daemon::run_daemon;
pub use host::{register_host, stop_host};
pub use session::{list_sessions, start_session, stop_all_sessions, stop_session, who_am_i};
