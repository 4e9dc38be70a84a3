pub mod auth;
pub mod client;
pub mod dispatcher;
pub mod handlers;
pub mod lockfile;
pub mod process;
pub mod registry;
pub mod server;

pub use client::DaemonClient;
pub use dispatcher::Dispatcher;
pub use handlers::{Collaborators, Handlers};
pub use registry::Registry;
pub use server::DaemonServer;
