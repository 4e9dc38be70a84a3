//! waymux: 하나의 host compositor 위에서 사용자 세션을 띄우고 추적하는 세션 브로커

pub mod config;
pub mod daemon;
pub mod error;
pub mod protocol;

pub use error::{Result, WaymuxError};
