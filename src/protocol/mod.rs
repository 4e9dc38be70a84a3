//! waymux 제어 프로토콜 (version 1)
//!
//! 모든 요청과 응답은 같은 프레임 형식을 사용합니다:
//! `[opcode 1 byte][payload 길이 8 bytes, big-endian][payload]`
//! payload 안의 정수와 문자열 길이 역시 모두 big-endian `u64` 입니다.

pub mod frame;
pub mod payload;

pub use frame::{read_message, write_message, FrameError, Message, Opcode, DEFAULT_MAX_PAYLOAD_LEN};
pub use payload::{
    HostCompositor, Identity, Payload, PayloadError, PayloadReader, Session, SessionId,
    SessionInit, SessionList,
};

/// 프로토콜 버전 (바이트 순서 포함)
pub const PROTOCOL_VERSION: u32 = 1;
