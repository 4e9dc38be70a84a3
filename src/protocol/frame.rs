use crate::protocol::payload::{Payload, PayloadError};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// opcode 1 byte + 길이 8 bytes
pub const HEADER_LEN: usize = 9;

/// 기본 최대 payload 크기 (1 MiB)
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 1024 * 1024;

/// 요청과 응답이 공유하는 opcode 공간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// 호출자의 compositor를 host로 등록
    RegisterHost = 0,
    /// host compositor 종료
    StopHost = 1,
    /// 새 사용자 세션 시작
    StartSession = 2,
    /// 세션 하나 종료
    StopSession = 3,
    /// 모든 세션 종료
    StopAllSessions = 4,
    /// 세션 목록
    ListSessions = 5,
    /// 호출자 신원 확인
    WhoAmI = 6,
    /// 요청 성공
    Success = 7,
    /// 요청 실패
    Error = 8,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::RegisterHost,
        Opcode::StopHost,
        Opcode::StartSession,
        Opcode::StopSession,
        Opcode::StopAllSessions,
        Opcode::ListSessions,
        Opcode::WhoAmI,
        Opcode::Success,
        Opcode::Error,
    ];

    pub fn is_request(self) -> bool {
        !self.is_reply()
    }

    pub fn is_reply(self) -> bool {
        matches!(self, Opcode::Success | Opcode::Error)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Opcode::ALL.get(value as usize).copied().ok_or(value)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed before {0} was received")]
    Truncated(&'static str),

    #[error("declared payload length {len} exceeds limit of {limit} bytes")]
    TooLarge { len: u64, limit: u64 },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// 와이어 위의 메시지 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Message {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// payload 없는 메시지
    pub fn empty(opcode: Opcode) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// typed payload를 인코딩해서 메시지 생성
    pub fn with_payload<P: Payload>(opcode: Opcode, payload: &P) -> Self {
        Self::new(opcode, payload.to_bytes())
    }

    pub fn success() -> Self {
        Self::empty(Opcode::Success)
    }

    /// 진단 메시지를 담은 Error 응답
    pub fn error(message: impl AsRef<str>) -> Self {
        Self::new(
            Opcode::Error,
            Bytes::copy_from_slice(message.as_ref().as_bytes()),
        )
    }

    /// payload를 typed 구조체로 디코딩
    pub fn decode<P: Payload>(&self) -> Result<P, PayloadError> {
        P::from_bytes(&self.payload)
    }

    /// Error 응답의 진단 텍스트 (표시 용도로만 사용)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// 헤더와 payload를 하나의 연속 버퍼로 인코딩
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.opcode as u8);
        buf.put_u64(self.payload.len() as u64);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

fn short_read(stage: &'static str) -> impl FnOnce(io::Error) -> FrameError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated(stage)
        } else {
            FrameError::Io(e)
        }
    }
}

/// 스트림에서 메시지 하나 읽기
///
/// 선언된 길이만큼 payload가 오지 않으면 항상 `FrameError::Truncated` 입니다.
/// 알 수 없는 opcode는 프레임 전체를 읽은 뒤에 `UnknownOpcode`로 보고하므로
/// 호출자는 여전히 응답을 보낼 수 있습니다.
pub async fn read_message<R>(reader: &mut R, max_payload_len: u64) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin,
{
    let raw_opcode = reader.read_u8().await.map_err(short_read("opcode"))?;
    let len = reader.read_u64().await.map_err(short_read("length"))?;

    if len > max_payload_len {
        return Err(FrameError::TooLarge {
            len,
            limit: max_payload_len,
        });
    }
    let size = usize::try_from(len).map_err(|_| FrameError::TooLarge {
        len,
        limit: max_payload_len,
    })?;

    let mut payload = vec![0u8; size];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(short_read("payload"))?;

    let opcode = Opcode::try_from(raw_opcode).map_err(FrameError::UnknownOpcode)?;
    Ok(Message::new(opcode, payload))
}

/// 메시지 하나 쓰기 (프레임 전체를 한 번의 write_all로)
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode()).await?;
    writer.flush().await?;
    Ok(())
}
