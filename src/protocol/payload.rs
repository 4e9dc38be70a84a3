use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{field}: needs {needed} bytes but only {remaining} remain")]
    Truncated {
        field: &'static str,
        needed: u64,
        remaining: usize,
    },

    #[error("{0}: invalid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{field}: invalid value {value}")]
    InvalidValue { field: &'static str, value: u64 },

    #[error("{0} unexpected trailing byte(s)")]
    TrailingBytes(usize),
}

/// payload 바이트 위의 커서
///
/// 모든 읽기는 남은 길이를 먼저 검사하므로 잘린 입력에서도 panic 하지 않습니다.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, PayloadError> {
        if self.buf.remaining() < 8 {
            return Err(PayloadError::Truncated {
                field,
                needed: 8,
                remaining: self.buf.remaining(),
            });
        }
        Ok(self.buf.get_u64())
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String, PayloadError> {
        let len = self.read_u64(field)?;
        if len > self.buf.remaining() as u64 {
            return Err(PayloadError::Truncated {
                field,
                needed: len,
                remaining: self.buf.remaining(),
            });
        }

        let (head, tail) = self.buf.split_at(len as usize);
        self.buf = tail;
        String::from_utf8(head.to_vec()).map_err(|_| PayloadError::InvalidUtf8(field))
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, PayloadError> {
        match self.read_u64(field)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(PayloadError::InvalidValue { field, value }),
        }
    }

    pub fn read_timestamp(&mut self, field: &'static str) -> Result<DateTime<Utc>, PayloadError> {
        let value = self.read_u64(field)?;
        i64::try_from(value)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(PayloadError::InvalidValue { field, value })
    }

    /// 남은 바이트가 없어야 합니다
    pub fn finish(self) -> Result<(), PayloadError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(PayloadError::TrailingBytes(self.buf.len()))
        }
    }
}

fn put_string(out: &mut BytesMut, value: &str) {
    out.put_u64(value.len() as u64);
    out.put_slice(value.as_bytes());
}

fn put_timestamp(out: &mut BytesMut, value: &DateTime<Utc>) {
    out.put_u64(value.timestamp().max(0) as u64);
}

/// frame payload 안에 실리는 typed 구조체
pub trait Payload: Sized {
    fn encode(&self, out: &mut BytesMut);

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError>;

    fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.freeze()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        let mut reader = PayloadReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// 등록된 host compositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCompositor {
    /// host의 XDG_RUNTIME_DIR
    pub runtime_dir: String,
    /// wayland display 소켓 경로
    pub display: String,
    pub pid: u64,
}

impl Payload for HostCompositor {
    fn encode(&self, out: &mut BytesMut) {
        put_string(out, &self.runtime_dir);
        put_string(out, &self.display);
        out.put_u64(self.pid);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self {
            runtime_dir: reader.read_string("runtime_dir")?,
            display: reader.read_string("display")?,
            pid: reader.read_u64("pid")?,
        })
    }
}

/// StartSession 요청
///
/// `secret`은 인증 호출 직후 0으로 지워지며 `Debug` 출력에도 나타나지 않습니다.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionInit {
    pub username: String,
    pub secret: Zeroizing<String>,
    /// 실행할 세션 명령어 (compositor client)
    pub command: String,
}

impl fmt::Debug for SessionInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInit")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("command", &self.command)
            .finish()
    }
}

impl Payload for SessionInit {
    fn encode(&self, out: &mut BytesMut) {
        put_string(out, &self.username);
        put_string(out, &self.secret);
        put_string(out, &self.command);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self {
            username: reader.read_string("username")?,
            secret: Zeroizing::new(reader.read_string("secret")?),
            command: reader.read_string("command")?,
        })
    }
}

/// StopSession 요청
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(pub u64);

impl Payload for SessionId {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u64(self.0);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self(reader.read_u64("session_id")?))
    }
}

/// 실행 중인 세션 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 세션 프로세스의 pid
    pub id: u64,
    pub username: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub alive: bool,
}

impl Session {
    pub fn new(id: u64, username: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            command: command.into(),
            // 와이어에는 초 단위로 실립니다
            started_at: Utc::now().trunc_subsecs(0),
            alive: true,
        }
    }
}

impl Payload for Session {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u64(self.id);
        put_string(out, &self.username);
        put_string(out, &self.command);
        put_timestamp(out, &self.started_at);
        out.put_u64(self.alive as u64);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self {
            id: reader.read_u64("id")?,
            username: reader.read_string("username")?,
            command: reader.read_string("command")?,
            started_at: reader.read_timestamp("started_at")?,
            alive: reader.read_bool("alive")?,
        })
    }
}

/// ListSessions 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionList(pub Vec<Session>);

impl Payload for SessionList {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u64(self.0.len() as u64);
        for session in &self.0 {
            session.encode(out);
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        let count = reader.read_u64("session_count")?;
        let mut sessions = Vec::new();
        for _ in 0..count {
            sessions.push(Session::decode(reader)?);
        }
        Ok(Self(sessions))
    }
}

/// WhoAmI 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u64,
    pub username: String,
    /// 이 사용자가 소유한 세션 id
    pub sessions: Vec<u64>,
}

impl Payload for Identity {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u64(self.uid);
        put_string(out, &self.username);
        out.put_u64(self.sessions.len() as u64);
        for id in &self.sessions {
            out.put_u64(*id);
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        let uid = reader.read_u64("uid")?;
        let username = reader.read_string("username")?;
        let count = reader.read_u64("session_count")?;
        let mut sessions = Vec::new();
        for _ in 0..count {
            sessions.push(reader.read_u64("session_id")?);
        }
        Ok(Self {
            uid,
            username,
            sessions,
        })
    }
}
