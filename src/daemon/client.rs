use crate::config::Config;
use crate::error::{Result, WaymuxError};
use crate::protocol::{
    read_message, write_message, HostCompositor, Identity, Message, Opcode, Payload, Session,
    SessionId, SessionInit, SessionList, DEFAULT_MAX_PAYLOAD_LEN,
};
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

/// 데몬 클라이언트 (서버에 요청 보내기)
///
/// 요청마다 새 연결을 엽니다.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// 새 클라이언트 생성
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.socket_path.clone())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// 요청 전송 후 응답 한 개 수신
    pub async fn request(&self, request: &Message) -> Result<Message> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    WaymuxError::NotRunning
                }
                _ => WaymuxError::IoError(e),
            })?;

        write_message(&mut stream, request).await?;
        let reply = read_message(&mut stream, DEFAULT_MAX_PAYLOAD_LEN).await?;
        Ok(reply)
    }

    /// Success면 payload, Error면 진단 텍스트를 에러로
    async fn call(&self, request: Message) -> Result<Bytes> {
        let reply = self.request(&request).await?;
        match reply.opcode {
            Opcode::Success => Ok(reply.payload),
            Opcode::Error => Err(WaymuxError::Daemon(reply.text())),
            other => Err(WaymuxError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    pub async fn register_host(&self, host: &HostCompositor) -> Result<()> {
        self.call(Message::with_payload(Opcode::RegisterHost, host))
            .await
            .map(drop)
    }

    pub async fn stop_host(&self) -> Result<()> {
        self.call(Message::empty(Opcode::StopHost)).await.map(drop)
    }

    pub async fn start_session(&self, init: &SessionInit) -> Result<()> {
        self.call(Message::with_payload(Opcode::StartSession, init))
            .await
            .map(drop)
    }

    pub async fn stop_session(&self, id: u64) -> Result<()> {
        self.call(Message::with_payload(Opcode::StopSession, &SessionId(id)))
            .await
            .map(drop)
    }

    pub async fn stop_all_sessions(&self) -> Result<()> {
        self.call(Message::empty(Opcode::StopAllSessions))
            .await
            .map(drop)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let payload = self.call(Message::empty(Opcode::ListSessions)).await?;
        Ok(SessionList::from_bytes(&payload)?.0)
    }

    pub async fn who_am_i(&self) -> Result<Identity> {
        let payload = self.call(Message::empty(Opcode::WhoAmI)).await?;
        Ok(Identity::from_bytes(&payload)?)
    }
}
