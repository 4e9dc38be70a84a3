use crate::config::Config;
use crate::daemon::handlers::Handlers;
use crate::error::{Result, WaymuxError};
use crate::protocol::{
    read_message, write_message, FrameError, HostCompositor, Message, Opcode, Payload, SessionId,
    SessionInit,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// 연결 하나당 요청 하나, 응답 하나
///
/// `AwaitingRequest → Responding → Closed`. keep-alive나 pipelining은 없습니다.
pub struct Dispatcher {
    handlers: Handlers,
    max_payload_len: u64,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(handlers: Handlers, config: &Config) -> Self {
        Self {
            handlers,
            max_payload_len: config.max_payload_len,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    /// 연결 처리 (응답을 쓰고 나면 stream은 drop 되어 닫힙니다)
    pub async fn handle_connection(&self, mut stream: UnixStream) {
        let peer_uid = match stream.peer_cred() {
            Ok(cred) => Some(cred.uid()),
            Err(e) => {
                debug!(error = %e, "peer credentials unavailable");
                None
            }
        };

        let read = tokio::time::timeout(
            self.request_timeout,
            read_message(&mut stream, self.max_payload_len),
        )
        .await;

        let reply = match read {
            Ok(Ok(request)) => self.dispatch(request, peer_uid).await,
            Ok(Err(FrameError::UnknownOpcode(opcode))) => {
                debug!(opcode, "unknown opcode");
                Message::error(WaymuxError::InvalidOpcode.to_string())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to read request");
                Message::error(format!("failed to read request: {}", e))
            }
            Err(_) => {
                warn!("timed out waiting for request");
                Message::error("timed out waiting for request")
            }
        };

        if let Err(e) = write_message(&mut stream, &reply).await {
            // 클라이언트가 이미 떠난 경우
            debug!(error = %e, "failed to write reply");
        }
    }

    /// 요청 하나를 처리해서 응답 메시지를 만듭니다
    pub async fn dispatch(&self, request: Message, peer_uid: Option<u32>) -> Message {
        let opcode = request.opcode;
        match self.route(request, peer_uid).await {
            Ok(payload) => {
                debug!(?opcode, "request succeeded");
                Message::new(Opcode::Success, payload)
            }
            Err(e) => {
                debug!(?opcode, error = %e, "request failed");
                Message::error(e.to_string())
            }
        }
    }

    async fn route(&self, request: Message, peer_uid: Option<u32>) -> Result<Bytes> {
        match request.opcode {
            Opcode::RegisterHost => {
                let host = request.decode::<HostCompositor>()?;
                self.handlers.register_host(host, peer_uid).await?;
                Ok(Bytes::new())
            }
            Opcode::StopHost => {
                self.handlers.stop_host().await?;
                Ok(Bytes::new())
            }
            Opcode::StartSession => {
                let init = request.decode::<SessionInit>();
                scrub(request.payload);
                self.handlers.start_session(init?).await?;
                Ok(Bytes::new())
            }
            Opcode::StopSession => {
                let SessionId(id) = request.decode::<SessionId>()?;
                self.handlers.stop_session(id).await?;
                Ok(Bytes::new())
            }
            Opcode::StopAllSessions => {
                self.handlers.stop_all_sessions().await;
                Ok(Bytes::new())
            }
            Opcode::ListSessions => Ok(self.handlers.list_sessions().await.to_bytes()),
            Opcode::WhoAmI => {
                let uid = peer_uid.ok_or_else(|| {
                    WaymuxError::Identity("peer credentials unavailable".to_string())
                })?;
                Ok(self.handlers.who_am_i(uid).await?.to_bytes())
            }
            Opcode::Success | Opcode::Error => Err(WaymuxError::InvalidOpcode),
        }
    }
}

/// 비밀번호가 담겼던 요청 버퍼를 0으로 (공유되지 않은 버퍼만)
fn scrub(payload: Bytes) {
    if let Ok(mut buf) = payload.try_into_mut() {
        let bytes: &mut [u8] = &mut buf;
        bytes.zeroize();
    }
}
