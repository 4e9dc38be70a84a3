use crate::config::Config;
use crate::daemon::dispatcher::Dispatcher;
use crate::daemon::lockfile::LockFile;
use crate::error::{Result, WaymuxError};
use std::fs::Permissions;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// accept 실패 후 재시도 간격
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 데몬 서버
pub struct DaemonServer {
    /// Unix socket 경로
    socket_path: PathBuf,
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    /// 동시 연결 제한 (`None` = 제한 없음)
    connection_limit: Option<Arc<Semaphore>>,
    lock: LockFile,
}

impl DaemonServer {
    /// lock 파일을 잡고 소켓을 bind 합니다
    ///
    /// 이미 다른 데몬이 실행 중이거나 bind에 실패하면 에러입니다.
    pub async fn bind(config: &Config, dispatcher: Dispatcher) -> Result<Self> {
        let lock = LockFile::acquire(&config.lock_path)?;
        let socket_path = config.socket_path.clone();

        // lock을 잡았으므로 남아 있는 소켓 파일은 이전 실행의 것
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                WaymuxError::ConfigError(format!("Failed to remove existing socket: {}", e))
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| WaymuxError::ConfigError(format!("Failed to bind socket: {}", e)))?;

        std::fs::set_permissions(&socket_path, Permissions::from_mode(config.socket_mode))
            .map_err(|source| WaymuxError::Permission {
                path: socket_path.display().to_string(),
                source,
            })?;

        let connection_limit = config
            .connection_limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));

        info!(
            socket = %socket_path.display(),
            max_connections = ?config.connection_limit(),
            "daemon listening"
        );

        Ok(Self {
            socket_path,
            listener,
            dispatcher: Arc::new(dispatcher),
            connection_limit,
            lock,
        })
    }

    /// `shutdown`이 완료될 때까지 연결을 받습니다
    ///
    /// 종료 시 모든 세션에 시그널을 보내고 소켓과 lock 파일을 삭제합니다.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = match &self.connection_limit {
                Some(semaphore) => tokio::select! {
                    permit = Arc::clone(semaphore).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    _ = &mut shutdown => break,
                },
                None => None,
            };

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        // 각 연결을 별도 태스크로 처리
                        tokio::spawn(async move {
                            dispatcher.handle_connection(stream).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        info!("daemon shutting down");
        self.cleanup().await
    }

    async fn cleanup(self) -> Result<()> {
        let stopped = self.dispatcher.handlers().stop_all_sessions().await;
        info!(stopped, "sessions signalled");

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            error!(error = %e, "failed to remove socket");
        }
        self.lock.release()
    }
}

/// SIGINT 또는 SIGTERM 대기
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
