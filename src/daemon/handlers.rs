use crate::config::{Config, ReregisterPolicy};
use crate::daemon::auth::Authenticator;
use crate::daemon::process::{
    LaunchRequest, Launcher, NixSignaller, SessionProcess, SignalError, Signaller, StopSignal,
    UserLauncher,
};
use crate::daemon::registry::Registry;
use crate::error::{Result, WaymuxError};
use crate::protocol::{HostCompositor, Identity, Session, SessionInit, SessionList};
use nix::unistd::{Uid, User};
use std::collections::BTreeMap;
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions, Permissions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 핸들러가 호출하는 외부 collaborator 묶음
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub launcher: Arc<dyn Launcher>,
    pub signaller: Arc<dyn Signaller>,
}

impl Collaborators {
    /// 시스템 구현 (PAM, setuid 실행, kill)
    pub fn system(config: &Config) -> Self {
        Self {
            authenticator: system_authenticator(config),
            launcher: Arc::new(UserLauncher::new(config.session_shell.clone())),
            signaller: Arc::new(NixSignaller),
        }
    }
}

#[cfg(feature = "pam")]
fn system_authenticator(config: &Config) -> Arc<dyn Authenticator> {
    Arc::new(crate::daemon::auth::PamAuthenticator::new(
        config.pam_service.clone(),
    ))
}

#[cfg(not(feature = "pam"))]
fn system_authenticator(_config: &Config) -> Arc<dyn Authenticator> {
    warn!("built without PAM support, every StartSession will be refused");
    Arc::new(crate::daemon::auth::DisabledAuthenticator)
}

/// opcode별 lifecycle 핸들러
pub struct Handlers {
    registry: Arc<Registry>,
    collaborators: Collaborators,
    policy: ReregisterPolicy,
    host_path_mode: u32,
}

impl Handlers {
    pub fn new(registry: Arc<Registry>, collaborators: Collaborators, config: &Config) -> Self {
        Self {
            registry,
            collaborators,
            policy: config.host_reregister,
            host_path_mode: config.host_path_mode,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// RegisterHost
    ///
    /// 호출자(`peer_uid`)가 소유한 compositor 프로세스, runtime dir, display 소켓만
    /// 등록할 수 있습니다 (root는 예외). symlink는 거부합니다. 검사를 통과하면
    /// 세션 사용자들이 접근할 수 있도록 두 경로의 권한을 바꾼 다음 등록합니다.
    /// 어느 단계든 실패하면 registry와 경로 권한은 그대로입니다.
    pub async fn register_host(&self, host: HostCompositor, peer_uid: Option<u32>) -> Result<()> {
        if host.pid <= 1 || host.pid > i32::MAX as u64 {
            return Err(WaymuxError::InvalidPid(host.pid));
        }
        let peer_uid = peer_uid.ok_or_else(|| {
            WaymuxError::Identity("peer credentials unavailable".to_string())
        })?;

        match self.collaborators.signaller.owner(host.pid) {
            Ok(owner) if peer_uid == 0 || owner == peer_uid => {}
            Ok(owner) => {
                warn!(pid = host.pid, owner, peer_uid, "host pid owned by another user");
                return Err(WaymuxError::Unauthorized(format!(
                    "process {} is not owned by uid {}",
                    host.pid, peer_uid
                )));
            }
            Err(SignalError::NoSuchProcess) => return Err(WaymuxError::InvalidPid(host.pid)),
            Err(e) => {
                return Err(WaymuxError::Signal {
                    pid: host.pid,
                    message: e.to_string(),
                })
            }
        }

        let paths = [host.runtime_dir.clone(), host.display.clone()];
        let mode = self.host_path_mode;
        tokio::task::spawn_blocking(move || grant_access(&paths, peer_uid, mode))
            .await
            .map_err(|e| WaymuxError::Daemon(e.to_string()))??;

        let pid = host.pid;
        let displaced = self.registry.register_host(host, self.policy).await?;
        for session in &displaced {
            self.signal_session(session);
        }

        info!(pid, peer_uid, displaced = displaced.len(), "host compositor registered");
        Ok(())
    }

    /// StopHost
    pub async fn stop_host(&self) -> Result<()> {
        let host = self
            .registry
            .current_host()
            .await
            .ok_or(WaymuxError::NotRegistered)?;

        match self
            .collaborators
            .signaller
            .signal(host.pid, StopSignal::Interrupt)
        {
            Ok(()) => {}
            Err(SignalError::NoSuchProcess) => {
                warn!(pid = host.pid, "host compositor already gone");
            }
            Err(e) => {
                return Err(WaymuxError::Signal {
                    pid: host.pid,
                    message: e.to_string(),
                })
            }
        }

        self.registry.unregister_host_if(host.pid).await?;
        info!(pid = host.pid, "host compositor stopped");
        Ok(())
    }

    /// StartSession
    ///
    /// 인증과 실행은 registry lock 밖에서 이루어집니다. 실행된 프로세스는
    /// 반드시 registry에 추가되거나 종료됩니다. 그 사이 host가 멈추거나 바뀌었다면
    /// 세션을 종료하고 `NotRegistered`를 돌려줍니다.
    pub async fn start_session(&self, init: SessionInit) -> Result<Session> {
        let host = self
            .registry
            .current_host()
            .await
            .ok_or(WaymuxError::NotRegistered)?;

        let SessionInit {
            username,
            secret,
            command,
        } = init;

        let verdict = self
            .collaborators
            .authenticator
            .verify(&username, &secret)
            .await;
        drop(secret);

        if let Err(e) = verdict {
            warn!(user = %username, "authentication failed");
            return Err(WaymuxError::AuthenticationFailure(e.to_string()));
        }

        let request = LaunchRequest {
            username: username.clone(),
            command: command.clone(),
            env: host_environment(&host),
        };
        let process = self
            .collaborators
            .launcher
            .launch(request)
            .await
            .map_err(|e| WaymuxError::LaunchFailure(e.to_string()))?;

        let session = Session::new(process.id(), username, command);
        if let Err(e) = self.registry.add_session(session.clone(), &host).await {
            warn!(session = session.id, error = %e, "cannot track session, terminating it");
            self.signal_session(&session);
            spawn_reaper(None, process);
            return Err(e);
        }

        info!(session = session.id, user = %session.username, command = %session.command, "session started");
        spawn_reaper(Some(Arc::clone(&self.registry)), process);
        Ok(session)
    }

    /// StopSession
    pub async fn stop_session(&self, id: u64) -> Result<Session> {
        let session = self.registry.remove_session(id).await?;
        self.signal_session(&session);
        info!(session = id, "session stopped");
        Ok(session)
    }

    /// StopAllSessions (데몬 종료 시에도 사용)
    pub async fn stop_all_sessions(&self) -> usize {
        let sessions = self.registry.drain_sessions().await;
        for session in &sessions {
            self.signal_session(session);
        }
        if !sessions.is_empty() {
            info!(count = sessions.len(), "all sessions stopped");
        }
        sessions.len()
    }

    /// ListSessions
    pub async fn list_sessions(&self) -> SessionList {
        SessionList(self.registry.list_sessions().await)
    }

    /// WhoAmI: 연결한 프로세스의 유효 uid 기준
    pub async fn who_am_i(&self, uid: u32) -> Result<Identity> {
        let user = tokio::task::spawn_blocking(move || User::from_uid(Uid::from_raw(uid)))
            .await
            .map_err(|e| WaymuxError::Identity(e.to_string()))?
            .map_err(|e| WaymuxError::Identity(e.to_string()))?
            .ok_or_else(|| WaymuxError::Identity(format!("no user with uid {}", uid)))?;

        let sessions = self.registry.sessions_owned_by(&user.name).await;
        Ok(Identity {
            uid: u64::from(uid),
            username: user.name,
            sessions,
        })
    }

    fn signal_session(&self, session: &Session) {
        match self
            .collaborators
            .signaller
            .signal(session.id, StopSignal::Terminate)
        {
            Ok(()) | Err(SignalError::NoSuchProcess) => {}
            Err(e) => warn!(session = session.id, error = %e, "failed to signal session"),
        }
    }
}

/// 경로를 symlink를 따라가지 않고 연 다음 소유자를 확인
///
/// `O_PATH` 핸들로 검사하고 같은 핸들(`/proc/self/fd`)로 chmod 하므로 검사와
/// 변경 사이에 경로가 바뀌어도 다른 파일이 바뀌지 않습니다.
fn open_owned(path: &str, peer_uid: u32) -> Result<File> {
    let permission = |source| WaymuxError::Permission {
        path: path.to_string(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .custom_flags((OFlag::O_PATH | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC).bits())
        .open(path)
        .map_err(permission)?;
    let metadata = file.metadata().map_err(permission)?;

    if metadata.file_type().is_symlink() {
        return Err(WaymuxError::Unauthorized(format!(
            "{} is a symbolic link",
            path
        )));
    }
    if peer_uid != 0 && metadata.uid() != peer_uid {
        return Err(WaymuxError::Unauthorized(format!(
            "{} is not owned by uid {}",
            path, peer_uid
        )));
    }
    Ok(file)
}

fn grant_access(paths: &[String], peer_uid: u32, mode: u32) -> Result<()> {
    // 모두 검사한 다음에 변경
    let handles = paths
        .iter()
        .map(|path| open_owned(path, peer_uid).map(|file| (path, file)))
        .collect::<Result<Vec<_>>>()?;

    for (path, file) in &handles {
        std::fs::set_permissions(
            format!("/proc/self/fd/{}", file.as_raw_fd()),
            Permissions::from_mode(mode),
        )
        .map_err(|source| WaymuxError::Permission {
            path: path.to_string(),
            source,
        })?;
    }
    Ok(())
}

fn host_environment(host: &HostCompositor) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("XDG_RUNTIME_DIR".to_string(), host.runtime_dir.clone()),
        ("WAYLAND_DISPLAY".to_string(), host.display.clone()),
    ])
}

/// 프로세스 종료를 기다렸다가 registry에서 제거
///
/// 어떤 연결과도 무관하게 끝까지 실행됩니다.
fn spawn_reaper(registry: Option<Arc<Registry>>, mut process: Box<dyn SessionProcess>) {
    tokio::spawn(async move {
        let id = process.id();
        match process.wait().await {
            Ok(status) => info!(session = id, %status, "session exited"),
            Err(e) => warn!(session = id, error = %e, "failed to wait for session"),
        }

        if let Some(registry) = registry {
            if registry.remove_session(id).await.is_ok() {
                debug!(session = id, "session removed after exit");
            }
        }
    });
}
