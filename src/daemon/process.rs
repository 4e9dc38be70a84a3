use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{getgrouplist, setgid, setgroups, setuid, Gid, Pid, Uid, User};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::{Child, Command};

const SESSION_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("user lookup failed: {0}")]
    Lookup(String),

    #[error("spawn failed: {0}")]
    Spawn(#[from] io::Error),

    #[error("spawned process has no pid")]
    NoPid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("no such process")]
    NoSuchProcess,

    #[error("invalid pid {0}")]
    InvalidPid(u64),

    #[error("{0}")]
    Os(String),
}

/// 세션 실행 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub username: String,
    pub command: String,
    /// host compositor에서 가져온 환경 변수
    pub env: BTreeMap<String, String>,
}

/// 실행된 세션 프로세스 핸들
#[async_trait]
pub trait SessionProcess: Send {
    fn id(&self) -> u64;

    /// 프로세스가 끝날 때까지 대기 (reaping)
    async fn wait(&mut self) -> io::Result<ExitStatus>;
}

/// launch(identity, env, command) → handle
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn SessionProcess>, LaunchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// host compositor 종료 (SIGINT)
    Interrupt,
    /// 세션 종료 (SIGTERM)
    Terminate,
}

pub trait Signaller: Send + Sync {
    fn signal(&self, pid: u64, signal: StopSignal) -> Result<(), SignalError>;

    /// 프로세스 소유자의 uid
    fn owner(&self, pid: u64) -> Result<u32, SignalError>;
}

/// 대상 사용자의 uid/gid와 보조 그룹으로 shell을 통해 세션 명령어를 실행
pub struct UserLauncher {
    shell: String,
}

impl UserLauncher {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

struct ChildProcess {
    id: u64,
    child: Child,
}

#[async_trait]
impl SessionProcess for ChildProcess {
    fn id(&self) -> u64 {
        self.id
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// 세션 사용자 정보 (blocking 조회 결과)
struct Target {
    user: User,
    groups: Vec<Gid>,
    cwd: PathBuf,
}

fn lookup_target(username: &str) -> Result<Target, LaunchError> {
    let user = User::from_name(username)
        .map_err(|e| LaunchError::Lookup(e.to_string()))?
        .ok_or_else(|| LaunchError::UnknownUser(username.to_string()))?;

    let name = CString::new(user.name.as_str()).map_err(|e| LaunchError::Lookup(e.to_string()))?;
    let groups = getgrouplist(&name, user.gid).map_err(|e| LaunchError::Lookup(e.to_string()))?;

    // home이 없는 시스템 계정
    let cwd = if user.dir.is_dir() {
        user.dir.clone()
    } else {
        PathBuf::from("/")
    };

    Ok(Target { user, groups, cwd })
}

#[async_trait]
impl Launcher for UserLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn SessionProcess>, LaunchError> {
        let username = request.username.clone();
        let Target { user, groups, cwd } = tokio::task::spawn_blocking(move || lookup_target(&username))
            .await
            .map_err(|e| LaunchError::Lookup(e.to_string()))??;

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(format!("exec {}", request.command))
            .env_clear()
            .env("PATH", SESSION_PATH)
            .env("HOME", &user.dir)
            .env("USER", &user.name)
            .env("LOGNAME", &user.name)
            .env("SHELL", &user.shell)
            .envs(&request.env)
            .current_dir(&cwd)
            .stdin(Stdio::null());

        if user.uid != Uid::effective() {
            let (uid, gid) = (user.uid, user.gid);
            // fork 이후에는 async-signal-safe 호출만: 그룹 목록은 미리 조회
            unsafe {
                command.pre_exec(move || {
                    setgroups(&groups)?;
                    setgid(gid)?;
                    setuid(uid)?;
                    Ok(())
                });
            }
        }

        let child = command.spawn()?;
        let id = child.id().ok_or(LaunchError::NoPid)?;

        Ok(Box::new(ChildProcess {
            id: u64::from(id),
            child,
        }))
    }
}

/// kill(2) 기반 시그널 전송
pub struct NixSignaller;

fn raw_pid(pid: u64) -> Result<i32, SignalError> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or(SignalError::InvalidPid(pid))
}

impl Signaller for NixSignaller {
    fn signal(&self, pid: u64, signal: StopSignal) -> Result<(), SignalError> {
        let raw = raw_pid(pid)?;

        let signal = match signal {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Terminate => Signal::SIGTERM,
        };

        kill(Pid::from_raw(raw), signal).map_err(|e| match e {
            Errno::ESRCH => SignalError::NoSuchProcess,
            other => SignalError::Os(other.to_string()),
        })
    }

    fn owner(&self, pid: u64) -> Result<u32, SignalError> {
        let raw = raw_pid(pid)?;
        match std::fs::metadata(format!("/proc/{}", raw)) {
            Ok(metadata) => Ok(metadata.uid()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SignalError::NoSuchProcess),
            Err(e) => Err(SignalError::Os(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_rejects_invalid_pids() {
        assert_eq!(
            NixSignaller.signal(0, StopSignal::Terminate),
            Err(SignalError::InvalidPid(0))
        );
        assert_eq!(
            NixSignaller.signal(u64::MAX, StopSignal::Interrupt),
            Err(SignalError::InvalidPid(u64::MAX))
        );
    }

    #[tokio::test]
    async fn test_signal_terminates_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = u64::from(child.id().unwrap());

        NixSignaller.signal(pid, StopSignal::Terminate).unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());

        // 회수된 프로세스
        assert_eq!(
            NixSignaller.signal(pid, StopSignal::Terminate),
            Err(SignalError::NoSuchProcess)
        );
    }

    #[tokio::test]
    async fn test_launch_unknown_user() {
        let launcher = UserLauncher::new("/bin/sh");
        let result = launcher
            .launch(LaunchRequest {
                username: "waymux-no-such-user".to_string(),
                command: "true".to_string(),
                env: BTreeMap::new(),
            })
            .await;
        assert!(matches!(result, Err(LaunchError::UnknownUser(_))));
    }

    #[test]
    fn test_owner_of_own_process() {
        let pid = u64::from(std::process::id());
        assert_eq!(
            NixSignaller.owner(pid),
            Ok(nix::unistd::geteuid().as_raw())
        );
        assert_eq!(NixSignaller.owner(0), Err(SignalError::InvalidPid(0)));
    }

    #[tokio::test]
    async fn test_launch_as_current_user() {
        let me = User::from_uid(nix::unistd::geteuid()).unwrap().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let launcher = UserLauncher::new("/bin/sh");
        let mut process = launcher
            .launch(LaunchRequest {
                username: me.name.clone(),
                command: format!(
                    "/bin/sh -c 'pwd; env' > {}",
                    shell_words::quote(&out.display().to_string())
                ),
                env: BTreeMap::from([
                    ("XDG_RUNTIME_DIR".to_string(), "/run/user/test".to_string()),
                    ("WAYLAND_DISPLAY".to_string(), "/run/user/test/wayland-0".to_string()),
                ]),
            })
            .await
            .unwrap();
        assert!(process.id() > 0);
        assert!(process.wait().await.unwrap().success());

        let output = std::fs::read_to_string(&out).unwrap();
        let mut lines = output.lines();

        let home = if me.dir.is_dir() {
            me.dir.clone()
        } else {
            PathBuf::from("/")
        };
        let cwd = lines.next().unwrap();
        assert_eq!(
            std::fs::canonicalize(cwd).unwrap(),
            std::fs::canonicalize(home).unwrap()
        );

        let env: Vec<&str> = lines.collect();
        assert!(env.contains(&"XDG_RUNTIME_DIR=/run/user/test"));
        assert!(env.contains(&"WAYLAND_DISPLAY=/run/user/test/wayland-0"));
        assert!(env.contains(&format!("PATH={}", SESSION_PATH).as_str()));
        assert!(env.contains(&format!("USER={}", me.name).as_str()));
        // 데몬 환경은 넘어가지 않음
        assert!(!env.iter().any(|line| line.starts_with("CARGO_")));
    }
}
