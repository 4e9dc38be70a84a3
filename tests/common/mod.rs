#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use waymux::config::{Config, ReregisterPolicy};
use waymux::daemon::auth::{AuthError, Authenticator};
use waymux::daemon::process::{
    LaunchError, LaunchRequest, Launcher, SessionProcess, SignalError, Signaller, StopSignal,
};
use waymux::daemon::{Collaborators, DaemonClient, DaemonServer, Dispatcher, Handlers, Registry};
use waymux::protocol::HostCompositor;

pub const PASSWORD: &str = "correct horse";

/// 모든 사용자에게 같은 비밀번호를 요구
pub struct FakeAuthenticator;

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn verify(&self, _username: &str, secret: &str) -> Result<(), AuthError> {
        if secret == PASSWORD {
            Ok(())
        } else {
            Err(AuthError::Rejected("bad credentials".to_string()))
        }
    }
}

/// 실제 프로세스 없이 pid만 발급하는 launcher
#[derive(Default)]
pub struct FakeLauncher {
    /// 다음 pid는 `10_000 + next_pid`
    pub next_pid: AtomicU64,
    exits: Mutex<HashMap<u64, Vec<oneshot::Sender<()>>>>,
    pub launches: Mutex<Vec<LaunchRequest>>,
    pub fail: AtomicBool,
    /// 실행에 추가로 걸리는 시간
    pub delay_ms: AtomicU64,
}

struct FakeProcess {
    id: u64,
    exit: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl SessionProcess for FakeProcess {
    fn id(&self) -> u64 {
        self.id
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(exit) = self.exit.take() {
            let _ = exit.await;
        }
        Ok(ExitStatus::from_raw(0))
    }
}

impl FakeLauncher {
    /// 세션 프로세스가 스스로 종료한 것처럼
    pub fn exit(&self, pid: u64) -> bool {
        match self.exits.lock().unwrap().remove(&pid) {
            Some(senders) => senders
                .into_iter()
                .fold(false, |sent, sender| sender.send(()).is_ok() || sent),
            None => false,
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn SessionProcess>, LaunchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LaunchError::UnknownUser(request.username));
        }

        // 동시 실행을 흉내내기 위한 양보
        let delay = 20 + self.delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let id = 10_000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.exits.lock().unwrap().entry(id).or_default().push(tx);
        self.launches.lock().unwrap().push(request);

        Ok(Box::new(FakeProcess { id, exit: Some(rx) }))
    }
}

/// 시그널을 기록하고, 세션 pid면 해당 가짜 프로세스를 종료
pub struct FakeSignaller {
    launcher: Arc<FakeLauncher>,
    pub signals: Mutex<Vec<(u64, StopSignal)>>,
    /// 모든 프로세스의 소유자 (`None`이면 테스트 프로세스의 euid)
    pub process_owner: Mutex<Option<u32>>,
}

impl FakeSignaller {
    pub fn signals(&self) -> Vec<(u64, StopSignal)> {
        self.signals.lock().unwrap().clone()
    }
}

impl Signaller for FakeSignaller {
    fn signal(&self, pid: u64, signal: StopSignal) -> Result<(), SignalError> {
        self.signals.lock().unwrap().push((pid, signal));
        self.launcher.exit(pid);
        Ok(())
    }

    fn owner(&self, _pid: u64) -> Result<u32, SignalError> {
        Ok(self
            .process_owner
            .lock()
            .unwrap()
            .unwrap_or_else(|| nix::unistd::geteuid().as_raw()))
    }
}

/// 임시 디렉토리에서 실행되는 데몬
pub struct TestDaemon {
    pub dir: TempDir,
    pub config: Config,
    pub client: DaemonClient,
    pub launcher: Arc<FakeLauncher>,
    pub signaller: Arc<FakeSignaller>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<waymux::Result<()>>>,
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            socket_path: dir.path().join("waymux.sock"),
            lock_path: dir.path().join("waymux.lock"),
            ..Config::default()
        };
        customize(&mut config);

        let launcher = Arc::new(FakeLauncher::default());
        let signaller = Arc::new(FakeSignaller {
            launcher: Arc::clone(&launcher),
            signals: Mutex::new(Vec::new()),
            process_owner: Mutex::new(None),
        });
        let collaborators = Collaborators {
            authenticator: Arc::new(FakeAuthenticator),
            launcher: launcher.clone(),
            signaller: signaller.clone(),
        };

        let handlers = Handlers::new(Arc::new(Registry::new()), collaborators, &config);
        let dispatcher = Dispatcher::new(handlers, &config);
        let server = DaemonServer::bind(&config, dispatcher).await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));

        Self {
            client: DaemonClient::from_config(&config),
            dir,
            config,
            launcher,
            signaller,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn with_policy(policy: ReregisterPolicy) -> impl FnOnce(&mut Config) {
        move |config| config.host_reregister = policy
    }

    /// 임시 디렉토리 안에 runtime dir과 display 소켓 파일을 만듭니다
    pub fn host(&self, name: &str, pid: u64) -> HostCompositor {
        let runtime_dir = self.dir.path().join(name);
        std::fs::create_dir_all(&runtime_dir).unwrap();
        let display = runtime_dir.join("wayland-0");
        std::fs::write(&display, b"").unwrap();

        HostCompositor {
            runtime_dir: runtime_dir.display().to_string(),
            display: display.display().to_string(),
            pid,
        }
    }

    pub async fn shutdown(&mut self) -> waymux::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap(),
            None => Ok(()),
        }
    }
}

/// 조건이 참이 될 때까지 대기 (최대 2초)
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
