use crate::config::ReregisterPolicy;
use crate::error::{Result, WaymuxError};
use crate::protocol::{HostCompositor, Session};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct RegistryState {
    host: Option<HostCompositor>,
    /// 삽입 순서 유지
    sessions: Vec<Session>,
}

/// host compositor와 활성 세션의 단일 소유자
///
/// 모든 연산은 하나의 lock 안에서 메모리 상태만 바꿉니다. 인증, 프로세스 실행,
/// 시그널 전송 같은 외부 호출은 lock 밖에서 이루어져야 합니다.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// host 등록
    ///
    /// `StopSessions` 정책이면 기존 세션을 같은 lock 안에서 꺼내 반환합니다.
    /// 호출자가 lock 밖에서 이 세션들에 시그널을 보냅니다.
    pub async fn register_host(
        &self,
        host: HostCompositor,
        policy: ReregisterPolicy,
    ) -> Result<Vec<Session>> {
        let mut state = self.state.write().await;

        let displaced = match policy {
            ReregisterPolicy::Replace => Vec::new(),
            ReregisterPolicy::Reject => {
                if state.host.is_some() && !state.sessions.is_empty() {
                    return Err(WaymuxError::HostBusy(state.sessions.len()));
                }
                Vec::new()
            }
            ReregisterPolicy::StopSessions => std::mem::take(&mut state.sessions),
        };

        state.host = Some(host);
        Ok(displaced)
    }

    pub async fn unregister_host(&self) -> Result<HostCompositor> {
        self.state
            .write()
            .await
            .host
            .take()
            .ok_or(WaymuxError::NotRegistered)
    }

    /// 현재 host의 pid가 `pid`일 때만 등록 해제
    ///
    /// 시그널을 보내는 사이에 다른 host가 등록됐다면 그 host는 건드리지 않습니다.
    pub async fn unregister_host_if(&self, pid: u64) -> Result<HostCompositor> {
        let mut state = self.state.write().await;
        match &state.host {
            Some(host) if host.pid == pid => state.host.take().ok_or(WaymuxError::NotRegistered),
            _ => Err(WaymuxError::NotRegistered),
        }
    }

    pub async fn current_host(&self) -> Option<HostCompositor> {
        self.state.read().await.host.clone()
    }

    /// 세션 추가
    ///
    /// 세션을 띄울 때 본 `host`가 여전히 등록된 host일 때만 추가합니다. 그 사이
    /// StopHost나 재등록이 있었다면 `NotRegistered` 입니다.
    pub async fn add_session(&self, session: Session, host: &HostCompositor) -> Result<()> {
        let mut state = self.state.write().await;
        if state.host.as_ref() != Some(host) {
            return Err(WaymuxError::NotRegistered);
        }
        if state.sessions.iter().any(|s| s.id == session.id) {
            return Err(WaymuxError::DuplicateSession(session.id));
        }
        state.sessions.push(session);
        Ok(())
    }

    /// 세션 제거, 제거된 세션은 `alive = false`로 반환
    pub async fn remove_session(&self, id: u64) -> Result<Session> {
        let mut state = self.state.write().await;
        let index = state
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or(WaymuxError::NoSuchSession(id))?;

        let mut session = state.sessions.remove(index);
        session.alive = false;
        Ok(session)
    }

    /// 모든 세션을 한 번에 꺼냄
    pub async fn drain_sessions(&self) -> Vec<Session> {
        std::mem::take(&mut self.state.write().await.sessions)
    }

    /// 호출 시점의 스냅샷 (삽입 순서)
    pub async fn list_sessions(&self) -> Vec<Session> {
        self.state.read().await.sessions.clone()
    }

    pub async fn sessions_owned_by(&self, username: &str) -> Vec<u64> {
        self.state
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.username == username)
            .map(|s| s.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(pid: u64) -> HostCompositor {
        HostCompositor {
            runtime_dir: format!("/run/user/{}", pid),
            display: format!("/run/user/{}/wayland-0", pid),
            pid,
        }
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = Registry::new();
        registry.register_host(host(1), ReregisterPolicy::Replace).await.unwrap();
        registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await.unwrap();

        let displaced = registry.register_host(host(2), ReregisterPolicy::Replace).await.unwrap();

        assert!(displaced.is_empty());
        assert_eq!(registry.current_host().await, Some(host(2)));
        assert_eq!(registry.list_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_policy_with_active_sessions() {
        let registry = Registry::new();
        registry.register_host(host(1), ReregisterPolicy::Reject).await.unwrap();
        registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await.unwrap();

        let result = registry.register_host(host(2), ReregisterPolicy::Reject).await;
        assert!(matches!(result, Err(WaymuxError::HostBusy(1))));
        assert_eq!(registry.current_host().await, Some(host(1)));
    }

    #[tokio::test]
    async fn test_stop_sessions_policy_displaces_sessions() {
        let registry = Registry::new();
        registry.register_host(host(1), ReregisterPolicy::Replace).await.unwrap();
        registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await.unwrap();
        registry.add_session(Session::new(11, "bob", "sway"), &host(1)).await.unwrap();

        let displaced = registry
            .register_host(host(2), ReregisterPolicy::StopSessions)
            .await
            .unwrap();

        let ids: Vec<u64> = displaced.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert!(registry.list_sessions().await.is_empty());
        assert_eq!(registry.current_host().await, Some(host(2)));
    }

    #[tokio::test]
    async fn test_unregister_without_host() {
        let registry = Registry::new();
        assert!(matches!(
            registry.unregister_host().await,
            Err(WaymuxError::NotRegistered)
        ));
        assert_eq!(registry.current_host().await, None);
    }

    #[tokio::test]
    async fn test_unregister_host_if_checks_pid() {
        let registry = Registry::new();
        registry.register_host(host(5), ReregisterPolicy::Replace).await.unwrap();

        assert!(registry.unregister_host_if(6).await.is_err());
        assert_eq!(registry.current_host().await, Some(host(5)));
        assert_eq!(registry.unregister_host_if(5).await.unwrap(), host(5));
        assert_eq!(registry.current_host().await, None);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_sessions() {
        let registry = Registry::new();
        registry.register_host(host(1), ReregisterPolicy::Replace).await.unwrap();
        registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await.unwrap();

        assert!(matches!(
            registry.add_session(Session::new(10, "bob", "sway"), &host(1)).await,
            Err(WaymuxError::DuplicateSession(10))
        ));
        assert!(matches!(
            registry.remove_session(99).await,
            Err(WaymuxError::NoSuchSession(99))
        ));

        let removed = registry.remove_session(10).await.unwrap();
        assert_eq!(removed.username, "alice");
        assert!(!removed.alive);
        assert!(registry.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_insertion_order_and_ownership() {
        let registry = Registry::new();
        registry.register_host(host(1), ReregisterPolicy::Replace).await.unwrap();
        for (id, user) in [(30, "carol"), (10, "alice"), (20, "carol")] {
            registry.add_session(Session::new(id, user, "sway"), &host(1)).await.unwrap();
        }

        let ids: Vec<u64> = registry.list_sessions().await.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert_eq!(registry.sessions_owned_by("carol").await, vec![30, 20]);

        assert_eq!(registry.drain_sessions().await.len(), 3);
        assert!(registry.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_session_requires_same_host() {
        let registry = Registry::new();
        assert!(matches!(
            registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await,
            Err(WaymuxError::NotRegistered)
        ));

        registry.register_host(host(1), ReregisterPolicy::Replace).await.unwrap();
        registry.register_host(host(2), ReregisterPolicy::Replace).await.unwrap();
        assert!(matches!(
            registry.add_session(Session::new(10, "alice", "sway"), &host(1)).await,
            Err(WaymuxError::NotRegistered)
        ));

        registry.unregister_host().await.unwrap();
        assert!(matches!(
            registry.add_session(Session::new(10, "alice", "sway"), &host(2)).await,
            Err(WaymuxError::NotRegistered)
        ));
        assert!(registry.list_sessions().await.is_empty());
    }
}
