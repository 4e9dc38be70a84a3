use crate::error::{Result, WaymuxError};
use crate::protocol::DEFAULT_MAX_PAYLOAD_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 시스템 설정 파일 경로
pub const DEFAULT_CONFIG_PATH: &str = "/etc/waymux/config.toml";

/// 세션이 남아 있는 상태에서 host가 다시 등록될 때의 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReregisterPolicy {
    /// 새 host로 덮어쓰고 기존 세션은 그대로 둔다
    #[default]
    Replace,
    /// 활성 세션이 있으면 거부
    Reject,
    /// 기존 세션을 모두 종료한 뒤 덮어쓴다
    StopSessions,
}

/// waymux 데몬 설정
///
/// 설정 파일은 /etc/waymux/config.toml에 저장됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 제어 소켓 경로
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// 단일 인스턴스 lock 파일 경로
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    /// 제어 소켓 권한 (모든 로컬 사용자가 접속 가능해야 함)
    #[serde(default = "default_open_mode")]
    pub socket_mode: u32,

    /// host의 runtime dir / display에 부여할 권한
    #[serde(default = "default_open_mode")]
    pub host_path_mode: u32,

    /// 인증에 사용할 PAM 서비스 이름
    #[serde(default = "default_pam_service")]
    pub pam_service: String,

    /// 세션 명령어를 실행할 shell
    #[serde(default = "default_session_shell")]
    pub session_shell: String,

    /// 동시에 처리할 최대 연결 수 (0 = 제한 없음)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// 요청 payload 최대 크기 (bytes)
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: u64,

    /// 요청 프레임을 읽는 최대 시간 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// host 재등록 정책
    #[serde(default)]
    pub host_reregister: ReregisterPolicy,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/waymux.sock")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/var/run/waymux.lock")
}

fn default_open_mode() -> u32 {
    0o777
}

fn default_pam_service() -> String {
    "passwd".to_string()
}

fn default_session_shell() -> String {
    "/bin/sh".to_string()
}

fn default_max_connections() -> usize {
    64
}

fn default_max_payload_len() -> u64 {
    DEFAULT_MAX_PAYLOAD_LEN
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            lock_path: default_lock_path(),
            socket_mode: default_open_mode(),
            host_path_mode: default_open_mode(),
            pam_service: default_pam_service(),
            session_shell: default_session_shell(),
            max_connections: default_max_connections(),
            max_payload_len: default_max_payload_len(),
            request_timeout_secs: default_request_timeout_secs(),
            host_reregister: ReregisterPolicy::default(),
        }
    }
}

impl Config {
    /// 설정 파일에서 로드 (없으면 기본값 사용)
    ///
    /// `path`가 `None`이면 /etc/waymux/config.toml을 봅니다.
    /// 명시적으로 지정한 파일이 없으면 에러입니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(WaymuxError::ConfigError(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                // 설정 파일이 없으면 기본값 반환
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&config_path)?;
        Self::parse(&content)
    }

    /// TOML 문자열 파싱
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| WaymuxError::ConfigError(e.to_string()))
    }

    /// 동시 연결 제한 (`None` = 제한 없음)
    pub fn connection_limit(&self) -> Option<usize> {
        (self.max_connections > 0).then_some(self.max_connections)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.socket_path, PathBuf::from("/var/run/waymux.sock"));
        assert_eq!(config.lock_path, PathBuf::from("/var/run/waymux.lock"));
        assert_eq!(config.socket_mode, 0o777);
        assert_eq!(config.pam_service, "passwd");
        assert_eq!(config.connection_limit(), Some(64));
        assert_eq!(config.host_reregister, ReregisterPolicy::Replace);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        assert!(toml_string.contains("socket_path"));
        assert!(toml_string.contains("host_reregister = \"replace\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            socket_path = "/tmp/waymux-test.sock"
            socket_mode = 0o770
            max_connections = 0
            host_reregister = "stop_sessions"
        "#;

        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/waymux-test.sock"));
        assert_eq!(config.socket_mode, 0o770);
        assert_eq!(config.connection_limit(), None);
        assert_eq!(config.host_reregister, ReregisterPolicy::StopSessions);
        // 지정하지 않은 값은 기본값
        assert_eq!(config.session_shell, "/bin/sh");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = Config::parse("host_reregister = \"sometimes\"");
        assert!(matches!(result, Err(WaymuxError::ConfigError(_))));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());

        let present = dir.path().join("waymux.toml");
        fs::write(&present, "pam_service = \"login\"\n").unwrap();
        let config = Config::load(Some(&present)).unwrap();
        assert_eq!(config.pam_service, "login");
    }
}
