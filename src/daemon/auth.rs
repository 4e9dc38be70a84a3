use async_trait::async_trait;
use thiserror::Error;
#[cfg(feature = "pam")]
use zeroize::Zeroizing;

/// 인증 실패
///
/// 두 경우 모두 클라이언트에는 "authentication failed: ..." 로 보고되며
/// 진단 텍스트만 다릅니다.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// 잘못된 자격 증명
    #[error("{0}")]
    Rejected(String),
    /// 인증 시스템 자체의 오류
    #[error("{0}")]
    Unavailable(String),
}

/// verify(username, secret) → pass/fail
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, username: &str, secret: &str) -> Result<(), AuthError>;
}

/// PAM 기반 인증
///
/// `pam::Client::authenticate`는 `pam_authenticate` 다음에 `pam_acct_mgmt`까지
/// 호출하므로 만료되거나 잠긴 계정도 여기서 거부됩니다.
#[cfg(feature = "pam")]
pub struct PamAuthenticator {
    service: String,
}

#[cfg(feature = "pam")]
impl PamAuthenticator {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[cfg(feature = "pam")]
#[async_trait]
impl Authenticator for PamAuthenticator {
    async fn verify(&self, username: &str, secret: &str) -> Result<(), AuthError> {
        let service = self.service.clone();
        let username = username.to_string();
        let secret = Zeroizing::new(secret.to_string());

        // PAM 호출은 blocking
        tokio::task::spawn_blocking(move || {
            let mut client = pam::Client::with_password(&service)
                .map_err(|e| AuthError::Unavailable(e.to_string()))?;
            client
                .conversation_mut()
                .set_credentials(username.as_str(), secret.as_str());
            client
                .authenticate()
                .map_err(|e| AuthError::Rejected(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Unavailable(e.to_string()))?
    }
}

/// PAM 지원 없이 빌드됐을 때 사용하는 인증기 (모든 요청 거부)
pub struct DisabledAuthenticator;

#[async_trait]
impl Authenticator for DisabledAuthenticator {
    async fn verify(&self, _username: &str, _secret: &str) -> Result<(), AuthError> {
        Err(AuthError::Unavailable(
            "waymux was built without PAM support".to_string(),
        ))
    }
}
