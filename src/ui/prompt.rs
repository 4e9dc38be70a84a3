use colored::*;
use dialoguer::{Confirm, Password};
use std::io::BufRead;
use waymux::error::{Result, WaymuxError};
use zeroize::Zeroizing;

pub struct ConfirmPrompt;

impl ConfirmPrompt {
    pub fn new() -> Self {
        Self
    }

    /// 모든 세션 종료 전 확인
    pub fn confirm_stop_all(&self, session_count: usize) -> Result<bool> {
        eprintln!(
            "{} {} active session(s) will be terminated.",
            "[!]".yellow().bold(),
            session_count.to_string().bold()
        );

        Confirm::new()
            .with_prompt("Stop all sessions?")
            .default(false)
            .interact()
            .map_err(|_| WaymuxError::UserCancelled)
    }

    /// 세션 사용자 비밀번호 입력 (echo 없음)
    pub fn password(&self, username: &str) -> Result<Zeroizing<String>> {
        Password::new()
            .with_prompt(format!("Password for {}", username))
            .interact()
            .map(Zeroizing::new)
            .map_err(|_| WaymuxError::UserCancelled)
    }

    /// stdin 첫 줄에서 비밀번호 읽기 (스크립트용)
    pub fn password_from_stdin(&self) -> Result<Zeroizing<String>> {
        let mut line = Zeroizing::new(String::new());
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(Zeroizing::new(
            line.trim_end_matches(['\r', '\n']).to_string(),
        ))
    }
}

impl Default for ConfirmPrompt {
    fn default() -> Self {
        Self::new()
    }
}
