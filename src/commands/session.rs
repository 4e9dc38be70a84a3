use crate::ui::{with_spinner, ConfirmPrompt};
use colored::*;
use waymux::daemon::DaemonClient;
use waymux::error::Result;
use waymux::protocol::{Session, SessionInit};

/// 새 세션 시작 (비밀번호는 프롬프트 또는 stdin)
pub async fn start_session(
    client: &DaemonClient,
    username: String,
    command: String,
    password_stdin: bool,
) -> Result<()> {
    let prompt = ConfirmPrompt::new();
    let secret = if password_stdin {
        prompt.password_from_stdin()?
    } else {
        prompt.password(&username)?
    };

    let init = SessionInit {
        username,
        secret,
        command,
    };
    with_spinner("Starting session...", client.start_session(&init)).await?;

    eprintln!(
        "{} Session started for {}.",
        "[OK]".green().bold(),
        init.username.cyan()
    );
    eprintln!("  Command: {}", init.command);
    Ok(())
}

pub async fn stop_session(client: &DaemonClient, id: u64) -> Result<()> {
    client.stop_session(id).await?;
    eprintln!("{} Session {} stopped.", "[OK]".green().bold(), id);
    Ok(())
}

pub async fn stop_all_sessions(client: &DaemonClient, yes: bool) -> Result<()> {
    if !yes {
        let count = client.list_sessions().await?.len();
        if count == 0 {
            eprintln!("{} No active sessions.", "[i]".cyan());
            return Ok(());
        }
        if !ConfirmPrompt::new().confirm_stop_all(count)? {
            eprintln!("{} Cancelled.", "[X]".red());
            return Ok(());
        }
    }

    client.stop_all_sessions().await?;
    eprintln!("{} All sessions stopped.", "[OK]".green().bold());
    Ok(())
}

pub async fn list_sessions(client: &DaemonClient, json: bool) -> Result<()> {
    let sessions = client.list_sessions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        eprintln!("{} No active sessions.", "[i]".cyan());
        return Ok(());
    }

    println!("{}", format_header().bold());
    for session in &sessions {
        println!("{}", format_session(session));
    }
    Ok(())
}

pub async fn who_am_i(client: &DaemonClient, json: bool) -> Result<()> {
    let identity = client.who_am_i().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    println!("{} (uid {})", identity.username.cyan().bold(), identity.uid);
    if identity.sessions.is_empty() {
        println!("  No sessions.");
    } else {
        let ids: Vec<String> = identity.sessions.iter().map(|id| id.to_string()).collect();
        println!("  Sessions: {}", ids.join(", "));
    }
    Ok(())
}

fn format_header() -> String {
    format!("{:<8} {:<16} {:<20} {}", "ID", "USER", "STARTED", "COMMAND")
}

fn format_session(session: &Session) -> String {
    format!(
        "{:<8} {:<16} {:<20} {}",
        session.id,
        session.username,
        session.started_at.format("%Y-%m-%d %H:%M:%S"),
        session.command
    )
}
