use colored::*;
use std::path::Path;
use waymux::daemon::DaemonClient;
use waymux::error::{Result, WaymuxError};
use waymux::protocol::HostCompositor;

/// 호출자의 wayland 세션을 host로 등록
pub async fn register_host(
    client: &DaemonClient,
    runtime_dir: Option<String>,
    display: Option<String>,
    pid: Option<u64>,
) -> Result<()> {
    let host = resolve_host(
        runtime_dir.or_else(|| std::env::var("XDG_RUNTIME_DIR").ok()),
        display.or_else(|| std::env::var("WAYLAND_DISPLAY").ok()),
        pid.unwrap_or_else(|| u64::from(std::os::unix::process::parent_id())),
    )?;

    client.register_host(&host).await?;

    eprintln!("{} Host compositor registered.", "[OK]".green().bold());
    eprintln!("  Runtime dir: {}", host.runtime_dir);
    eprintln!("  Display: {}", host.display);
    eprintln!("  PID: {}", host.pid);
    Ok(())
}

/// 인자/환경 변수에서 host 정보 구성
///
/// 상대 경로 display 이름(`wayland-1`)은 runtime dir 아래 소켓으로 해석합니다.
fn resolve_host(
    runtime_dir: Option<String>,
    display: Option<String>,
    pid: u64,
) -> Result<HostCompositor> {
    let runtime_dir = runtime_dir.ok_or_else(|| {
        WaymuxError::ConfigError("XDG_RUNTIME_DIR is not set; pass --runtime-dir".to_string())
    })?;
    let display = display.ok_or_else(|| {
        WaymuxError::ConfigError("WAYLAND_DISPLAY is not set; pass --display".to_string())
    })?;

    let display = if Path::new(&display).is_absolute() {
        display
    } else {
        Path::new(&runtime_dir).join(display).display().to_string()
    };

    Ok(HostCompositor {
        runtime_dir,
        display,
        pid,
    })
}

pub async fn stop_host(client: &DaemonClient) -> Result<()> {
    client.stop_host().await?;
    eprintln!("{} Host compositor stopped.", "[OK]".green().bold());
    Ok(())
}
