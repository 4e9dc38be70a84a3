use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "waymux")]
#[command(version)]
#[command(about = "Session broker for a shared Wayland host compositor", long_about = None)]
pub struct Cli {
    /// 설정 파일 (기본: /etc/waymux/config.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// 제어 소켓 경로 (설정 파일 값보다 우선)
    #[arg(short = 's', long, global = true)]
    pub socket: Option<PathBuf>,

    /// 디버그 로그
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 데몬 실행 (root 권한 필요)
    Daemon,

    /// 현재 compositor를 host로 등록
    RegisterHost {
        /// host의 XDG_RUNTIME_DIR (기본: 환경 변수)
        #[arg(long)]
        runtime_dir: Option<String>,

        /// wayland display 소켓 (기본: $XDG_RUNTIME_DIR/$WAYLAND_DISPLAY)
        #[arg(long)]
        display: Option<String>,

        /// compositor pid (기본: 부모 프로세스)
        #[arg(long)]
        pid: Option<u64>,
    },

    /// host compositor 종료
    StopHost,

    /// 새 세션 시작
    Start {
        /// 세션 사용자
        #[arg(short = 'u', long)]
        user: String,

        /// 비밀번호를 stdin 첫 줄에서 읽음
        #[arg(long)]
        password_stdin: bool,

        /// 실행할 세션 명령어
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// 세션 하나 종료
    Stop {
        /// 세션 id (pid)
        id: u64,
    },

    /// 모든 세션 종료
    StopAll {
        /// 확인 없이 바로 종료
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// 세션 목록
    List {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 호출자 신원과 소유한 세션
    Whoami {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },
}

/// 세션 명령어 인자를 한 줄로 (데몬이 shell로 실행하므로 인자마다 quoting)
pub fn command_line(command: &[String]) -> String {
    shell_words::join(command)
}
