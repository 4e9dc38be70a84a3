use crate::error::{Result, WaymuxError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// 데몬 pid를 기록하는 단일 인스턴스 lock 파일
///
/// 데몬이 실행되는 동안 파일에 exclusive flock을 잡고 있습니다. 비정상 종료 후
/// 남은 파일은 잠겨 있지 않으므로 다음 실행이 이어받습니다.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let mut owner = String::new();
                let _ = file.read_to_string(&mut owner);
                return Err(WaymuxError::AlreadyRunning(owner.trim().to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let mut previous = String::new();
        file.read_to_string(&mut previous)?;
        if !previous.trim().is_empty() {
            warn!(
                path = %path.display(),
                stale_pid = previous.trim(),
                "taking over stale lock file"
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// lock 해제 및 파일 삭제
    pub fn release(mut self) -> Result<()> {
        self.release_inner()?;
        Ok(())
    }

    fn release_inner(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            // 삭제 후 unlock: 그 사이에 다른 인스턴스가 같은 파일을 잡지 못하도록
            let removed = std::fs::remove_file(&self.path);
            FileExt::unlock(&file)?;
            removed?;
        }
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

/// 클라이언트 측 확인: lock 파일이 없으면 데몬이 실행 중이 아님
pub fn ensure_running(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(WaymuxError::NotRunning)
    }
}
