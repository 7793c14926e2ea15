use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// 外部命令的执行结果
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("找不到命令: {0}")]
    NotFound(String),

    #[error("无法启动 {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("命令超时（{0:?}）")]
    Timeout(Duration),

    #[error("命令被取消")]
    Cancelled,

    #[error("读取命令输出失败: {0}")]
    Io(String),
}

/// 运行外部命令并收集输出
///
/// 命令在 C locale 下运行。超时或收到取消信号时，子进程随 future 一起被丢弃并终止。
pub async fn run_command<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if cancel.is_cancelled() {
        return Err(CommandError::Cancelled);
    }

    let child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| CommandError::Spawn {
            command: program.to_string(),
            reason: err.to_string(),
        })?;

    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(CommandError::Cancelled),

        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(Ok(output)) => Ok(CommandOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(err)) => Err(CommandError::Io(err.to_string())),
            Err(_) => Err(CommandError::Timeout(timeout)),
        },
    }
}

/// 在非异步线程（例如 rayon 工作线程）中通过运行时句柄执行 [`run_command`]
pub fn run_command_blocking<I, S>(
    runtime: &Handle,
    program: &str,
    args: I,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    runtime.block_on(run_command(program, args, timeout, cancel))
}

/// 查找可执行文件：带路径分隔符时直接检查，否则在 `PATH` 中搜索
pub fn find_program(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

/// 启动前确认外部工具存在
pub fn ensure_program(program: &str) -> Result<PathBuf, CommandError> {
    find_program(program).ok_or_else(|| CommandError::NotFound(program.to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let cancel = CancellationToken::new();
        let output = run_command(
            "sh",
            ["-c", "echo out; echo err >&2"],
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_command_reports_exit_status() {
        let cancel = CancellationToken::new();
        let output = run_command("sh", ["-c", "exit 3"], Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_run_command_uses_c_locale() {
        let cancel = CancellationToken::new();
        let output = run_command("sh", ["-c", "echo $LC_ALL"], Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "C");
    }

    #[tokio::test]
    async fn test_run_command_timeout_kills_child() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result =
            run_command("sh", ["-c", "sleep 10"], Duration::from_millis(100), &cancel).await;

        assert!(matches!(result, Err(CommandError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_command_precancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_command("sh", ["-c", "echo never"], Duration::from_secs(5), &cancel).await;
        assert_eq!(result.unwrap_err(), CommandError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_stops_running_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = run_command("sh", ["-c", "sleep 10"], Duration::from_secs(30), &cancel).await;

        assert_eq!(result.unwrap_err(), CommandError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_blocking_cancel_from_another_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let result = run_command_blocking(
            runtime.handle(),
            "sh",
            ["-c", "sleep 10"],
            Duration::from_secs(30),
            &cancel,
        );
        canceller.join().unwrap();

        assert_eq!(result.unwrap_err(), CommandError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cancel = CancellationToken::new();
        let result = run_command(
            "definitely-not-a-real-command-xyz",
            Vec::<&str>::new(),
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_large_output_does_not_block() {
        let cancel = CancellationToken::new();
        let output = run_command(
            "sh",
            ["-c", "yes 0123456789012345678901234567890123456789 | head -n 5000"],
            Duration::from_secs(30),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.lines().count(), 5000);
    }

    #[test]
    fn test_find_program() {
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-command-xyz").is_none());
        assert!(find_program("/definitely/not/here").is_none());
        assert_eq!(
            ensure_program("definitely-not-a-real-command-xyz"),
            Err(CommandError::NotFound("definitely-not-a-real-command-xyz".to_string()))
        );
    }
}
