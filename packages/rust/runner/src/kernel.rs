//! Kernel abstraction: something that runs one notebook to completion.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use nbpublish_shared::{PublishError, Result};

/// Placeholder replaced with the notebook path in kernel commands.
pub const NOTEBOOK_PLACEHOLDER: &str = "{notebook}";

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Executes every cell of a notebook, strictly in order.
///
/// Dropping the returned future must abandon the run; the executor relies on
/// that to enforce timeouts.
pub trait Kernel: Send + Sync + 'static {
    fn run(&self, notebook: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Runs an external command per notebook, e.g. `jupyter nbconvert --execute`.
#[derive(Debug, Clone)]
pub struct CommandKernel {
    command: Vec<String>,
}

impl CommandKernel {
    /// `command[0]` is the program; `{notebook}` in any argument is replaced
    /// with the notebook path.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(PublishError::config("kernel command must name a program"));
        }
        Ok(Self { command })
    }

    fn args_for(&self, notebook: &Path) -> Vec<String> {
        let path = notebook.to_string_lossy();
        self.command[1..]
            .iter()
            .map(|arg| arg.replace(NOTEBOOK_PLACEHOLDER, &path))
            .collect()
    }
}

impl Kernel for CommandKernel {
    async fn run(&self, notebook: &Path) -> Result<()> {
        let id = notebook.display().to_string();
        let program = &self.command[0];
        let args = self.args_for(notebook);

        debug!(%program, ?args, "executing kernel command");

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = notebook.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| PublishError::execution(&id, format!("failed to start {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr_tail(&stderr);
            warn!(exit_code = ?output.status.code(), stderr = %tail, "kernel command failed");
            let message = match output.status.code() {
                Some(code) => format!("exited with status {code}: {tail}"),
                None => format!("terminated by signal: {tail}"),
            };
            return Err(PublishError::execution(&id, message.trim_end().to_string()));
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(args: &[&str]) -> CommandKernel {
        CommandKernel::new(args.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandKernel::new(Vec::new()).is_err());
        assert!(CommandKernel::new(vec![" ".into()]).is_err());
    }

    #[test]
    fn placeholder_substituted_in_any_argument() {
        let k = kernel(&["jupyter", "nbconvert", "--execute", "{notebook}", "--output={notebook}.out"]);
        assert_eq!(
            k.args_for(Path::new("/t/a.ipynb")),
            vec!["nbconvert", "--execute", "/t/a.ipynb", "--output=/t/a.ipynb.out"]
        );
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_success_and_failure() {
        let nb = std::env::temp_dir().join(format!("nbp-kernel-{}.ipynb", uuid::Uuid::now_v7()));
        std::fs::write(&nb, "{}").unwrap();

        assert!(kernel(&["cat", "{notebook}"]).run(&nb).await.is_ok());

        let err = kernel(&["sh", "-c", "echo boom >&2; exit 3"]).run(&nb).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("status 3"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");

        let _ = std::fs::remove_file(&nb);
    }
}
