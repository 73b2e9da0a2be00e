// ABOUTME: Runs one handler as a child process per message with a scoped environment
// ABOUTME: Non-zero exits are folded into an error banner rather than suppressed

use super::HandlerProfile;
use crate::metrics;
use crate::traits::InboundMessage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Conventional shell status for a program that could not be started
pub const SPAWN_FAILED_CODE: i32 = 127;

/// Captured result of one handler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResult {
    /// Exit code; 128+N when killed by signal N, 127 when the spawn failed
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl HandlerResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// What gets relayed: stdout on success, an error banner otherwise
    pub fn effective_output(&self, handler_name: &str) -> String {
        if self.success() {
            return self.stdout.clone();
        }
        format!(
            "*** Error: handler {} returned error code {}. ***\n{}\n{}",
            handler_name, self.exit_code, self.stderr, self.stdout
        )
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(SPAWN_FAILED_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILED_CODE)
}

/// Spawns handler processes inside the configured working directory
#[derive(Debug, Clone)]
pub struct Executor {
    run_dir: PathBuf,
}

impl Executor {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    /// Run `handler` for `message`. Returns `None` when the access filter
    /// denies the message; in that case no process is started.
    pub async fn execute(
        &self,
        handler: &HandlerProfile,
        message: &InboundMessage,
    ) -> Option<HandlerResult> {
        if !handler.access().is_allowed(&message.identity()) {
            tracing::debug!(
                handler = %handler.name(),
                room_id = %message.room_id,
                sender = %message.sender,
                "Handler not permitted for this room/sender"
            );
            metrics::record_handler_run(handler.name(), "denied");
            return None;
        }

        let env = handler.invocation_env(message);
        tracing::debug!(
            handler = %handler.name(),
            path = %handler.path().display(),
            args = %message.body,
            "Running handler"
        );

        let output = Command::new(handler.path())
            .arg(&message.body)
            .env_clear()
            .envs(&env)
            .current_dir(&self.run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let result = match output {
            Ok(output) => HandlerResult {
                exit_code: exit_code_of(output.status),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            Err(e) => {
                tracing::warn!(
                    handler = %handler.name(),
                    error = %e,
                    "Failed to start handler"
                );
                HandlerResult {
                    exit_code: SPAWN_FAILED_CODE,
                    stdout: String::new(),
                    stderr: format!("failed to start: {}", e),
                }
            }
        };

        if result.success() {
            metrics::record_handler_run(handler.name(), "ok");
        } else {
            tracing::debug!(
                handler = %handler.name(),
                exit_code = result.exit_code,
                stderr = %result.stderr,
                stdout = %result.stdout,
                "Handler exited with error"
            );
            metrics::record_handler_run(handler.name(), "error");
        }

        Some(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::handler::{ALLOW_ENV, DENY_ENV};
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn profile(path: &Path, env: &[(&str, &str)]) -> HandlerProfile {
        let mut env: BTreeMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        HandlerProfile::new(name, path, ".", env).unwrap()
    }

    #[tokio::test]
    async fn test_body_passed_as_single_argument() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "echo", r#"printf '%s|%s' "$#" "$1""#);
        let executor = Executor::new(dir.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "!echo two words");
        let result = executor.execute(&profile(&script, &[]), &msg).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, "1|!echo two words");
    }

    #[tokio::test]
    async fn test_environment_is_scoped_to_template_and_message() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "env",
            r#"printf '%s %s %s %s' "$__room_id" "$__sender" "$__city" "${HOME:-unset}""#,
        );
        let executor = Executor::new(dir.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "go");
        let result = executor
            .execute(&profile(&script, &[("__city", "Vienna")]), &msg)
            .await
            .unwrap();

        assert_eq!(result.stdout, "!r:x @u:x Vienna unset");
    }

    #[tokio::test]
    async fn test_runs_in_run_dir() {
        let scripts = TempDir::new().unwrap();
        let run = TempDir::new().unwrap();
        let script = write_script(scripts.path(), "pwd", "pwd");
        let executor = Executor::new(run.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "go");
        let result = executor.execute(&profile(&script, &[]), &msg).await.unwrap();

        let expected = std::fs::canonicalize(run.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(&result.stdout).unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_failure_produces_banner() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "broken", "echo boom >&2\nexit 2");
        let executor = Executor::new(dir.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "go");
        let result = executor.execute(&profile(&script, &[]), &msg).await.unwrap();

        assert_eq!(result.exit_code, 2);
        let output = result.effective_output("broken");
        assert!(output.contains("broken"));
        assert!(output.contains('2'));
        assert!(output.contains("boom"));
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_stdout() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "partial", "echo half done\nexit 1");
        let executor = Executor::new(dir.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "go");
        let result = executor.execute(&profile(&script, &[]), &msg).await.unwrap();

        assert!(result.effective_output("partial").ends_with("half done"));
    }

    #[tokio::test]
    async fn test_denied_message_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = write_script(
            dir.path(),
            "guarded",
            &format!("touch '{}'", marker.display()),
        );
        let executor = Executor::new(dir.path());
        let handler = profile(&script, &[(ALLOW_ENV, "^!room1"), (DENY_ENV, "@bad")]);

        let outside = InboundMessage::new("!room2", "@user1", "go");
        assert!(executor.execute(&handler, &outside).await.is_none());
        assert!(!marker.exists());

        let blocked = InboundMessage::new("!room1", "@bad", "go");
        assert!(executor.execute(&handler, &blocked).await.is_none());
        assert!(!marker.exists());

        let inside = InboundMessage::new("!room1", "@user2", "go");
        assert!(executor.execute(&handler, &inside).await.is_some());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_missing_executable_reports_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let handler = profile(&dir.path().join("vanished"), &[]);
        let executor = Executor::new(dir.path());

        let msg = InboundMessage::new("!r:x", "@u:x", "go");
        let result = executor.execute(&handler, &msg).await.unwrap();

        assert_eq!(result.exit_code, SPAWN_FAILED_CODE);
        assert!(result.effective_output("vanished").contains("failed to start"));
    }

    #[test]
    fn test_success_output_is_stdout() {
        let result = HandlerResult {
            exit_code: 0,
            stdout: "pong".to_string(),
            stderr: "noise".to_string(),
        };
        assert_eq!(result.effective_output("ping"), "pong");
    }

    #[test]
    fn test_banner_layout() {
        let result = HandlerResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            result.effective_output("broken"),
            "*** Error: handler broken returned error code 2. ***\nboom\n"
        );
    }
}
