use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// How a trading agent reaches the `claude` binary.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable to run; `claude` unless overridden for wrappers.
    pub command: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

fn decision_args(system_prompt: &str, transcript: &str, model: &str) -> Vec<String> {
    [
        "-p",
        transcript,
        "--system-prompt",
        system_prompt,
        "--model",
        model,
        "--output-format",
        "text",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Turn a finished process into the agent's reply text.
fn reply_from_output(command: &str, output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(%command, status = %output.status, stderr = %stderr, "Model CLI exited with failure");
        return Err(AgentError::Cli(format!(
            "{command} exited {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let reply = String::from_utf8_lossy(&output.stdout).into_owned();
    if reply.trim().is_empty() {
        return Err(AgentError::Cli(format!("{command} produced no decision text")));
    }
    Ok(reply)
}

/// Run one decision request: the agent's system prompt plus the rendered
/// dialog transcript. Returns stdout as the raw decision text.
pub async fn invoke_claude(
    system_prompt: &str,
    transcript: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(
        model = %config.model,
        transcript_len = transcript.len(),
        "Requesting decision from model CLI"
    );

    let mut command = Command::new(&config.command);
    command
        .args(decision_args(system_prompt, transcript, &config.model))
        .kill_on_drop(true);

    let output = match tokio::time::timeout(config.timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(AgentError::Cli(format!(
                "Failed to spawn {}: {e}",
                config.command
            )));
        }
        Err(_) => return Err(AgentError::Timeout(config.timeout.as_secs())),
    };

    reply_from_output(&config.command, output)
}

/// Whether `command --version` runs successfully.
pub async fn check_cli_available(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn default_config() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.command, "claude");
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn args_carry_prompt_system_and_model() {
        let args = decision_args("be careful", "user: hold?", "m-1");
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "user: hold?");
        assert_eq!(args[3], "be careful");
        assert_eq!(args[5], "m-1");
        assert_eq!(args.last().map(String::as_str), Some("text"));
    }

    #[cfg(unix)]
    #[test]
    fn failed_exit_is_a_cli_error() {
        let err = reply_from_output("claude", output(2, "", "bad model\n")).unwrap_err();
        match err {
            AgentError::Cli(msg) => assert!(msg.contains("bad model")),
            other => panic!("Expected Cli error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn blank_stdout_is_rejected() {
        let result = reply_from_output("claude", output(0, "  \n", ""));
        assert!(matches!(result, Err(AgentError::Cli(_))));
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_the_reply() {
        let reply = reply_from_output("claude", output(0, "{\"action\":\"wait\"}\n", "")).unwrap();
        assert_eq!(reply.trim(), r#"{"action":"wait"}"#);
    }

    #[tokio::test]
    async fn missing_binary_is_a_cli_error() {
        let config = ClaudeCliConfig {
            command: "definitely-not-an-installed-binary-7f3a".to_string(),
            ..ClaudeCliConfig::default()
        };
        let result = invoke_claude("system", "user", &config).await;
        assert!(matches!(result, Err(AgentError::Cli(_))));
        assert!(!check_cli_available(&config.command).await);
    }
}
