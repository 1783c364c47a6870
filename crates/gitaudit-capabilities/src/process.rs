//! Single external-process invocation with a hard timeout. On non-zero
//! exit the raw stderr is preserved in the error.

use std::time::Duration;

use gitaudit_core::GitopsError;
use tokio::process::Command;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn invoke(program: &str, args: &[String], timeout: Duration) -> Result<Vec<u8>, GitopsError> {
    let mut command = Command::new(program);
    command.args(args);
    command.kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| GitopsError::timeout(format!("{program} timed out after {timeout:?}")))?
        .map_err(|e| GitopsError::transport(format!("failed to spawn {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(GitopsError::transport(format!("{program} exited with {}: {stderr}", output.status)));
    }

    Ok(output.stdout)
}

pub async fn invoke_json<T: serde::de::DeserializeOwned>(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<T, GitopsError> {
    let stdout = invoke(program, args, timeout).await?;
    serde_json::from_slice(&stdout).map_err(|e| GitopsError::transport(format!("malformed output from {program}: {e}")))
}
