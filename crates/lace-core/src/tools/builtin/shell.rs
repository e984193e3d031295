//! Destructive example tool, exercises approval gating end-to-end.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::ContentBlock;
use crate::tools::{Tool, ToolAnnotations, ToolContext, ToolOutcome};

#[derive(Debug, Deserialize)]
struct ShellParams {
    command: String,
}

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Runs a shell command and returns its combined stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" }
            },
            "required": ["command"]
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::destructive()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params: ShellParams = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(err) => return ToolOutcome::failed(format!("invalid arguments: {err}")),
        };

        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return ToolOutcome::failed(format!("failed to spawn shell: {err}")),
        };

        tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                let _ = child.kill().await;
                ToolOutcome::aborted("cancelled")
            }
            output = child.wait_with_output() => {
                match output {
                    Ok(output) => {
                        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                        text.push_str(&String::from_utf8_lossy(&output.stderr));
                        if output.status.success() {
                            ToolOutcome::completed(vec![ContentBlock::text(text)])
                        } else {
                            ToolOutcome::failed(text)
                        }
                    }
                    Err(err) => ToolOutcome::failed(format!("shell command failed: {err}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let tool = ShellTool;
        let ctx = ToolContext {
            thread_id: "t".into(),
            session_id: None,
            project_id: None,
            cancellation: CancellationToken::new(),
        };
        let outcome = tool.execute(json!({"command": "echo hi"}), &ctx).await;
        assert_eq!(outcome.status, crate::model::ToolStatus::Completed);
        assert_eq!(ContentBlock::join_text(&outcome.content).trim(), "hi");
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let tool = ShellTool;
        let cancellation = CancellationToken::new();
        let ctx = ToolContext {
            thread_id: "t".into(),
            session_id: None,
            project_id: None,
            cancellation: cancellation.clone(),
        };
        cancellation.cancel();
        let outcome = tool.execute(json!({"command": "sleep 5"}), &ctx).await;
        assert_eq!(outcome.status, crate::model::ToolStatus::Aborted);
    }
}
