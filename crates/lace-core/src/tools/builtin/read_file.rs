//! Read-only file tool, grounded on `krusty-core`'s `tools::implementations::read`
//! (params struct, JSON schema literal, structured result envelope).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::ContentBlock;
use crate::tools::{Tool, ToolAnnotations, ToolContext, ToolOutcome};

#[derive(Debug, Deserialize)]
struct ReadFileParams {
    path: String,
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the contents of a file as UTF-8 text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to read" }
            },
            "required": ["path"]
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
        let params: ReadFileParams = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(err) => return ToolOutcome::failed(format!("invalid arguments: {err}")),
        };

        match tokio::fs::read_to_string(&params.path).await {
            Ok(contents) => ToolOutcome::completed(vec![ContentBlock::text(contents)]),
            Err(err) => ToolOutcome::failed(format!("failed to read {}: {err}", params.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn reads_an_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, "hello world").await.expect("write");

        let tool = ReadFileTool;
        let ctx = ToolContext {
            thread_id: "t".into(),
            session_id: None,
            project_id: None,
            cancellation: CancellationToken::new(),
        };
        let outcome = tool
            .execute(json!({"path": path.to_string_lossy()}), &ctx)
            .await;
        assert_eq!(outcome.status, crate::model::ToolStatus::Completed);
        assert_eq!(ContentBlock::join_text(&outcome.content), "hello world");
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let tool = ReadFileTool;
        let ctx = ToolContext {
            thread_id: "t".into(),
            session_id: None,
            project_id: None,
            cancellation: CancellationToken::new(),
        };
        let outcome = tool
            .execute(json!({"path": "/no/such/file-for-lace-tests"}), &ctx)
            .await;
        assert_eq!(outcome.status, crate::model::ToolStatus::Failed);
    }
}
