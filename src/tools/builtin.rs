//! Built-in capabilities
//!
//! A small set of concrete tools: `edit` works the filesystem on the
//! blocking worker pool, `shell` runs commands natively async. Anything
//! beyond these is expected to be registered by the embedding application.

use std::fs;
use std::path::Path;

use serde_json::json;
use tokio::process::Command;

use crate::core::{EnsembleError, Result, ToolDefinition};
use crate::tools::registry::{Capability, ToolOutput, ToolRegistry};

/// Register the built-in capabilities
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(edit_capability());
    registry.register(shell_capability());
}

/// File editing capability (synchronous, offloaded to the blocking pool)
pub fn edit_capability() -> Capability {
    let definition = ToolDefinition::new(
        "edit",
        "Create or view a file. Command 'create' writes file_text to path, 'view' returns the file contents.",
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["create", "view"],
                    "description": "The operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Absolute path to the file"
                },
                "file_text": {
                    "type": "string",
                    "description": "Content to write when command is 'create'"
                }
            },
            "required": ["command", "path"]
        }),
        ["command", "path", "file_text"],
    );

    Capability::from_blocking(definition, |args| {
        let command = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| EnsembleError::tool("edit requires 'command'"))?;
        let path = args
            .get(1)
            .and_then(|v| v.as_str())
            .ok_or_else(|| EnsembleError::tool("edit requires 'path'"))?;

        match command {
            "create" => {
                let file_text = args.get(2).and_then(|v| v.as_str()).unwrap_or_default();
                if let Some(parent) = Path::new(path).parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, file_text)?;
                Ok(ToolOutput::Text(format!(
                    "File created successfully at: {}",
                    path
                )))
            }
            "view" => {
                let content = fs::read_to_string(path)?;
                Ok(ToolOutput::Text(content))
            }
            other => Err(EnsembleError::tool(format!(
                "Unknown edit command '{}', expected 'create' or 'view'",
                other
            ))),
        }
    })
}

/// Shell execution capability (natively async)
pub fn shell_capability() -> Capability {
    let definition = ToolDefinition::new(
        "shell",
        "Run a shell command and return its captured output.",
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                }
            },
            "required": ["command"]
        }),
        ["command"],
    );

    Capability::from_async(definition, |args| async move {
        let command = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| EnsembleError::tool("shell requires 'command'"))?
            .to_string();

        let output = Command::new("sh").arg("-c").arg(&command).output().await?;

        run_output(&command, output)
    })
}

fn run_output(command: &str, output: std::process::Output) -> Result<ToolOutput> {
    if output.status.success() {
        Ok(ToolOutput::Text(
            String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        ))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(EnsembleError::tool(format!(
            "Command '{}' exited with {}: {}",
            command,
            output.status,
            stderr.trim_end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_edit_create_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.py");
        let capability = edit_capability();

        let args = capability.positional_args(&json!({
            "command": "create",
            "path": path.to_str().unwrap(),
            "file_text": "print(1)"
        }));
        let output = capability.invoke(args).await.unwrap();
        assert!(output.content().contains("created successfully"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print(1)");

        let args = capability.positional_args(&json!({
            "command": "view",
            "path": path.to_str().unwrap()
        }));
        let output = capability.invoke(args).await.unwrap();
        assert_eq!(output.content(), "print(1)");
    }

    #[tokio::test]
    async fn test_edit_unknown_command() {
        let capability = edit_capability();
        let err = capability
            .invoke(vec![json!("delete"), json!("/tmp/x"), json!(null)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown edit command"));
    }

    #[tokio::test]
    async fn test_shell_captures_stdout() {
        let capability = shell_capability();
        let args = capability.positional_args(&json!({"command": "echo hello"}));
        let output = capability.invoke(args).await.unwrap();
        assert_eq!(output.content(), "hello");
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_is_error() {
        let capability = shell_capability();
        let err = capability
            .invoke(vec![json!("exit 3")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
