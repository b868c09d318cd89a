//! Tool System
//!
//! The fixed set of host-side tools the model may call. Dispatch goes through
//! the closed [`ToolKind`] / [`ToolInvocation`] enums, so adding a tool is a
//! compile-checked change rather than a new string branch.
//!
//! Every failure inside the executor is rendered as text; nothing escapes
//! [`ToolExecutor::execute`] as an error.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::process::Command;

use crate::error::{AgentError, Result};

/// Argument mapping as produced by the model
pub type Arguments = Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation token, backend-assigned or generated
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result from tool execution, matched 1:1 with a [`ToolCall`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echoes the request's id
    pub id: String,

    /// Tool that was called
    pub name: String,

    /// Output text; errors are encoded here too
    pub output: String,
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    fn required_string(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
        }
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// JSON-Schema object describing the parameters, as backends expect it
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.param_type, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// The closed set of tools exposed to the model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RunCommand,
    CreateFile,
    ReadFile,
}

impl ToolKind {
    pub const ALL: [Self; 3] = [Self::RunCommand, Self::CreateFile, Self::ReadFile];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::RunCommand => "run_command",
            Self::CreateFile => "create_file",
            Self::ReadFile => "read_file",
        }
    }

    pub fn schema(self) -> ToolSchema {
        match self {
            Self::RunCommand => ToolSchema {
                name: self.name().into(),
                description: "Execute a shell command on the server and return stdout, \
                              stderr, and exit code."
                    .into(),
                parameters: vec![ParameterSchema::required_string(
                    "command",
                    "The shell command to execute",
                )],
                has_side_effects: true,
            },
            Self::CreateFile => ToolSchema {
                name: self.name().into(),
                description: "Create or overwrite a file at the given path with the given content."
                    .into(),
                parameters: vec![
                    ParameterSchema::required_string("path", "Absolute or relative file path"),
                    ParameterSchema::required_string("content", "File content to write"),
                ],
                has_side_effects: true,
            },
            Self::ReadFile => ToolSchema {
                name: self.name().into(),
                description: "Read and return the contents of a file.".into(),
                parameters: vec![ParameterSchema::required_string(
                    "path",
                    "Absolute or relative file path",
                )],
                has_side_effects: false,
            },
        }
    }
}

/// A validated tool call with typed arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    RunCommand { command: String },
    CreateFile { path: String, content: String },
    ReadFile { path: String },
}

impl ToolInvocation {
    /// Validate a call by name and required-argument presence
    pub fn decode(name: &str, arguments: &Arguments) -> Result<Self> {
        let kind =
            ToolKind::from_name(name).ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        let arg = |key: &str| -> Result<String> {
            match arguments.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(AgentError::ToolValidation(format!(
                    "argument '{key}' for {name} must be a string"
                ))),
                None => Err(AgentError::ToolValidation(format!(
                    "missing required argument '{key}' for {name}"
                ))),
            }
        };

        Ok(match kind {
            ToolKind::RunCommand => Self::RunCommand {
                command: arg("command")?,
            },
            ToolKind::CreateFile => Self::CreateFile {
                path: arg("path")?,
                content: arg("content")?,
            },
            ToolKind::ReadFile => Self::ReadFile { path: arg("path")? },
        })
    }

    pub const fn kind(&self) -> ToolKind {
        match self {
            Self::RunCommand { .. } => ToolKind::RunCommand,
            Self::CreateFile { .. } => ToolKind::CreateFile,
            Self::ReadFile { .. } => ToolKind::ReadFile,
        }
    }
}

/// Runs tool calls against the host. Side effects are real and immediate.
#[derive(Clone, Debug)]
pub struct ToolExecutor {
    command_timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

    pub const fn new() -> Self {
        Self {
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub const fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Schemas for every tool, in a stable order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        ToolKind::ALL.into_iter().map(ToolKind::schema).collect()
    }

    /// Run one tool call to completion. Never fails.
    pub async fn execute(&self, name: &str, arguments: &Arguments) -> String {
        let outcome = match ToolInvocation::decode(name, arguments) {
            Ok(invocation) => self.dispatch(invocation).await,
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(tool = %name, error = %e, "Tool call failed");
            format!("[error: {e}]")
        })
    }

    /// Execute a model-issued call and correlate the result by id
    pub async fn run(&self, call: &ToolCall) -> ToolResult {
        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");
        ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output: self.execute(&call.name, &call.arguments).await,
        }
    }

    async fn dispatch(&self, invocation: ToolInvocation) -> Result<String> {
        match invocation {
            ToolInvocation::RunCommand { command } => self.run_command(&command).await,
            ToolInvocation::CreateFile { path, content } => create_file(&path, &content).await,
            ToolInvocation::ReadFile { path } => read_file(&path).await,
        }
    }

    async fn run_command(&self, command: &str) -> Result<String> {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let Ok(output) = tokio::time::timeout(self.command_timeout, cmd.output()).await else {
            return Ok(format!(
                "[error: command timed out after {}s]",
                self.command_timeout.as_secs()
            ));
        };
        let output = output.map_err(|e| AgentError::ToolExecution(e.to_string()))?;

        Ok(compose_command_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
            exit_code(output.status),
        ))
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn compose_command_output(stdout: &str, stderr: &str, code: i32) -> String {
    let mut output = String::from(stdout);
    if !stderr.is_empty() {
        output.push_str("\nSTDERR:\n");
        output.push_str(stderr);
    }
    output.push_str(&format!("\n[exit code: {code}]"));
    output.trim().to_string()
}

async fn create_file(path: &str, content: &str) -> Result<String> {
    let path = expand_home(path);
    let io_err = |e: std::io::Error| AgentError::ToolExecution(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&path, content).await.map_err(io_err)?;

    Ok(format!("File created: {}", path.display()))
}

async fn read_file(path: &str) -> Result<String> {
    let path = expand_home(path);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AgentError::ToolExecution(format!("{}: {e}", path.display())))
}

/// Expand a leading `~` or `~user` to that user's home directory.
///
/// Paths whose user cannot be resolved are returned unchanged.
fn expand_home(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    let (user, tail) = rest.split_once('/').unwrap_or((rest, ""));

    let home = if user.is_empty() {
        std::env::var_os("HOME").map(PathBuf::from)
    } else {
        std::fs::read_to_string("/etc/passwd")
            .ok()
            .and_then(|passwd| home_in_passwd(&passwd, user))
    };

    match home {
        Some(home) if tail.is_empty() => home,
        Some(home) => home.join(tail.trim_start_matches('/')),
        None => PathBuf::from(path),
    }
}

/// Home directory field (6th) of `user`'s passwd entry
fn home_in_passwd(passwd: &str, user: &str) -> Option<PathBuf> {
    passwd
        .lines()
        .map(|line| line.split(':').collect::<Vec<_>>())
        .find(|fields| fields.len() >= 7 && fields[0] == user)
        .map(|fields| PathBuf::from(fields[5]))
}
