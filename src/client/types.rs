//! Request and response bodies of the daemon HTTP API

use crate::{DocksideError, Result};
use serde::{Deserialize, Serialize};

/// Error body returned by the daemon on failure
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Container inspect response (the fields the client needs)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerJson {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub config: ContainerConfigSummary,
    pub host_config: HostConfigSummary,
}

/// Runtime state of a container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub exit_code: i32,
}

/// Creation-time config of an inspected container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfigSummary {
    pub image: String,
    pub tty: bool,
    pub open_stdin: bool,
}

/// Host config of an inspected container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfigSummary {
    pub log_config: LogConfig,
}

/// Logging driver of a container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LogConfig {
    #[serde(rename = "Type")]
    pub driver: String,
}

/// Body of `POST /containers/create`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub host_config: HostConfig,
}

/// Host configuration for container creation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub restart_policy: RestartPolicy,
}

/// Restart policy (`--restart`)
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
    pub maximum_retry_count: u32,
}

impl RestartPolicy {
    /// Parse `no`, `always`, `unless-stopped` or `on-failure[:N]`
    pub fn parse(policy: &str) -> Result<Self> {
        let (name, count) = match policy.split_once(':') {
            Some((name, count)) => (name, Some(count)),
            None => (policy, None),
        };

        match (name, count) {
            ("" | "no", None) => Ok(Self::default()),
            ("always" | "unless-stopped", None) => Ok(Self {
                name: name.to_string(),
                maximum_retry_count: 0,
            }),
            ("on-failure", count) => {
                let maximum_retry_count = match count {
                    Some(c) => c.parse().map_err(|_| {
                        DocksideError::InvalidRequest(format!("maximum retry count must be an integer: {}", c))
                    })?,
                    None => 0,
                };
                Ok(Self {
                    name: name.to_string(),
                    maximum_retry_count,
                })
            }
            _ => Err(DocksideError::InvalidRequest(format!(
                "invalid restart policy {}",
                policy
            ))),
        }
    }

    pub fn is_always(&self) -> bool {
        self.name == "always"
    }

    pub fn is_on_failure(&self) -> bool {
        self.name == "on-failure"
    }
}

/// Response of `POST /containers/create`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Response of `POST /containers/{id}/wait`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitResponse {
    pub status_code: i64,
}

/// Options for `POST /containers/{id}/attach`
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    pub stream: bool,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub detach_keys: Option<String>,
}

/// Body of `POST /containers/{id}/exec` and of the hijacked exec start
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub privileged: bool,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub detach: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detach_keys: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub cmd: Vec<String>,
}

/// Options for `GET /containers/{id}/logs`
#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub follow: bool,
    pub timestamps: bool,
    pub since: Option<String>,
    /// Number of lines from the end, or `all`
    pub tail: String,
}

/// Response of `POST /containers/{id}/exec`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateResponse {
    #[serde(default)]
    pub id: String,
}

/// Body of a non-hijacked `POST /exec/{id}/start`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStartCheck {
    pub detach: bool,
    pub tty: bool,
}

/// Response of `GET /exec/{id}/json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub running: bool,
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!(RestartPolicy::parse("no").unwrap(), RestartPolicy::default());
        assert!(RestartPolicy::parse("always").unwrap().is_always());
        let policy = RestartPolicy::parse("on-failure:3").unwrap();
        assert!(policy.is_on_failure());
        assert_eq!(policy.maximum_retry_count, 3);
        assert!(RestartPolicy::parse("sometimes").is_err());
        assert!(RestartPolicy::parse("always:2").is_err());
        assert!(RestartPolicy::parse("on-failure:x").is_err());
    }

    #[test]
    fn test_container_json_defaults() {
        let json = r#"{"Id":"abc","State":{"Running":true,"ExitCode":0},"Config":{"Tty":true}}"#;
        let c: ContainerJson = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, "abc");
        assert!(c.state.running);
        assert!(!c.state.paused);
        assert!(c.config.tty);
        assert!(!c.config.open_stdin);
    }

    #[test]
    fn test_exec_config_serialization() {
        let config = ExecConfig {
            tty: true,
            attach_stdout: true,
            cmd: vec!["sh".to_string()],
            detach_keys: Some("ctrl-p,ctrl-q".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["Tty"], true);
        assert_eq!(value["AttachStdout"], true);
        assert_eq!(value["Cmd"][0], "sh");
        assert_eq!(value["DetachKeys"], "ctrl-p,ctrl-q");
        assert!(value.get("User").is_none());
    }

    #[test]
    fn test_exec_inspect_null_exit_code() {
        let json = r#"{"ID":"e1","Running":true,"ExitCode":null}"#;
        let inspect: ExecInspect = serde_json::from_str(json).unwrap();
        assert_eq!(inspect.id, "e1");
        assert!(inspect.running);
        assert_eq!(inspect.exit_code, None);
    }
}
