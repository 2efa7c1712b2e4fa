//! Command handler for the TabKeeper message protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! A message is a JSON object tagged by `type` (`SAVE_SESSION`,
//! `RESTORE_SESSION`, ...); `handle_message` decodes it, dispatches it to the
//! session store or the restore orchestrator, and always answers with a
//! `{success, error?}` object.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::app::App;
use crate::services::restore::RestoreOutcome;
use crate::types::errors::CommandError;
use crate::types::tab::TabHandle;

/// A request from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Command {
    SaveSession {
        folder_name: String,
        session_name: String,
        #[serde(default)]
        set_active: bool,
    },
    RestoreSession {
        folder_name: String,
        session_name: String,
        #[serde(default)]
        force: bool,
    },
    SetActiveSession {
        folder_name: String,
        session_name: String,
    },
    CreateFolder {
        folder_name: String,
    },
    CreateAndSwitchSession {
        folder_name: String,
        session_name: String,
    },
    DeleteFolder {
        folder_name: String,
    },
    DeleteSession {
        folder_name: String,
        session_name: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SaveSession { .. } => "SAVE_SESSION",
            Command::RestoreSession { .. } => "RESTORE_SESSION",
            Command::SetActiveSession { .. } => "SET_ACTIVE_SESSION",
            Command::CreateFolder { .. } => "CREATE_FOLDER",
            Command::CreateAndSwitchSession { .. } => "CREATE_AND_SWITCH_SESSION",
            Command::DeleteFolder { .. } => "DELETE_FOLDER",
            Command::DeleteSession { .. } => "DELETE_SESSION",
        }
    }
}

/// Reply sent back for every command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code, e.g. `ACTIVE_SESSION_DELETE_BLOCKED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The tab left in the window by `CREATE_AND_SWITCH_SESSION`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_tab_id: Option<TabHandle>,
    /// Set by `RESTORE_SESSION` when some host calls failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(err: &CommandError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            ..Self::default()
        }
    }
}

/// Runs one decoded command against the app.
pub async fn handle_command(app: &App, command: Command) -> Result<CommandResponse, CommandError> {
    match command {
        Command::SaveSession {
            folder_name,
            session_name,
            set_active,
        } => {
            app.store.create_folder(&folder_name).await?;
            app.save_current_session(&folder_name, &session_name).await?;
            if set_active {
                app.store.set_active_session(&folder_name, &session_name).await?;
            }
            Ok(CommandResponse::ok())
        }
        Command::RestoreSession {
            folder_name,
            session_name,
            force,
        } => {
            let outcome = app.orchestrator.restore(&folder_name, &session_name, force).await?;
            let partial = match outcome {
                RestoreOutcome::AlreadyActive => None,
                RestoreOutcome::Restored(report) => Some(report.is_partial()),
            };
            Ok(CommandResponse {
                partial,
                ..CommandResponse::ok()
            })
        }
        Command::SetActiveSession {
            folder_name,
            session_name,
        } => {
            app.store.set_active_session(&folder_name, &session_name).await?;
            Ok(CommandResponse::ok())
        }
        Command::CreateFolder { folder_name } => {
            app.store.create_folder(&folder_name).await?;
            Ok(CommandResponse::ok())
        }
        Command::CreateAndSwitchSession {
            folder_name,
            session_name,
        } => {
            let report = app.orchestrator.create_and_switch(&folder_name, &session_name).await?;
            Ok(CommandResponse {
                anchor_tab_id: report.anchor_tab,
                ..CommandResponse::ok()
            })
        }
        Command::DeleteFolder { folder_name } => {
            app.store.delete_folder(&folder_name).await?;
            Ok(CommandResponse::ok())
        }
        Command::DeleteSession {
            folder_name,
            session_name,
        } => {
            app.store.delete_session(&folder_name, &session_name).await?;
            Ok(CommandResponse::ok())
        }
    }
}

/// Decodes and runs a raw message. Failures are folded into the response.
pub async fn handle_message(app: &App, message: &Value) -> Value {
    let response = match Command::deserialize(message) {
        Ok(command) => {
            let name = command.name();
            debug!(command = name, "command received");
            match handle_command(app, command).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(command = name, code = e.code(), error = %e, "command failed");
                    CommandResponse::failed(&e)
                }
            }
        }
        Err(e) => CommandResponse::failed(&CommandError::InvalidMessage(e.to_string())),
    };
    serde_json::to_value(&response).unwrap_or_else(|_| json!({"success": false}))
}

/// Like [`handle_message`], but stops waiting after the configured command timeout.
///
/// The command runs on its own task and is never cancelled: a restore that
/// outlives the timeout still runs to completion, only the reply is abandoned.
pub async fn handle_message_with_timeout(app: Arc<App>, message: Value) -> Value {
    let timeout_ms = app.settings.command_timeout_ms;
    let task = tokio::spawn(async move { handle_message(&app, &message).await });
    let err = match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(response)) => return response,
        Ok(Err(join_err)) => CommandError::InvalidMessage(format!("command task failed: {}", join_err)),
        Err(_) => CommandError::Timeout(timeout_ms),
    };
    warn!(error = %err, "no reply for command");
    serde_json::to_value(CommandResponse::failed(&err)).unwrap_or_else(|_| json!({"success": false}))
}
