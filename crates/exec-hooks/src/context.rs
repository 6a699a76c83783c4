use std::collections::HashMap;
use std::path::PathBuf;
use ulid::Ulid;

use exec_core::{RequestId, SessionId};

/// Per-invocation marker token exported as `EXECD_RUN_ID`, letting a wrapped
/// program echo it back for post-hoc authenticity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerToken(Ulid);

impl MarkerToken {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn env_var_name() -> &'static str {
        "EXECD_RUN_ID"
    }
}

impl Default for MarkerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MarkerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable working state threaded through the pre-hook chain and handed
/// read-only to post-hooks. Hooks may mutate `env` and `wrapped_command`
/// but never the owning `Execution` (spec §4.4).
#[derive(Debug, Clone)]
pub struct HookContext {
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub wrapped_command: String,
    pub marker: MarkerToken,
}

impl HookContext {
    pub fn new(session_id: SessionId, request_id: RequestId, command: String) -> Self {
        let marker = MarkerToken::new();
        let mut env = HashMap::new();
        env.insert(MarkerToken::env_var_name().to_string(), marker.to_string());
        Self {
            session_id,
            request_id,
            cwd: None,
            env,
            wrapped_command: command,
            marker,
        }
    }

    /// Template variables available to hook commands, derived from the
    /// current context state.
    pub fn template_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("session_id".to_string(), self.session_id.to_string());
        vars.insert("request_id".to_string(), self.request_id.to_string());
        vars.insert("marker".to_string(), self.marker.to_string());
        vars.insert("command".to_string(), self.wrapped_command.clone());
        if let Some(cwd) = &self.cwd {
            vars.insert("cwd".to_string(), cwd.display().to_string());
        }
        vars
    }
}
