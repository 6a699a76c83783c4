use std::process::Stdio;
use std::time::{Duration, Instant};

use exec_core::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::context::HookContext;
use crate::template::substitute_variables;

/// One step of the pre-hook chain.
///
/// `Wrap` hooks are pure string transforms over `ctx.wrapped_command` (e.g.
/// "activate a virtualenv"): they never spawn a process and cannot veto.
/// `Check` hooks spawn `template` (with `{command}` substituted in) as a
/// real shell command; a non-zero exit or a timeout vetoes the execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookSpec {
    Wrap { template: String },
    Check { template: String, timeout_ms: u64 },
}

/// What happened when a post-hook ran, purely for logging: post-hook
/// failure never changes the `Execution`'s own outcome (spec §4.4).
#[derive(Debug, Clone)]
pub enum PostHookOutcome {
    Ran,
    Failed(String),
}

/// Run the pre-hook chain in order, stopping at the first veto.
///
/// Aggregate wall time across all hooks is bounded by `budget_ms`; once
/// exhausted, any remaining `Check` hook is treated as a veto rather than
/// being given a truncated window.
pub async fn run_pre_hooks(ctx: &mut HookContext, hooks: &[HookSpec], budget_ms: u64) -> Result<(), ErrorKind> {
    let start = Instant::now();

    for hook in hooks {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms >= budget_ms {
            warn!(budget_ms, "pre-hook aggregate budget exhausted, vetoing execution");
            return Err(ErrorKind::PrecheckFailed);
        }

        match hook {
            HookSpec::Wrap { template } => {
                let mut vars = ctx.template_variables();
                vars.insert("command".to_string(), ctx.wrapped_command.clone());
                ctx.wrapped_command = substitute_variables(template, &vars);
            }
            HookSpec::Check { template, timeout_ms } => {
                let mut vars = ctx.template_variables();
                vars.insert("command".to_string(), ctx.wrapped_command.clone());
                let expanded = substitute_variables(template, &vars);

                let remaining = budget_ms - elapsed_ms;
                let window = Duration::from_millis((*timeout_ms).min(remaining));

                match run_shell(&expanded, window).await {
                    Ok(0) => debug!(hook = %expanded, "pre-hook check passed"),
                    Ok(code) => {
                        warn!(hook = %expanded, exit_code = code, "pre-hook vetoed execution");
                        return Err(ErrorKind::PrecheckFailed);
                    }
                    Err(_) => {
                        warn!(hook = %expanded, "pre-hook timed out, vetoing execution");
                        return Err(ErrorKind::PrecheckFailed);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Run the post-hook chain after the process has been reaped. Every hook
/// runs regardless of prior failures; failures are logged, never
/// propagated.
pub async fn run_post_hooks(ctx: &HookContext, hooks: &[HookSpec], timeout_ms: u64) -> Vec<PostHookOutcome> {
    let mut outcomes = Vec::with_capacity(hooks.len());
    for hook in hooks {
        let template = match hook {
            HookSpec::Wrap { template } => template,
            HookSpec::Check { template, .. } => template,
        };
        let vars = ctx.template_variables();
        let expanded = substitute_variables(template, &vars);

        let outcome = match run_shell(&expanded, Duration::from_millis(timeout_ms)).await {
            Ok(0) => PostHookOutcome::Ran,
            Ok(code) => PostHookOutcome::Failed(format!("exited with code {code}")),
            Err(_) => PostHookOutcome::Failed("timed out".to_string()),
        };
        if let PostHookOutcome::Failed(reason) = &outcome {
            warn!(hook = %expanded, reason, "post-hook failed");
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Spawn `command` via `sh -c`, isolated in its own process group so a
/// timeout can kill the whole group rather than orphaning children.
async fn run_shell(command: &str, timeout: Duration) -> Result<i32, ()> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).stdout(Stdio::null()).stderr(Stdio::null());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => return Err(()),
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(status.code().unwrap_or(-1)),
        Ok(Err(_)) => Err(()),
        Err(_) => {
            if let Some(pid) = child.id() {
                #[cfg(unix)]
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
                #[cfg(not(unix))]
                let _ = child.start_kill();
            }
            let _ = child.wait().await;
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_core::{RequestId, SessionId};

    fn ctx() -> HookContext {
        HookContext::new(SessionId::new(), RequestId(1), "echo payload".to_string())
    }

    #[tokio::test]
    async fn wrap_hook_prefixes_the_command() {
        let mut ctx = ctx();
        let hooks = vec![HookSpec::Wrap {
            template: "echo wrapped && {command}".to_string(),
        }];
        run_pre_hooks(&mut ctx, &hooks, 5_000).await.unwrap();
        assert_eq!(ctx.wrapped_command, "echo wrapped && 'echo payload'");
    }

    #[tokio::test]
    async fn passing_check_hook_does_not_veto() {
        let mut ctx = ctx();
        let hooks = vec![HookSpec::Check {
            template: "true".to_string(),
            timeout_ms: 1_000,
        }];
        assert!(run_pre_hooks(&mut ctx, &hooks, 5_000).await.is_ok());
    }

    #[tokio::test]
    async fn failing_check_hook_vetoes() {
        let mut ctx = ctx();
        let hooks = vec![HookSpec::Check {
            template: "exit 1".to_string(),
            timeout_ms: 1_000,
        }];
        let result = run_pre_hooks(&mut ctx, &hooks, 5_000).await;
        assert_eq!(result, Err(ErrorKind::PrecheckFailed));
    }

    #[tokio::test]
    async fn budget_overrun_before_a_hook_runs_vetoes() {
        let mut ctx = ctx();
        let hooks = vec![
            HookSpec::Check {
                template: "sleep 1".to_string(),
                timeout_ms: 2_000,
            },
            HookSpec::Check {
                template: "true".to_string(),
                timeout_ms: 1_000,
            },
        ];
        let result = run_pre_hooks(&mut ctx, &hooks, 100).await;
        assert_eq!(result, Err(ErrorKind::PrecheckFailed));
    }

    #[tokio::test]
    async fn post_hook_failure_is_reported_but_not_propagated() {
        let ctx = ctx();
        let hooks = vec![HookSpec::Check {
            template: "exit 7".to_string(),
            timeout_ms: 1_000,
        }];
        let outcomes = run_post_hooks(&ctx, &hooks, 1_000).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], PostHookOutcome::Failed(_)));
    }
}
