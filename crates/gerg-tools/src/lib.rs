use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("cd: no such directory: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to spawn command '{command}': {detail}")]
    Spawn { command: String, detail: String },
}

/// Per-run working-directory state. Threaded explicitly through the
/// executor so every `cd` transition is visible to the caller.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub cwd: PathBuf,
}

impl ExecContext {
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: start_dir.into(),
        }
    }
}

/// A command is actionable when, after trimming, it is non-empty and is not
/// a bare directory change.
pub fn is_actionable(command: &str) -> bool {
    let trimmed = command.trim();
    !trimmed.is_empty() && cd_target(trimmed).is_none()
}

fn cd_target(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("cd")?;
    if rest.is_empty() {
        return Some("~");
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();
    Some(if target.is_empty() { "~" } else { target })
}

/// Sequential command runner. `cd` commands are handled in-process against
/// the `ExecContext`; everything else goes through the platform shell with
/// stdio and environment inherited from the parent.
#[derive(Debug, Clone)]
pub struct Executor {
    home: Option<PathBuf>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            home: gerg_core::home_dir(),
        }
    }

    /// Executor with a fixed home directory for `~` expansion.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    /// Run commands in order, stopping at the first failure. Returns the
    /// exit code of the run: 0 when every command succeeded (or the list was
    /// empty), otherwise the first non-zero exit code. A missing `cd` target
    /// or an unspawnable shell surfaces as `ExecError` instead.
    pub fn run(&self, commands: &[String], ctx: &mut ExecContext) -> Result<i32, ExecError> {
        for command in commands {
            let trimmed = command.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(target) = cd_target(trimmed) {
                ctx.cwd = self.resolve_cd(target, &ctx.cwd)?;
                continue;
            }
            let code = self.spawn(trimmed, &ctx.cwd)?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    fn resolve_cd(&self, target: &str, cwd: &Path) -> Result<PathBuf, ExecError> {
        let expanded = self.expand_home(target);
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            cwd.join(expanded)
        };
        if resolved.is_dir() {
            Ok(resolved)
        } else {
            Err(ExecError::MissingDirectory(resolved))
        }
    }

    fn expand_home(&self, target: &str) -> PathBuf {
        if let Some(home) = &self.home {
            if target == "~" {
                return home.clone();
            }
            if let Some(rest) = target.strip_prefix("~/") {
                return home.join(rest);
            }
        }
        PathBuf::from(target)
    }

    fn spawn(&self, command: &str, cwd: &Path) -> Result<i32, ExecError> {
        let mut errors = Vec::new();
        for mut candidate in candidate_commands(command) {
            candidate.current_dir(cwd);
            let program = candidate.get_program().to_string_lossy().to_string();
            match candidate.status() {
                // a child killed by a signal has no exit code; report failure
                Ok(status) => return Ok(status.code().unwrap_or(1)),
                Err(err) => errors.push(format!("{program}: {err}")),
            }
        }
        Err(ExecError::Spawn {
            command: command.to_string(),
            detail: errors.join(" | "),
        })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "windows")]
fn candidate_commands(cmd: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut cmd_shell = Command::new("cmd");
    cmd_shell.arg("/C").arg(cmd);
    commands.push(cmd_shell);

    let mut ps_shell = Command::new("powershell");
    ps_shell
        .arg("-NoLogo")
        .arg("-NoProfile")
        .arg("-Command")
        .arg(cmd);
    commands.push(ps_shell);

    commands
}

#[cfg(not(target_os = "windows"))]
fn candidate_commands(cmd: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut sh_shell = Command::new("sh");
    sh_shell.arg("-c").arg(cmd);
    commands.push(sh_shell);

    let mut bash_shell = Command::new("bash");
    bash_shell.arg("-c").arg(cmd);
    commands.push(bash_shell);

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn strings(commands: &[&str]) -> Vec<String> {
        commands.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn actionable_excludes_cd_and_blank_commands() {
        assert!(is_actionable("ls -la"));
        assert!(is_actionable("cdrecord -v image.iso"));
        assert!(!is_actionable("cd /tmp"));
        assert!(!is_actionable("  cd ~/work  "));
        assert!(!is_actionable("cd"));
        assert!(!is_actionable(""));
        assert!(!is_actionable("   "));
    }

    #[test]
    fn empty_sequence_returns_zero() {
        let executor = Executor::new();
        let mut ctx = ExecContext::new(std::env::temp_dir());
        assert_eq!(executor.run(&[], &mut ctx).expect("run"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn cd_updates_working_directory_for_later_commands() {
        let home = tempfile::tempdir().expect("tempdir");
        let work = home.path().join("work");
        fs::create_dir(&work).expect("mkdir work");

        let start = tempfile::tempdir().expect("tempdir");
        let executor = Executor::with_home(home.path());
        let mut ctx = ExecContext::new(start.path());

        let rc = executor
            .run(&strings(&["cd ~/work", "touch made-here"]), &mut ctx)
            .expect("run");
        assert_eq!(rc, 0);
        assert_eq!(ctx.cwd, work);
        assert!(work.join("made-here").exists());
        assert!(!start.path().join("made-here").exists());
    }

    #[cfg(unix)]
    #[test]
    fn missing_cd_target_halts_before_later_commands() {
        let home = tempfile::tempdir().expect("tempdir");
        let start = tempfile::tempdir().expect("tempdir");
        let executor = Executor::with_home(home.path());
        let mut ctx = ExecContext::new(start.path());

        let err = executor
            .run(&strings(&["cd ~/work", "touch never"]), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingDirectory(_)));
        assert!(!start.path().join("never").exists());
        // context is untouched by the failed transition
        assert_eq!(ctx.cwd, start.path());
    }

    #[cfg(unix)]
    #[test]
    fn relative_cd_resolves_against_current_context() {
        let start = tempfile::tempdir().expect("tempdir");
        let nested = start.path().join("a/b");
        fs::create_dir_all(&nested).expect("mkdir -p");

        let executor = Executor::new();
        let mut ctx = ExecContext::new(start.path());
        let rc = executor
            .run(&strings(&["cd a", "cd b"]), &mut ctx)
            .expect("run");
        assert_eq!(rc, 0);
        assert_eq!(ctx.cwd, nested);
    }

    #[cfg(unix)]
    #[test]
    fn first_failure_stops_the_sequence() {
        let start = tempfile::tempdir().expect("tempdir");
        let executor = Executor::new();
        let mut ctx = ExecContext::new(start.path());

        let rc = executor
            .run(&strings(&["false", "touch unreachable"]), &mut ctx)
            .expect("run");
        assert_eq!(rc, 1);
        assert!(!start.path().join("unreachable").exists());
    }

    #[cfg(unix)]
    #[test]
    fn child_exit_code_is_propagated() {
        let executor = Executor::new();
        let mut ctx = ExecContext::new(std::env::temp_dir());
        let rc = executor.run(&strings(&["exit 7"]), &mut ctx).expect("run");
        assert_eq!(rc, 7);
    }

    #[test]
    fn whitespace_only_commands_are_skipped() {
        let executor = Executor::new();
        let mut ctx = ExecContext::new(std::env::temp_dir());
        let rc = executor.run(&strings(&["", "   "]), &mut ctx).expect("run");
        assert_eq!(rc, 0);
    }
}
