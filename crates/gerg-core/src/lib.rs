use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "phi3:latest";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

/// System prompt sent with every planning request. The planner must answer
/// with strict JSON matching the `Plan` shape.
pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are gerg, a careful command-line planning assistant. \
Respond with strict JSON only, using exactly these keys: \
\"explanation\" (a short human-readable summary of what the commands do), \
\"commands\" (an ordered array of shell command strings), and \
\"require_confirmation\" (a boolean, true whenever the commands change state or carry any risk). \
Prefer a single self-contained command that uses absolute paths or ~ shorthand. \
Avoid commands that only change directory. \
Never propose destructive operations. \
Prefer portable POSIX utilities over OS-specific ones.";

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("plan must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("plan field `{field}` must be {expected}, got {got}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        got: &'static str,
    },
}

/// A validated course of action produced by the planner. Immutable once
/// constructed; the only way in is `Plan::from_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub explanation: String,
    pub commands: Vec<String>,
    pub require_confirmation: bool,
}

impl Plan {
    /// Validate and coerce an arbitrary decoded JSON value into a `Plan`.
    ///
    /// Absent fields take defaults: empty explanation, no commands, and
    /// `require_confirmation = true`. Present fields with the wrong type fail
    /// with an error naming the field.
    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        let Value::Object(map) = value else {
            return Err(PlanError::NotAnObject(json_type_name(&value)));
        };

        let explanation = match map.get("explanation") {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(PlanError::InvalidField {
                    field: "explanation",
                    expected: "a string",
                    got: json_type_name(other),
                });
            }
        };

        let commands = match map.get("commands") {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut commands = Vec::with_capacity(items.len());
                for item in items {
                    let Value::String(s) = item else {
                        return Err(PlanError::InvalidField {
                            field: "commands",
                            expected: "an array of strings",
                            got: json_type_name(item),
                        });
                    };
                    commands.push(s.clone());
                }
                commands
            }
            Some(other) => {
                return Err(PlanError::InvalidField {
                    field: "commands",
                    expected: "an array of strings",
                    got: json_type_name(other),
                });
            }
        };

        let require_confirmation = match map.get("require_confirmation") {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(PlanError::InvalidField {
                    field: "require_confirmation",
                    expected: "a boolean",
                    got: json_type_name(other),
                });
            }
        };

        Ok(Self {
            explanation,
            commands,
            require_confirmation,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Terminal outcome of a run, as recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    BlockedUnsafe,
    Printed,
    Aborted,
    NoActionableCommands,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedUnsafe => "blocked_unsafe",
            Self::Printed => "printed",
            Self::Aborted => "aborted",
            Self::NoActionableCommands => "no_actionable_commands",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One line of the append-only audit log. Written exactly once per terminal
/// run outcome, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub at: DateTime<Utc>,
    pub goal: String,
    pub model: String,
    pub plan: Plan,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

impl HistoryRecord {
    pub fn new(
        goal: impl Into<String>,
        model: impl Into<String>,
        plan: &Plan,
        status: RunStatus,
    ) -> Self {
        Self {
            at: Utc::now(),
            goal: goal.into(),
            model: model.into(),
            plan: plan.clone(),
            status,
            return_code: None,
        }
    }

    pub fn with_return_code(mut self, code: i32) -> Self {
        self.return_code = Some(code);
        self
    }
}

/// Run configuration, constructed once at startup and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub ollama_base_url: String,
    pub confirm_by_default: bool,
    pub history_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            confirm_by_default: true,
            history_dir: default_history_dir(),
        }
    }
}

impl Settings {
    /// `$GERG_CONFIG` when set, otherwise `~/.config/gerg/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GERG_CONFIG")
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        home_dir().map(|home| home.join(".config/gerg/config.toml"))
    }

    /// Load settings for a run: built-in defaults, then the config file,
    /// then `GERG_*` environment overrides. Ensures the history directory
    /// exists before returning.
    pub fn load() -> Result<Self> {
        let settings = match Self::config_path() {
            Some(path) if path.exists() => Self::from_toml_file(&path)?,
            _ => Self::default(),
        };
        let settings = settings.with_env_overrides(|key| std::env::var(key).ok());
        fs::create_dir_all(&settings.history_dir)?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Apply `GERG_*` overrides through an injectable lookup so tests never
    /// have to touch real process environment.
    pub fn with_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(model) = get("GERG_MODEL") {
            self.model = model;
        }
        if let Some(url) = get("GERG_OLLAMA_BASE_URL") {
            self.ollama_base_url = url;
        }
        if let Some(confirm) = get("GERG_CONFIRM") {
            self.confirm_by_default = parse_bool_flag(&confirm);
        }
        if let Some(dir) = get("GERG_HISTORY_DIR") {
            self.history_dir = PathBuf::from(dir);
        }
        self
    }
}

fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn default_history_dir() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".local/share/gerg"),
        None => PathBuf::from(".gerg"),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}
