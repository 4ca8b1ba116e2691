use regex::Regex;

/// Conservative denylist of shell command idioms the planner should never
/// run unvetted. Pattern + human description, extended by adding rows.
///
/// This is advisory screening, not a security boundary: it only looks at
/// the command text and can be bypassed with `--unsafe-ok`.
const DENY_RULES: &[(&str, &str)] = &[
    (r"\brm\s+-rf\s*/", "recursive forced delete under the filesystem root"),
    (r"\brm\s+-rf\s+~", "recursive forced delete of the home directory"),
    (r"\bmkfs(\.|\b)", "filesystem format command"),
    (r"\bdd\s+if=", "raw disk write utility"),
    (r":\s*\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "shell fork bomb"),
    (r"\bshutdown\b", "system power command"),
    (r"\breboot\b", "system power command"),
    (r"\bhalt\b", "system power command"),
    (r"\bchown\s+-R\s+root\b", "recursive ownership change to root"),
    (
        r"\bchmod\s+(-R\s+)?(0{3,}|777)\b",
        "overly permissive permission bits",
    ),
    (
        r"\b(wget|curl)\b[^|]*\|\s*(ba|z)?sh\b",
        "piping a network download into a shell",
    ),
];

/// A single compiled denylist entry.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pattern: Regex,
    pub description: &'static str,
}

impl RiskRule {
    fn new(pattern: &str, description: &'static str) -> Self {
        let pattern = Regex::new(&format!("(?i){pattern}")).expect("valid deny pattern");
        Self {
            pattern,
            description,
        }
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

/// Pattern-based screen over individual command strings. Pure string
/// matching, case-insensitive, no side effects.
#[derive(Debug, Clone)]
pub struct SafetyScreener {
    rules: Vec<RiskRule>,
}

impl SafetyScreener {
    pub fn new() -> Self {
        Self::with_rules(DENY_RULES)
    }

    pub fn with_rules(rules: &[(&str, &'static str)]) -> Self {
        let rules = rules
            .iter()
            .map(|(pattern, description)| RiskRule::new(pattern, description))
            .collect();
        Self { rules }
    }

    /// First matching rule, if any.
    pub fn assess(&self, command: &str) -> Option<&RiskRule> {
        self.rules.iter().find(|rule| rule.matches(command))
    }

    pub fn is_risky(&self, command: &str) -> bool {
        self.assess(command).is_some()
    }
}

impl Default for SafetyScreener {
    fn default() -> Self {
        Self::new()
    }
}
