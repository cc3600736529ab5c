//! Sandbox security policy: shell command blocklist and file path rules.
//!
//! The in-sandbox shell and file services enforce the same rules; the
//! facades apply them host-side before any HTTP dispatch so a blocked
//! operation never reaches the container.

use std::sync::LazyLock;

use regex::Regex;

/// Root of the writable workspace inside every sandbox.
pub const WORK_ROOT: &str = "/work";

struct BlockRule {
    pattern: Regex,
    reason: &'static str,
}

fn rule(pattern: &str, reason: &'static str) -> BlockRule {
    BlockRule {
        pattern: Regex::new(pattern).expect("invalid blocklist pattern"),
        reason,
    }
}

static COMMAND_BLOCKLIST: LazyLock<Vec<BlockRule>> = LazyLock::new(|| {
    vec![
        rule(r"(^|\s)sudo\s", "privilege escalation via sudo"),
        rule(
            r"\brm\s+-[a-zA-Z]*[rR][a-zA-Z]*\s+/(\s|$|\*)",
            "recursive delete of the filesystem root",
        ),
        rule(r":\(\)\s*\{.*\}\s*;\s*:", "fork bomb"),
        rule(r"\bmkfs(\.\w+)?\b", "filesystem creation"),
        rule(r"\bdd\s+if=", "raw device copy via dd"),
        rule(
            r"\b(shutdown|reboot|halt|poweroff)\b",
            "host power management",
        ),
        rule(r"\binit\s+[0-6]\b", "runlevel change"),
        rule(
            r">\s*/dev/(sd|hd|nvme|vd|xvd)[a-z0-9]*",
            "overwrite of a block device",
        ),
        rule(
            r"\bchmod\s+(-[a-zA-Z]+\s+)*-?R[a-zA-Z]*\s+\S+\s+/(\s|$)",
            "recursive permission change of the filesystem root",
        ),
        rule(
            r"\bchown\s+(-[a-zA-Z]+\s+)*-?R[a-zA-Z]*\s+\S+\s+/(\s|$)",
            "recursive ownership change of the filesystem root",
        ),
        rule(
            r"\b(wget|curl)\b[^|]*\|\s*(ba|da|z|k)?sh\b",
            "piping a download into a shell",
        ),
        rule(r"\b(nc|ncat|netcat)\s+[^|;]*-[a-zA-Z]*l", "netcat listener"),
        rule(r"\bnohup\b", "persistent background process via nohup"),
    ]
});

static SENSITIVE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.env$|\.pem$|\.key$|id_rsa|\.aws/credentials|/etc/|/root/|/home/[^/]+/\.ssh/")
        .expect("invalid path pattern")
});

/// Check a shell command against the blocklist.
///
/// Returns the human reason when a rule matches, `None` when the command
/// is allowed.
pub fn command_violation(command: &str) -> Option<&'static str> {
    COMMAND_BLOCKLIST
        .iter()
        .find(|rule| rule.pattern.is_match(command))
        .map(|rule| rule.reason)
}

/// Resolve a user-supplied path against the sandbox workspace and check
/// it against the path policy.
///
/// Relative paths resolve under `/work`. Returns the resolved absolute
/// path, or the denial reason.
pub fn resolve_work_path(path: &str) -> Result<String, String> {
    if path.is_empty() {
        return Err("access denied: empty path".to_string());
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("access denied: path traversal in '{}'", path));
    }

    let resolved = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", WORK_ROOT, path)
    };

    if resolved != WORK_ROOT && !resolved.starts_with("/work/") {
        return Err(format!(
            "access denied: '{}' is outside the {} workspace",
            path, WORK_ROOT
        ));
    }
    if SENSITIVE_PATH.is_match(&resolved) {
        return Err(format!("access denied: '{}' matches a protected pattern", path));
    }

    Ok(resolved)
}
