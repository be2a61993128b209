use std::sync::LazyLock;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Game login names are 1..=16 chars of `[A-Za-z0-9_]`.
pub const MAX_LOGIN_LEN: usize = 16;

static INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_]").expect("static regex")
});
static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_+").expect("static regex")
});

/// Replace disallowed characters with `_`, collapse runs, trim the edges.
pub fn sanitize_login(input: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(input, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

fn stable_suffix(team_id: &str, agent_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", team_id, agent_name).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..6].to_string()
}

/// Derive a stable login name like `cc1a2b3c_zara` for `team/name`.
///
/// The hash suffix keeps agents with the same name on different teams apart.
pub fn make_login_username(team_id: &str, agent_name: &str) -> String {
    let prefix = format!("cc{}_", stable_suffix(team_id, agent_name));
    let mut tail = sanitize_login(agent_name).to_lowercase();
    if tail.is_empty() {
        tail = "agent".to_string();
    }
    let max_tail = MAX_LOGIN_LEN - prefix.len();
    tail.truncate(max_tail);
    format!("{}{}", prefix, tail)
}
