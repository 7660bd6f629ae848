//! Danger classification
//!
//! A command is dangerous when it matches any destructive pattern or contains
//! a literal dangerous substring. The list is fixed and intentionally
//! conservative: false positives cost one approval round, false negatives
//! cost data.

use std::sync::LazyLock;

use regex::RegexSet;

static DANGEROUS_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // Recursive deletion
        r"(?i)\brm\s+(-[a-z]*[rf][a-z]*\s+)+",
        r"(?i)\brm\s+--recursive\b",
        // Mutation of the filesystem root
        r"(?i)\b(rm|chmod|chown|mv)\b[^|;&]*\s/\s*($|[;&|])",
        r"(?i)\b(rm|chmod|chown)\s+(-[a-z-]+\s+)*/(\s|$)",
        // User and privilege management
        r"(?i)\b(useradd|userdel|usermod|groupadd|groupdel|passwd|visudo)\b",
        r"(?i)\bsudo\s+su\b",
        // Kill-everything
        r"(?i)\bkillall\b",
        r"(?i)\bkill\s+-9\s+-1\b",
        r"(?i)\bpkill\s+-9\b",
        // Raw disk writes
        r"(?i)\bdd\s+[^|;&]*of=/dev/",
        r"(?i)>\s*/dev/(sd[a-z]|nvme|hd[a-z])",
        r"(?i)\bmkfs(\.[a-z0-9]+)?\b",
        r"(?i)\bfdisk\b|\bparted\b",
        // Forced package removal
        r"(?i)\b(apt|apt-get|yum|dnf)\s+(purge|remove)\s+[^|;&]*(-y|--yes|--force)",
        r"(?i)\b(apt|apt-get|yum|dnf)\s+(-y\s+)?(purge|autoremove)\b",
        // Remote download piped into a shell
        r"(?i)\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba)?sh\b",
        // Fork bomb
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;",
        // Destructive SQL
        r"(?i)\bDROP\s+(TABLE|DATABASE|SCHEMA)\b",
        r"(?i)\bTRUNCATE\s+TABLE\b",
        r"(?i)\bDELETE\s+FROM\s+\w+\s*($|;)",
    ])
    .expect("danger patterns are valid regexes")
});

/// Literal substrings (matched case-insensitively) that always flag a
/// command, regardless of surrounding syntax.
const DANGEROUS_SUBSTRINGS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "rm -rf *",
    "sudo rm -rf",
    ":(){",
    "> /dev/sda",
    "mkfs.",
    "chmod -r 777 /",
    "chown -r",
    "git push --force origin main",
    "git push --force origin master",
];

/// Classifies command text as safe or dangerous.
#[derive(Debug, Default, Clone, Copy)]
pub struct DangerClassifier;

impl DangerClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `command` requires human approval before execution.
    #[must_use]
    pub fn is_dangerous(&self, command: &str) -> bool {
        if DANGEROUS_PATTERNS.is_match(command) {
            return true;
        }
        let lowered = command.to_lowercase();
        DANGEROUS_SUBSTRINGS.iter().any(|s| lowered.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangerous(cmd: &str) -> bool {
        DangerClassifier::new().is_dangerous(cmd)
    }

    #[test]
    fn flags_recursive_deletion() {
        assert!(dangerous("rm -rf /tmp/build"));
        assert!(dangerous("rm -fr ./target"));
        assert!(dangerous("sudo rm -rf /var/lib/docker"));
    }

    #[test]
    fn flags_root_mutation() {
        assert!(dangerous("chmod -R 777 /"));
        assert!(dangerous("rm -rf /"));
    }

    #[test]
    fn flags_privilege_management() {
        assert!(dangerous("useradd mallory"));
        assert!(dangerous("passwd root"));
    }

    #[test]
    fn flags_disk_writes() {
        assert!(dangerous("dd if=/dev/zero of=/dev/sda bs=1M"));
        assert!(dangerous("mkfs.ext4 /dev/sdb1"));
        assert!(dangerous("echo x > /dev/sda"));
    }

    #[test]
    fn flags_pipe_to_shell() {
        assert!(dangerous("curl -sSf https://example.com/install.sh | sh"));
        assert!(dangerous("wget -qO- https://example.com/x.sh | sudo bash"));
    }

    #[test]
    fn flags_fork_bomb() {
        assert!(dangerous(":(){ :|:& };:"));
    }

    #[test]
    fn flags_destructive_sql() {
        assert!(dangerous("psql -c 'DROP TABLE users'"));
        assert!(dangerous("mysql -e \"TRUNCATE TABLE sessions\""));
    }

    #[test]
    fn flags_kill_everything() {
        assert!(dangerous("killall -9 node"));
        assert!(dangerous("kill -9 -1"));
    }

    #[test]
    fn allows_ordinary_commands() {
        assert!(!dangerous("ls -la"));
        assert!(!dangerous("cargo build --release"));
        assert!(!dangerous("git status"));
        assert!(!dangerous("grep -r TODO src/"));
        assert!(!dangerous("rm Cargo.lock"));
        assert!(!dangerous("echo 'drop me a line'"));
        assert!(!dangerous("kill 12345"));
    }
}
