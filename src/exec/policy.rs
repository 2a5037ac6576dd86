// src/exec/policy.rs

//! Host safety checks applied before and after invoking the external executor.

use std::path::{Component, Path, PathBuf};

const DENY_PATTERNS: &[&str] = &[
    "rm -rf /",
    "shutdown",
    "reboot",
    "mkfs",
    "dd if=",
    "chmod -R 777 /",
    "chown -R /",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Policy;

impl Policy {
    /// `true` if `target` is the workspace root or lies below it.
    pub fn is_workspace_path_allowed(&self, workspace_root: &Path, target: &Path) -> bool {
        let root = resolve(workspace_root);
        let candidate = resolve(target);
        candidate.starts_with(&root)
    }

    /// `true` if the command line contains none of the deny patterns.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let normalized = command.trim().to_lowercase();
        DENY_PATTERNS
            .iter()
            .all(|pattern| !normalized.contains(&pattern.to_lowercase()))
    }
}

/// Canonicalize when the path exists, otherwise normalize lexically so that
/// `..` cannot escape the root.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_and_command_rules() {
        let policy = Policy;
        let workspace = Path::new("/tmp/openfars/workspace");

        assert!(policy.is_workspace_path_allowed(workspace, &workspace.join("run/a")));
        assert!(!policy.is_workspace_path_allowed(workspace, Path::new("/etc/passwd")));
        assert!(!policy.is_workspace_path_allowed(
            workspace,
            &workspace.join("../../../etc/passwd")
        ));

        assert!(policy.is_command_allowed("python run.py"));
        assert!(!policy.is_command_allowed("rm -rf /"));
        assert!(!policy.is_command_allowed("sudo SHUTDOWN now"));
    }
}
