//! Version-control helpers.
//!
//! These only build command lines and interpret results; execution always
//! goes through a [`CommandRunner`].

use crate::runner::{CommandRunner, RunOptions};

/// Shell line returning one path to its committed state.
///
/// A path git tracks is checked out; untracked files under it (for example a
/// lock file the fixer created) are removed with `git clean`. Each path gets
/// its own command because `git checkout` rejects the whole invocation when
/// any one path is unknown to it. Ignored files are left alone.
pub fn restore_command(path: &str) -> String {
    let quoted = shell_quote(path);
    format!(
        "if git ls-files --error-unmatch -- {q} >/dev/null 2>&1; then git checkout -- {q}; fi && git clean -fdq -- {q}",
        q = quoted
    )
}

/// Capture the HEAD commit SHA, or `None` outside a git work tree.
pub async fn head_sha(runner: &dyn CommandRunner, options: &RunOptions) -> Option<String> {
    let result = runner.run("git rev-parse HEAD", options).await.ok()?;
    if !result.exit_success {
        return None;
    }
    let sha = result.stdout.trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

/// Check whether the working directory is inside a git work tree.
pub async fn is_git_repo(runner: &dyn CommandRunner, options: &RunOptions) -> bool {
    runner
        .run("git rev-parse --is-inside-work-tree", options)
        .await
        .map(|r| r.exit_success && r.stdout.trim() == "true")
        .unwrap_or(false)
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ShellRunner;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("package.json"), "{\"version\":\"1.0.0\"}").unwrap();
        run_git(dir.path(), &["add", "package.json"]);
        run_git(dir.path(), &["commit", "-m", "initial"]);
        dir
    }

    #[test]
    fn restore_command_quotes_the_path() {
        let cmd = restore_command("it's.lock");
        assert!(cmd.starts_with(r"if git ls-files --error-unmatch -- 'it'\''s.lock'"));
        assert!(cmd.ends_with(r"git clean -fdq -- 'it'\''s.lock'"));
    }

    #[tokio::test]
    async fn head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let runner = ShellRunner::new(repo.path(), 30);
        let sha = head_sha(&runner, &RunOptions::default()).await.unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(is_git_repo(&runner, &RunOptions::default()).await);
    }

    #[tokio::test]
    async fn restore_handles_tracked_and_untracked_paths() {
        let repo = make_git_repo();
        let manifest = repo.path().join("package.json");
        let lock = repo.path().join("package-lock.json");
        std::fs::write(&manifest, "{\"version\":\"2.0.0\"}").unwrap();
        std::fs::write(&lock, "{}").unwrap();

        let runner = ShellRunner::new(repo.path(), 30);
        for path in ["package.json", "package-lock.json", "never-existed.json"] {
            let result = runner
                .run(&restore_command(path), &RunOptions::default())
                .await
                .unwrap();
            assert!(result.exit_success, "{path}: {}", result.stderr);
        }

        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            "{\"version\":\"1.0.0\"}"
        );
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn restore_fails_outside_a_work_tree() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path(), 30);
        let result = runner
            .run(&restore_command("package.json"), &RunOptions::default())
            .await
            .unwrap();
        assert!(!result.exit_success);
    }

    #[tokio::test]
    async fn outside_repo_has_no_sha() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path(), 30);
        assert!(head_sha(&runner, &RunOptions::default()).await.is_none());
        assert!(!is_git_repo(&runner, &RunOptions::default()).await);
    }
}
