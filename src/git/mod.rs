//! Version-control boundary.
//!
//! The workflow only needs five operations; `GitAdapter` is the seam and
//! `Git2Adapter` is the libgit2-backed implementation. All operations fail
//! with a surfaced error rather than silently no-opping.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use git2::{Repository, Signature, StatusOptions};
use std::path::{Path, PathBuf};

#[async_trait]
pub trait GitAdapter: Send + Sync {
    /// Fail unless the project directory is inside a git repository.
    async fn ensure_repository(&self) -> Result<()>;

    /// Fail if the working tree has uncommitted or untracked changes.
    async fn ensure_clean_working_tree(&self) -> Result<()>;

    /// Create a branch at HEAD and switch to it.
    async fn create_and_checkout_branch(&self, name: &str) -> Result<()>;

    /// Stage the given paths into the index.
    async fn stage_files(&self, paths: &[PathBuf]) -> Result<()>;

    /// Commit the staged index, returning the new commit's hex id.
    async fn create_commit(&self, message: &str) -> Result<String>;
}

/// `GitAdapter` backed by libgit2.
///
/// The repository handle is opened per call; `git2::Repository` is not
/// `Sync` and the adapter must be shareable across await points.
pub struct Git2Adapter {
    project_dir: PathBuf,
}

impl Git2Adapter {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.project_dir).with_context(|| {
            format!(
                "Failed to open git repository at {}",
                self.project_dir.display()
            )
        })
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn head_commit(repo: &Repository) -> Option<git2::Commit<'_>> {
        repo.head().ok().and_then(|head| head.peel_to_commit().ok())
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>> {
        repo.signature()
            .or_else(|_| Signature::now("redgreen", "redgreen@localhost"))
            .context("Failed to build commit signature")
    }
}

#[async_trait]
impl GitAdapter for Git2Adapter {
    async fn ensure_repository(&self) -> Result<()> {
        self.open().map(|_| ())
    }

    async fn ensure_clean_working_tree(&self) -> Result<()> {
        let repo = self.open()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .context("Failed to read repository status")?;

        // The orchestrator's own metadata directory never counts as dirty;
        // it must survive force-restart and start-after-abort.
        let meta_prefix = format!("{}/", crate::META_DIR);
        let dirty: Vec<String> = statuses
            .iter()
            .filter_map(|entry| entry.path().map(String::from))
            .filter(|path| path != crate::META_DIR && !path.starts_with(&meta_prefix))
            .collect();

        if !dirty.is_empty() {
            bail!(
                "Working tree has uncommitted changes: {}",
                dirty.join(", ")
            );
        }
        Ok(())
    }

    async fn create_and_checkout_branch(&self, name: &str) -> Result<()> {
        let repo = self.open()?;

        let head = Self::head_commit(&repo)
            .context("Cannot create a branch: repository has no commits yet")?;

        repo.branch(name, &head, false)
            .with_context(|| format!("Failed to create branch {name}"))?;
        repo.set_head(&format!("refs/heads/{name}"))
            .with_context(|| format!("Failed to switch HEAD to {name}"))?;
        repo.checkout_head(None)
            .with_context(|| format!("Failed to check out branch {name}"))?;
        Ok(())
    }

    async fn stage_files(&self, paths: &[PathBuf]) -> Result<()> {
        let repo = self.open()?;
        let mut index = repo.index().context("Failed to open index")?;

        for path in paths {
            // Accept both project-relative and absolute paths.
            let rel = path.strip_prefix(&self.project_dir).unwrap_or(path);
            index
                .add_path(rel)
                .with_context(|| format!("Failed to stage {}", rel.display()))?;
        }

        index.write().context("Failed to write index")?;
        Ok(())
    }

    async fn create_commit(&self, message: &str) -> Result<String> {
        let repo = self.open()?;
        let mut index = repo.index().context("Failed to open index")?;

        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Self::signature(&repo)?;

        // Handle unborn branch (new repo with no commits yet)
        let commit_id = if let Some(parent) = Self::head_commit(&repo) {
            repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
                .context("Failed to create commit")?
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
                .context("Failed to create initial commit")?
        };

        Ok(commit_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (Git2Adapter, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        let adapter = Git2Adapter::new(dir.path());
        (adapter, dir)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_ensure_repository() {
        let (adapter, _dir) = setup_repo();
        adapter.ensure_repository().await.unwrap();

        let plain = tempdir().unwrap();
        let adapter = Git2Adapter::new(plain.path());
        assert!(adapter.ensure_repository().await.is_err());
    }

    #[tokio::test]
    async fn test_clean_tree_check() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");
        adapter.ensure_clean_working_tree().await.unwrap();

        fs::write(dir.path().join("dirty.txt"), "uncommitted").unwrap();
        let err = adapter.ensure_clean_working_tree().await.unwrap_err();
        assert!(err.to_string().contains("dirty.txt"));
    }

    #[tokio::test]
    async fn test_clean_tree_check_ignores_metadata_dir() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");

        let meta = dir.path().join(crate::META_DIR);
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join("workflow-state.json"), "{}").unwrap();
        fs::write(meta.join("activity.jsonl"), "{}\n").unwrap();
        adapter.ensure_clean_working_tree().await.unwrap();

        // Other untracked files still count as dirty.
        fs::write(dir.path().join("stray.txt"), "x").unwrap();
        let err = adapter.ensure_clean_working_tree().await.unwrap_err();
        assert!(err.to_string().contains("stray.txt"));
        assert!(!err.to_string().contains(".redgreen"));
    }

    #[tokio::test]
    async fn test_create_and_checkout_branch() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");

        adapter
            .create_and_checkout_branch("task-6-demo")
            .await
            .unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap();
        assert_eq!(head.shorthand(), Some("task-6-demo"));
    }

    #[tokio::test]
    async fn test_branch_on_empty_repo_fails() {
        let (adapter, _dir) = setup_repo();
        let err = adapter
            .create_and_checkout_branch("task-6-demo")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no commits"));
    }

    #[tokio::test]
    async fn test_stage_and_commit() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");

        fs::write(dir.path().join("feature.rs"), "fn feature() {}").unwrap();
        adapter
            .stage_files(&[PathBuf::from("feature.rs")])
            .await
            .unwrap();
        let hash = adapter
            .create_commit("feat(task-6): add feature")
            .await
            .unwrap();

        assert_eq!(hash.len(), 40);
        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message().unwrap(), "feat(task-6): add feature");
        adapter.ensure_clean_working_tree().await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_accepts_absolute_paths() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");

        let abs = dir.path().join("other.rs");
        fs::write(&abs, "fn other() {}").unwrap();
        adapter.stage_files(&[abs]).await.unwrap();
        adapter.create_commit("feat: other").await.unwrap();
        adapter.ensure_clean_working_tree().await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_missing_file_fails() {
        let (adapter, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");

        let err = adapter
            .stage_files(&[PathBuf::from("does-not-exist.rs")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does-not-exist.rs"));
    }
}
