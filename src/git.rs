//! git 模块 - 封装对版本控制 substrate 的调用
//!
//! status/log/commit 都作为不透明的外部调用对待，不解析 git 内部结构。

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// 工作树中一条待提交的变更记录（来自 `git status --porcelain`）
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedPath {
    /// 两位状态码（如 " M", "??", "A "）
    pub status: String,
    /// 相对路径
    pub path: String,
}

/// 版本控制 substrate 接口
pub trait Vcs {
    /// 列出工作树中的待提交变更
    fn changed_paths(&self) -> Result<Vec<ChangedPath>>;

    /// 当前分支的提交总数（无提交历史时为 0）
    fn revision_count(&self) -> Result<u32>;

    /// 最近 N 条提交的单行摘要
    fn recent_commits(&self, max_count: u32) -> Result<Vec<String>>;

    /// 暂存全部变更并提交。返回是否真的产生了提交。
    fn commit_all(&self, message: &str) -> Result<bool>;
}

/// git CLI 包装器，绑定到一个仓库路径
pub struct GitRepo {
    repo_path: PathBuf,
}

impl GitRepo {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(["-C"])
            .arg(&self.repo_path)
            .args(args)
            .output()?;
        Ok(output)
    }
}

impl Vcs for GitRepo {
    fn changed_paths(&self) -> Result<Vec<ChangedPath>> {
        let output = self.git(&["status", "--porcelain"])?;
        if !output.status.success() {
            return Err(anyhow!(
                "git status failed in {}: {}",
                self.repo_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let changes = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| ChangedPath {
                status: line[..2].to_string(),
                path: line[3..].to_string(),
            })
            .collect();
        Ok(changes)
    }

    fn revision_count(&self) -> Result<u32> {
        let output = self.git(&["rev-list", "--count", "HEAD"])?;
        if output.status.success() {
            let count = String::from_utf8_lossy(&output.stdout)
                .trim()
                .parse()
                .unwrap_or(0);
            Ok(count)
        } else {
            // HEAD 不存在（空仓库）按 0 处理
            debug!(repo = %self.repo_path.display(), "rev-list failed, treating as 0 commits");
            Ok(0)
        }
    }

    fn recent_commits(&self, max_count: u32) -> Result<Vec<String>> {
        let output = self.git(&["log", "--oneline", &format!("-{}", max_count)])?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(|s| s.to_string())
                .collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        let stage = self.git(&["add", "-A"])?;
        if !stage.status.success() {
            return Err(anyhow!(
                "git add -A failed: {}",
                String::from_utf8_lossy(&stage.stderr).trim()
            ));
        }

        let commit = self.git(&["commit", "-m", message])?;
        if commit.status.success() {
            info!(repo = %self.repo_path.display(), "Committed staged changes");
            Ok(true)
        } else {
            let stderr = String::from_utf8_lossy(&commit.stderr);
            let stdout = String::from_utf8_lossy(&commit.stdout);
            // stage 和 commit 之间可能出现竞争导致无可提交内容
            if stdout.contains("nothing to commit") || stderr.contains("nothing to commit") {
                debug!(repo = %self.repo_path.display(), "Nothing to commit after staging");
                return Ok(false);
            }
            Err(anyhow!("git commit failed: {}", stderr.trim()))
        }
    }
}
