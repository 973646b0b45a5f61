//! Checkpoint 模块 - 周期性持久化纪律的执行者
//!
//! 超过间隔且工作树有变更时，原子地 stage-all + commit 并重置计时器。
//! 计时器只存在于进程内存，每个 supervised unit 独占一份，重启后从零计。

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::git::Vcs;

/// 一次 checkpoint 检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    /// 间隔未到，或间隔已到但工作树干净
    Skipped,
    /// 成功提交
    Committed {
        files: usize,
        elapsed_secs: u64,
    },
    /// 提交失败（计时器不重置，下个周期自动重试）
    Failed(String),
}

/// 持久化执行者，持有单个 unit 的 checkpoint 计时器
pub struct CheckpointEnforcer {
    interval: Duration,
    last_checkpoint: Instant,
}

impl CheckpointEnforcer {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            last_checkpoint: Instant::now(),
        }
    }

    /// 距上次 checkpoint 的秒数
    pub fn elapsed_secs(&self) -> u64 {
        self.last_checkpoint.elapsed().as_secs()
    }

    /// 检查并在需要时执行 checkpoint
    ///
    /// 计时规则：间隔一旦超过就重置计时器，与是否真的产生提交无关，
    /// 把检查频率限制在每个间隔一次。唯一例外是提交失败，此时不重置，
    /// 让下个周期重试。
    pub fn maybe_checkpoint(&mut self, vcs: &dyn Vcs) -> CheckpointOutcome {
        let elapsed = self.last_checkpoint.elapsed();
        if elapsed <= self.interval {
            debug!(
                elapsed_secs = elapsed.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Checkpoint interval not reached"
            );
            return CheckpointOutcome::Skipped;
        }

        let changes = match vcs.changed_paths() {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, "Could not inspect working tree");
                return CheckpointOutcome::Failed(e.to_string());
            }
        };

        if changes.is_empty() {
            // 安静的 unit 不产生空提交，但计时器照常重置
            debug!("Working tree clean, skipping checkpoint");
            self.last_checkpoint = Instant::now();
            return CheckpointOutcome::Skipped;
        }

        let elapsed_secs = elapsed.as_secs();
        let message = format!(
            "Checkpoint: {} file(s) after {} min of work",
            changes.len(),
            elapsed_secs / 60
        );

        match vcs.commit_all(&message) {
            Ok(true) => {
                info!(files = changes.len(), elapsed_secs, "Checkpoint committed");
                self.last_checkpoint = Instant::now();
                CheckpointOutcome::Committed {
                    files: changes.len(),
                    elapsed_secs,
                }
            }
            Ok(false) => {
                // stage 后无可提交：按失败处理，不重置计时器
                warn!("Checkpoint raced with a concurrent commit, nothing staged");
                CheckpointOutcome::Failed("nothing to commit after staging".to_string())
            }
            Err(e) => {
                warn!(error = %e, "Checkpoint commit failed");
                CheckpointOutcome::Failed(e.to_string())
            }
        }
    }

    /// 测试辅助：把计时器回拨，模拟时间流逝
    #[doc(hidden)]
    pub fn backdate(&mut self, by: Duration) {
        if let Some(t) = Instant::now().checked_sub(by) {
            self.last_checkpoint = t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{ChangedPath, Vcs};
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;

    /// 可编程的 fake VCS
    struct FakeVcs {
        changes: Vec<ChangedPath>,
        commit_ok: bool,
        commits: RefCell<Vec<String>>,
    }

    impl FakeVcs {
        fn with_changes(n: usize, commit_ok: bool) -> Self {
            let changes = (0..n)
                .map(|i| ChangedPath {
                    status: " M".to_string(),
                    path: format!("src/file_{}.rs", i),
                })
                .collect();
            Self {
                changes,
                commit_ok,
                commits: RefCell::new(Vec::new()),
            }
        }
    }

    impl Vcs for FakeVcs {
        fn changed_paths(&self) -> Result<Vec<ChangedPath>> {
            Ok(self.changes.clone())
        }
        fn revision_count(&self) -> Result<u32> {
            Ok(self.commits.borrow().len() as u32)
        }
        fn recent_commits(&self, _max_count: u32) -> Result<Vec<String>> {
            Ok(self.commits.borrow().clone())
        }
        fn commit_all(&self, message: &str) -> Result<bool> {
            if self.commit_ok {
                self.commits.borrow_mut().push(message.to_string());
                Ok(true)
            } else {
                Err(anyhow!("simulated storage error"))
            }
        }
    }

    #[test]
    fn test_skipped_twice_within_interval() {
        // Given: 间隔 1800 秒、刚创建的 enforcer，工作树有变更
        let vcs = FakeVcs::with_changes(3, true);
        let mut enforcer = CheckpointEnforcer::new(1800);

        // When: 间隔内连续调用两次
        let first = enforcer.maybe_checkpoint(&vcs);
        let elapsed_after_first = enforcer.elapsed_secs();
        let second = enforcer.maybe_checkpoint(&vcs);

        // Then: 两次都 Skipped，第二次调用没有动过计时器
        assert_eq!(first, CheckpointOutcome::Skipped);
        assert_eq!(second, CheckpointOutcome::Skipped);
        assert!(enforcer.elapsed_secs() >= elapsed_after_first);
        assert!(vcs.commits.borrow().is_empty());
    }

    #[test]
    fn test_commit_when_interval_elapsed_and_dirty() {
        // Given: 间隔已超过，工作树有 4 个变更
        let vcs = FakeVcs::with_changes(4, true);
        let mut enforcer = CheckpointEnforcer::new(1);
        enforcer.backdate(Duration::from_secs(3));

        // When: 检查
        let outcome = enforcer.maybe_checkpoint(&vcs);

        // Then: 提交成功，消息嵌入了文件数，计时器重置
        match outcome {
            CheckpointOutcome::Committed { files, elapsed_secs } => {
                assert_eq!(files, 4);
                assert!(elapsed_secs >= 3);
            }
            other => panic!("expected Committed, got {:?}", other),
        }
        assert!(vcs.commits.borrow()[0].contains("4 file(s)"));
        assert!(enforcer.elapsed_secs() < 3);
    }

    #[test]
    fn test_quiet_unit_resets_timer_without_commit() {
        // Given: 间隔已超过但工作树干净
        let vcs = FakeVcs::with_changes(0, true);
        let mut enforcer = CheckpointEnforcer::new(1);
        enforcer.backdate(Duration::from_secs(3));

        // When: 检查
        let outcome = enforcer.maybe_checkpoint(&vcs);

        // Then: Skipped、无提交，但计时器重置（每个间隔最多检查一次）
        assert_eq!(outcome, CheckpointOutcome::Skipped);
        assert!(vcs.commits.borrow().is_empty());
        assert!(enforcer.elapsed_secs() < 3);
    }

    #[test]
    fn test_failed_commit_keeps_timer_for_retry() {
        // Given: 间隔已超过、有变更，但提交会失败
        let vcs = FakeVcs::with_changes(2, false);
        let mut enforcer = CheckpointEnforcer::new(1);
        enforcer.backdate(Duration::from_secs(3));

        // When: 检查
        let outcome = enforcer.maybe_checkpoint(&vcs);

        // Then: Failed，计时器未重置，下个周期会重试
        assert!(matches!(outcome, CheckpointOutcome::Failed(_)));
        assert!(enforcer.elapsed_secs() >= 3);

        // When: 再次检查（模拟下个周期）
        let retry = enforcer.maybe_checkpoint(&vcs);

        // Then: 仍然尝试（而不是 Skipped）
        assert!(matches!(retry, CheckpointOutcome::Failed(_)));
    }
}
