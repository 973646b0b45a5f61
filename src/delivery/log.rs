//! 投递日志 - 按天分文件的 append-only JSONL 记录
//!
//! 每次投递尝试在动作之前先落一条 attempt 记录，动作完成后再落一条
//! outcome 记录（log-then-act 不保证两条记录的原子性）。多个 supervisor
//! 并发写依赖文件锁保证行级原子。

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// 投递日志记录（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    /// 记录类型: "attempt" | "outcome"
    pub kind: String,
    /// 目标地址 "session:window"
    pub target: String,
    /// 完整 payload 文本（仅 attempt 记录）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// 结果描述（仅 outcome 记录）: "delivered" 或失败原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// 投递日志存储
pub struct DeliveryLog {
    log_dir: PathBuf,
}

impl DeliveryLog {
    /// 在默认状态目录下创建日志（~/.tmux-supervisor/logs）
    pub fn new() -> Self {
        Self {
            log_dir: crate::config::state_dir().join("logs"),
        }
    }

    /// 创建用于测试的日志（写入指定目录）
    pub fn new_with_dir(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    /// 当天日志文件路径（按天分文件）
    pub fn path_for_today(&self) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        self.log_dir.join(format!("deliveries-{}.jsonl", day))
    }

    /// 记录一次投递尝试（在注入动作之前调用）
    pub fn log_attempt(&self, target: &str, payload: &str) -> Result<()> {
        self.append(&DeliveryRecord {
            ts: Utc::now(),
            kind: "attempt".to_string(),
            target: target.to_string(),
            payload: Some(payload.to_string()),
            outcome: None,
        })
    }

    /// 记录投递结果（成功为 "delivered"，失败为原因文本）
    pub fn log_outcome(&self, target: &str, outcome: &str) -> Result<()> {
        self.append(&DeliveryRecord {
            ts: Utc::now(),
            kind: "outcome".to_string(),
            target: target.to_string(),
            payload: None,
            outcome: Some(outcome.to_string()),
        })
    }

    /// 追加一条记录（带文件锁）
    fn append(&self, record: &DeliveryRecord) -> Result<()> {
        use fs2::FileExt;

        fs::create_dir_all(&self.log_dir)?;

        let path = self.path_for_today();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;

        let line = serde_json::to_string(record)?;
        let result = writeln!(&file, "{}", line);

        let _ = file.unlock();
        result?;
        Ok(())
    }

    /// 读取当天的全部记录（诊断/测试用）
    pub fn read_today(&self) -> Result<Vec<DeliveryRecord>> {
        let path = self.path_for_today();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let records = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(records)
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}
