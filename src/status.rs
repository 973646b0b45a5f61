//! 状态发布模块 - 周期快照的落盘与 hub 上报
//!
//! 每个周期覆盖写一行状态到公知路径，并 best-effort 推送到外部聚合
//! 端点（健康检查通过才推送，失败静默忽略）。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::checkpoint::CheckpointOutcome;
use crate::lifecycle::ProjectPhase;
use crate::quality::{FindingKind, QualityFinding};

/// 单次 hub 请求的超时
const HUB_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 单条 finding 的告警投递结果（暴露在快照里，保证可观测）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub finding: FindingKind,
    /// "delivered" 或失败原因
    pub outcome: String,
}

/// 一个周期结束时的结构化快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub unit: String,
    pub cycle: u64,
    pub phase: ProjectPhase,
    /// 捕获输出中出现等待输入的迹象（仅记录，不据此行动）
    pub waiting_for_input: bool,
    pub findings: Vec<QualityFinding>,
    pub deliveries: Vec<DeliveryReport>,
    /// checkpoint 结果摘要: "skipped" | "committed(N)" | "failed: ..."
    pub checkpoint: String,
}

impl CycleSnapshot {
    pub fn checkpoint_summary(outcome: &CheckpointOutcome) -> String {
        match outcome {
            CheckpointOutcome::Skipped => "skipped".to_string(),
            CheckpointOutcome::Committed { files, .. } => format!("committed({})", files),
            CheckpointOutcome::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

/// Hub 上报配置
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// 聚合端点基地址 (如 http://localhost:8080)
    pub base_url: String,
    /// hub 侧项目 ID
    pub project_id: String,
}

/// Hub 状态推送载荷
#[derive(Debug, Serialize)]
struct HubPayload<'a> {
    status: &'a str,
    manager_cycle: u64,
}

/// 状态发布器
pub struct StatusPublisher {
    status_dir: PathBuf,
    controller_id: String,
    hub: Option<HubConfig>,
    client: reqwest::Client,
}

impl StatusPublisher {
    pub fn new(controller_id: &str, hub: Option<HubConfig>) -> Self {
        Self::new_with_dir(crate::config::state_dir().join("status"), controller_id, hub)
    }

    /// 创建写入指定目录的发布器（测试用）
    pub fn new_with_dir(status_dir: PathBuf, controller_id: &str, hub: Option<HubConfig>) -> Self {
        Self {
            status_dir,
            controller_id: controller_id.to_string(),
            hub,
            client: reqwest::Client::new(),
        }
    }

    /// 状态行文件路径（按 unit 名派生）
    pub fn status_file(&self, unit: &str) -> PathBuf {
        self.status_dir.join(format!("{}.txt", unit))
    }

    /// 快照 JSON 文件路径
    pub fn snapshot_file(&self, unit: &str) -> PathBuf {
        self.status_dir.join(format!("{}.json", unit))
    }

    /// 发布快照：覆盖写状态行 + 快照 JSON，然后 best-effort 推送 hub
    pub async fn publish(&self, snapshot: &CycleSnapshot) -> Result<()> {
        fs::create_dir_all(&self.status_dir)?;

        let line = format!(
            "{}-{}: Cycle {}, Phase {}",
            self.controller_id, snapshot.unit, snapshot.cycle, snapshot.phase
        );
        fs::write(self.status_file(&snapshot.unit), &line)?;
        fs::write(
            self.snapshot_file(&snapshot.unit),
            serde_json::to_string_pretty(snapshot)?,
        )?;
        info!(status = %line, "Status published");

        self.push_to_hub(snapshot).await;
        Ok(())
    }

    /// 读取已发布的状态行（`tsup status` 用）
    pub fn read_status_line(&self, unit: &str) -> Result<String> {
        Ok(fs::read_to_string(self.status_file(unit))?.trim().to_string())
    }

    /// 推送到 hub（可选；所有失败只记 debug 日志）
    async fn push_to_hub(&self, snapshot: &CycleSnapshot) {
        let Some(hub) = &self.hub else {
            return;
        };

        // 健康检查先行，端点不可达就不推送
        let health_url = format!("{}/health", hub.base_url);
        match self
            .client
            .get(&health_url)
            .timeout(HUB_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                debug!(url = %health_url, status = %resp.status(), "Hub unhealthy, skipping push");
                return;
            }
            Err(e) => {
                debug!(url = %health_url, error = %e, "Hub unreachable, skipping push");
                return;
            }
        }

        let url = format!("{}/api/projects/{}", hub.base_url, hub.project_id);
        let phase = snapshot.phase.to_string();
        let payload = HubPayload {
            status: &phase,
            manager_cycle: snapshot.cycle,
        };

        match self
            .client
            .put(&url)
            .json(&payload)
            .timeout(HUB_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(url = %url, cycle = snapshot.cycle, "Hub status pushed");
            }
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "Hub rejected status push");
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Hub status push failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(unit: &str, cycle: u64, phase: ProjectPhase) -> CycleSnapshot {
        CycleSnapshot {
            unit: unit.to_string(),
            cycle,
            phase,
            waiting_for_input: false,
            findings: Vec::new(),
            deliveries: Vec::new(),
            checkpoint: "skipped".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_status_line() {
        // Given: 指向临时目录的发布器，无 hub
        let tmp = TempDir::new().unwrap();
        let publisher = StatusPublisher::new_with_dir(tmp.path().to_path_buf(), "pm", None);

        // When: 发布一个快照
        publisher
            .publish(&snapshot("myproj", 3, ProjectPhase::Development))
            .await
            .unwrap();

        // Then: 状态行符合固定格式
        let line = publisher.read_status_line("myproj").unwrap();
        assert_eq!(line, "pm-myproj: Cycle 3, Phase development");
    }

    #[tokio::test]
    async fn test_publish_overwrites_each_cycle() {
        // Given: 同一个 unit 连续发布两个周期
        let tmp = TempDir::new().unwrap();
        let publisher = StatusPublisher::new_with_dir(tmp.path().to_path_buf(), "pm", None);

        publisher
            .publish(&snapshot("proj", 1, ProjectPhase::Initialization))
            .await
            .unwrap();
        publisher
            .publish(&snapshot("proj", 2, ProjectPhase::Initialization))
            .await
            .unwrap();

        // Then: 文件只含最后一个周期
        let line = publisher.read_status_line("proj").unwrap();
        assert!(line.contains("Cycle 2"));
        assert!(!line.contains("Cycle 1"));
    }

    #[tokio::test]
    async fn test_publish_with_unreachable_hub_is_best_effort() {
        // Given: hub 指向无人监听的端口
        let tmp = TempDir::new().unwrap();
        let publisher = StatusPublisher::new_with_dir(
            tmp.path().to_path_buf(),
            "pm",
            Some(HubConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                project_id: "p1".to_string(),
            }),
        );

        // When: 发布快照
        let result = publisher
            .publish(&snapshot("proj", 1, ProjectPhase::Development))
            .await;

        // Then: hub 推送失败被静默忽略，本地状态照常落盘
        assert!(result.is_ok());
        let line = publisher.read_status_line("proj").unwrap();
        assert_eq!(line, "pm-proj: Cycle 1, Phase development");
    }

    #[tokio::test]
    async fn test_snapshot_json_exposes_delivery_outcome() {
        // Given: 带投递结果的快照
        let tmp = TempDir::new().unwrap();
        let publisher = StatusPublisher::new_with_dir(tmp.path().to_path_buf(), "pm", None);

        let mut snap = snapshot("proj", 5, ProjectPhase::Testing);
        snap.deliveries.push(DeliveryReport {
            finding: FindingKind::DependencyError,
            outcome: "session 'proj' not found (live sessions: [])".to_string(),
        });

        // When: 发布
        publisher.publish(&snap).await.unwrap();

        // Then: 快照 JSON 记录了投递结果
        let json = std::fs::read_to_string(publisher.snapshot_file("proj")).unwrap();
        let parsed: CycleSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.deliveries.len(), 1);
        assert!(parsed.deliveries[0].outcome.contains("not found"));
    }
}
