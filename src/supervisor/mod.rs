//! Supervisor 模块 - 每个 supervised unit 一个协调循环
//!
//! 循环每周期按固定顺序执行：捕获输出 → 质量探针 → 告警投递 →
//! checkpoint → 生命周期评估 → 状态发布 → 睡眠。任何一步的错误都不能
//! 终止循环：记日志、当作该周期跳过这一步。循环只被外部信号终止。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointEnforcer, CheckpointOutcome};
use crate::config::SupervisorConfig;
use crate::delivery::{log::DeliveryLog, MessageChannel, TargetAddress};
use crate::git::{GitRepo, Vcs};
use crate::lifecycle::{LifecycleClassifier, ProjectPhase};
use crate::quality::{QualityDetector, QualityFinding};
use crate::status::{CycleSnapshot, DeliveryReport, HubConfig, StatusPublisher};
use crate::tmux::{SessionDirectory, TmuxManager};

/// 捕获输出中表示 worker 在等待输入的迹象
///
/// 仅用于可观测性：记 warn 日志并在快照里置 waiting_for_input 标记，
/// 核心循环不据此自动操作。
const STUCK_INDICATORS: &[&str] = &[
    "Do you want to proceed?",
    "❯ 1. Yes",
    "[Y/n]",
    "Continue?",
    "Press any key to continue",
    "Waiting for input",
];

/// 检查捕获的终端输出是否含等待输入的迹象
pub fn contains_stuck_indicator(output: &str) -> bool {
    STUCK_INDICATORS
        .iter()
        .any(|indicator| output.contains(indicator))
}

/// 一个被监管的项目
#[derive(Debug, Clone)]
pub struct SupervisedUnit {
    /// 在 controller 范围内唯一的名称
    pub name: String,
    /// 项目根目录
    pub root: PathBuf,
    /// 关联的 tmux session
    pub session: String,
    /// 主 window（告警投递目标）
    pub window: String,
}

impl SupervisedUnit {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        session: impl Into<String>,
        window: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            session: session.into(),
            window: window.into(),
        }
    }

    /// 启动校验：身份缺失或根目录不存在是致命错误（进入循环前退出）
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("unit name must not be empty");
        }
        if self.session.trim().is_empty() {
            anyhow::bail!("session name must not be empty");
        }
        if !self.root.is_dir() {
            anyhow::bail!("unit root path does not exist: {}", self.root.display());
        }
        Ok(())
    }

    /// 告警投递的目标地址（每次投递时重新解析，不缓存）
    pub fn primary_target(&self) -> TargetAddress {
        TargetAddress::new(&self.session, &self.window)
    }
}

/// 每个 unit 一个 supervisor，驱动所有其他组件
pub struct Supervisor {
    unit: SupervisedUnit,
    config: SupervisorConfig,
    cycle_count: u64,
    /// 最近一次成功读取的阶段（标记暂时不可读时沿用）
    phase: ProjectPhase,
    directory: Arc<dyn SessionDirectory + Send + Sync>,
    channel: MessageChannel,
    vcs: Box<dyn Vcs + Send + Sync>,
    enforcer: CheckpointEnforcer,
    classifier: LifecycleClassifier,
    detector: QualityDetector,
    publisher: StatusPublisher,
}

impl Supervisor {
    /// 用真实 substrate（tmux、git、系统探针）装配 supervisor
    pub fn new(unit: SupervisedUnit, config: SupervisorConfig) -> Self {
        let directory: Arc<dyn SessionDirectory + Send + Sync> = Arc::new(TmuxManager::new());
        let hub = match (&config.hub_url, &config.hub_project_id) {
            (Some(url), Some(id)) => Some(HubConfig {
                base_url: url.clone(),
                project_id: id.clone(),
            }),
            _ => None,
        };

        Self {
            channel: MessageChannel::new(Arc::clone(&directory), config.settle_delay_ms),
            vcs: Box::new(GitRepo::new(&unit.root)),
            enforcer: CheckpointEnforcer::new(config.checkpoint_interval_secs),
            classifier: LifecycleClassifier::new(
                &unit.root,
                &config.bootstrap_marker,
                config.development_commit_threshold,
            ),
            detector: QualityDetector::new(&unit.root, config.change_volume_threshold),
            publisher: StatusPublisher::new(&config.controller_id, hub),
            directory,
            cycle_count: 0,
            phase: ProjectPhase::Initialization,
            unit,
            config,
        }
    }

    /// 用注入的组件装配 supervisor（测试用：fake substrate、临时目录）
    #[allow(clippy::too_many_arguments)]
    pub fn with_parts(
        unit: SupervisedUnit,
        config: SupervisorConfig,
        directory: Arc<dyn SessionDirectory + Send + Sync>,
        vcs: Box<dyn Vcs + Send + Sync>,
        detector: QualityDetector,
        delivery_log: DeliveryLog,
        status_dir: PathBuf,
    ) -> Self {
        let channel =
            MessageChannel::new_with_log(Arc::clone(&directory), delivery_log, config.settle_delay_ms);
        Self {
            channel,
            enforcer: CheckpointEnforcer::new(config.checkpoint_interval_secs),
            classifier: LifecycleClassifier::new(
                &unit.root,
                &config.bootstrap_marker,
                config.development_commit_threshold,
            ),
            detector,
            publisher: StatusPublisher::new_with_dir(status_dir, &config.controller_id, None),
            vcs,
            directory,
            cycle_count: 0,
            phase: ProjectPhase::Initialization,
            unit,
            config,
        }
    }

    /// 无限协调循环；只被外部进程终止
    pub async fn run(&mut self) {
        info!(
            unit = %self.unit.name,
            session = %self.unit.session,
            root = %self.unit.root.display(),
            interval_secs = self.config.cycle_interval_secs,
            "Supervisor starting"
        );

        loop {
            self.run_cycle().await;
            sleep(Duration::from_secs(self.config.cycle_interval_secs)).await;
        }
    }

    /// 执行一个周期，返回结构化快照
    pub async fn run_cycle(&mut self) -> CycleSnapshot {
        // 1. 周期计数
        self.cycle_count += 1;
        info!(unit = %self.unit.name, cycle = self.cycle_count, "Cycle started");

        // 2. 捕获最近输出（仅诊断：记日志，不据此操作）
        let waiting_for_input = self.capture_step();

        // 3. 质量探针 + 告警投递
        let findings = self.detector.probe(self.vcs.as_ref());
        let deliveries = self.alert_step(&findings);

        // 4. 持久化纪律
        let checkpoint = self.enforcer.maybe_checkpoint(self.vcs.as_ref());
        match &checkpoint {
            CheckpointOutcome::Skipped => debug!(unit = %self.unit.name, "Checkpoint skipped"),
            CheckpointOutcome::Committed { files, elapsed_secs } => {
                info!(unit = %self.unit.name, files, elapsed_secs, "Checkpoint committed");
                if let Ok(commits) = self.vcs.recent_commits(1) {
                    if let Some(head) = commits.first() {
                        debug!(unit = %self.unit.name, head = %head, "New checkpoint head");
                    }
                }
            }
            CheckpointOutcome::Failed(reason) => {
                warn!(unit = %self.unit.name, reason = %reason, "Checkpoint failed, will retry next cycle")
            }
        }

        // 5. 生命周期评估
        match self.classifier.evaluate(self.vcs.as_ref()) {
            Ok(Some(transition)) => {
                info!(unit = %self.unit.name, from = %transition.from, to = %transition.to, "Phase advanced")
            }
            Ok(None) => {}
            Err(e) => warn!(unit = %self.unit.name, error = %e, "Lifecycle step skipped"),
        }

        // 6. 状态发布（文件 + best-effort hub 推送）
        // 标记暂时不可读（如内容损坏）时沿用最近一次成功读取的阶段，
        // 快照里的阶段不回退
        match self.classifier.current_phase() {
            Ok(phase) => self.phase = phase,
            Err(e) => {
                warn!(unit = %self.unit.name, error = %e, "Phase marker unreadable, keeping last known phase")
            }
        }
        let snapshot = CycleSnapshot {
            unit: self.unit.name.clone(),
            cycle: self.cycle_count,
            phase: self.phase,
            waiting_for_input,
            findings,
            deliveries,
            checkpoint: CycleSnapshot::checkpoint_summary(&checkpoint),
        };
        if let Err(e) = self.publisher.publish(&snapshot).await {
            warn!(unit = %self.unit.name, error = %e, "Status publish skipped");
        }

        info!(unit = %self.unit.name, cycle = self.cycle_count, "Cycle complete");
        snapshot
    }

    /// 捕获步骤：记录输出片段，扫描等待输入的迹象
    fn capture_step(&self) -> bool {
        let output = self.directory.capture_recent_output(
            &self.unit.session,
            &self.unit.window,
            self.config.capture_lines,
        );

        if output.is_empty() {
            debug!(unit = %self.unit.name, "No recent output captured");
            return false;
        }

        debug!(
            unit = %self.unit.name,
            lines = output.lines().count(),
            "Captured recent output"
        );

        let waiting = contains_stuck_indicator(&output);
        if waiting {
            warn!(
                unit = %self.unit.name,
                session = %self.unit.session,
                "Worker appears to be waiting for input"
            );
        }
        waiting
    }

    /// 告警步骤：为每条 finding 组一条操作者可读的告警并尝试投递
    ///
    /// 告警自身的投递失败不升级，结果记入快照以保证可观测。
    fn alert_step(&self, findings: &[QualityFinding]) -> Vec<DeliveryReport> {
        let target = self.unit.primary_target();
        findings
            .iter()
            .map(|finding| {
                let alert = format!(
                    "SUPERVISOR ALERT [{}] {}: {}",
                    self.unit.name, finding.kind, finding.detail
                );
                let outcome = match self.channel.send(&target, &alert) {
                    Ok(ack) => {
                        debug!(target = %ack.target, kind = %finding.kind, "Alert delivered");
                        "delivered".to_string()
                    }
                    Err(e) => e.to_string(),
                };
                DeliveryReport {
                    finding: finding.kind,
                    outcome,
                }
            })
            .collect()
    }
}
