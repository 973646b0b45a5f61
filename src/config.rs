//! 配置模块 - Supervisor 的可调参数

use std::path::PathBuf;

/// Supervisor 配置（所有阈值和间隔）
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// 协调循环间隔（秒）
    pub cycle_interval_secs: u64,
    /// 强制 checkpoint 间隔（秒）
    pub checkpoint_interval_secs: u64,
    /// Development -> Testing 所需的最少提交数（超过即转换）
    pub development_commit_threshold: u32,
    /// 未提交变更数告警阈值（超过即告警）
    pub change_volume_threshold: usize,
    /// 注入 payload 与 submit 之间的沉降延迟（毫秒）
    pub settle_delay_ms: u64,
    /// 每个周期捕获的终端行数
    pub capture_lines: u32,
    /// bootstrap 标记文件名（项目描述文档）
    pub bootstrap_marker: String,
    /// Controller ID（状态行前缀）
    pub controller_id: String,
    /// Hub 聚合端点 URL（可选）
    pub hub_url: Option<String>,
    /// Hub 侧的项目 ID（可选）
    pub hub_project_id: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60,
            checkpoint_interval_secs: 1800,
            development_commit_threshold: 5,
            change_volume_threshold: 10,
            settle_delay_ms: 500,
            capture_lines: 50,
            bootstrap_marker: "PROJECT_SPEC.md".to_string(),
            controller_id: "pm".to_string(),
            hub_url: None,
            hub_project_id: None,
        }
    }
}

/// 获取状态目录 (~/.tmux-supervisor)
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tmux-supervisor")
}
