//! 生命周期模块 - supervised unit 的阶段状态机
//!
//! 阶段标记持久化在 unit 根目录的 `.project_phase` 文件中，只由
//! classifier 写入。阶段单调不回退，`testing` 是终态（进一步的自动
//! 转换留待扩展）。

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::git::Vcs;

/// 阶段标记文件名
pub const PHASE_MARKER_FILE: &str = ".project_phase";

/// 项目生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectPhase {
    Initialization,
    Development,
    Testing,
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectPhase::Initialization => "initialization",
            ProjectPhase::Development => "development",
            ProjectPhase::Testing => "testing",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ProjectPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "initialization" => Ok(ProjectPhase::Initialization),
            "development" => Ok(ProjectPhase::Development),
            "testing" => Ok(ProjectPhase::Testing),
            other => Err(anyhow!("unknown phase marker: '{}'", other)),
        }
    }
}

/// 一次阶段转换
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub from: ProjectPhase,
    pub to: ProjectPhase,
}

/// 生命周期分类器，绑定到一个 unit 的根目录
pub struct LifecycleClassifier {
    root: PathBuf,
    /// bootstrap 标记文件名（项目描述文档）
    bootstrap_marker: String,
    /// Development -> Testing 的提交数阈值（超过即转换）
    commit_threshold: u32,
}

impl LifecycleClassifier {
    pub fn new(root: impl Into<PathBuf>, bootstrap_marker: &str, commit_threshold: u32) -> Self {
        Self {
            root: root.into(),
            bootstrap_marker: bootstrap_marker.to_string(),
            commit_threshold,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.root.join(PHASE_MARKER_FILE)
    }

    /// 读取当前阶段；无标记时初始化为 initialization
    ///
    /// 标记内容损坏时报错且文件保持原样：阶段单调不回退，重写回
    /// initialization 会让一个已在 testing 的 unit 倒退。损坏的标记
    /// 留给人工修复，在那之前每个周期按无转换处理。
    pub fn current_phase(&self) -> Result<ProjectPhase> {
        let path = self.marker_path();
        match fs::read_to_string(&path) {
            Ok(content) => content.parse().map_err(|e| {
                warn!(marker = %path.display(), error = %e, "Corrupt phase marker, leaving untouched");
                e
            }),
            Err(_) => {
                debug!(marker = %path.display(), "No phase marker, initializing");
                self.write_phase(ProjectPhase::Initialization)?;
                Ok(ProjectPhase::Initialization)
            }
        }
    }

    fn write_phase(&self, phase: ProjectPhase) -> Result<()> {
        fs::write(self.marker_path(), phase.to_string())?;
        Ok(())
    }

    /// 每周期评估一次，最多推进一个阶段
    ///
    /// 评估在当前状态上短路：即使两个条件同时满足，也不会在一次评估里
    /// 跳过中间状态。
    pub fn evaluate(&self, vcs: &dyn Vcs) -> Result<Option<PhaseTransition>> {
        let current = self.current_phase()?;

        let next = match current {
            ProjectPhase::Initialization => {
                if self.root_populated()? && self.root.join(&self.bootstrap_marker).exists() {
                    Some(ProjectPhase::Development)
                } else {
                    None
                }
            }
            ProjectPhase::Development => {
                if vcs.revision_count()? > self.commit_threshold {
                    Some(ProjectPhase::Testing)
                } else {
                    None
                }
            }
            // 终态：不再有自动转换
            ProjectPhase::Testing => None,
        };

        match next {
            Some(to) => {
                self.write_phase(to)?;
                info!(from = %current, to = %to, "Phase transition");
                Ok(Some(PhaseTransition { from: current, to }))
            }
            None => Ok(None),
        }
    }

    /// 根目录是否已有内容（忽略阶段标记文件本身）
    fn root_populated(&self) -> Result<bool> {
        let mut entries = fs::read_dir(&self.root)?;
        Ok(entries.any(|entry| {
            entry
                .map(|e| e.file_name() != PHASE_MARKER_FILE)
                .unwrap_or(false)
        }))
    }
}
