//! 质量探针模块 - 针对 supervised unit 的轻量健康检查
//!
//! 探针失败产生结构化 finding；探针自身的错误被吞掉，
//! 按"无 finding"处理，不阻塞协调循环。

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::git::Vcs;

/// Finding 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    DependencyError,
    SyntaxError,
    ChangeVolumeHigh,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingKind::DependencyError => "dependency-error",
            FindingKind::SyntaxError => "syntax-error",
            FindingKind::ChangeVolumeHigh => "change-volume-high",
        };
        write!(f, "{}", s)
    }
}

/// 一条质量 finding（只活到本周期的告警投递为止，不另行持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFinding {
    pub kind: FindingKind,
    pub detail: String,
}

/// 依赖清单类型，决定运行哪个生态的探针
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// package.json
    Node,
    /// requirements.txt
    Python,
}

/// 按清单文件分类 unit。恰好匹配一种清单时才返回 Some；
/// 零个或多个匹配都不运行清单探针。
pub fn detect_manifest(root: &Path) -> Option<ManifestKind> {
    let node = root.join("package.json").exists();
    let python = root.join("requirements.txt").exists();

    match (node, python) {
        (true, false) => Some(ManifestKind::Node),
        (false, true) => Some(ManifestKind::Python),
        _ => None,
    }
}

/// 探针执行接口（测试中用 fake 替换真实工具调用）
///
/// 返回 `Ok(None)` 表示通过，`Ok(Some(detail))` 表示失败（产生 finding），
/// `Err` 表示探针本身出错（由 detector 吞掉）。
pub trait ProbeRunner {
    /// 依赖解析检查（node 生态）
    fn dependency_check(&self, root: &Path) -> Result<Option<String>>;

    /// 语法验证（python 生态）
    fn syntax_check(&self, root: &Path) -> Result<Option<String>>;
}

/// 调用真实工具链的探针执行器
pub struct SystemProbeRunner;

impl SystemProbeRunner {
    pub fn new() -> Self {
        Self
    }

    /// 递归收集 .py 文件，跳过常见的生成目录
    fn collect_py_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if path.is_dir() {
                if matches!(name.as_ref(), ".git" | "venv" | ".venv" | "node_modules" | "__pycache__") {
                    continue;
                }
                Self::collect_py_files(&path, out)?;
            } else if name.ends_with(".py") {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl Default for SystemProbeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRunner for SystemProbeRunner {
    fn dependency_check(&self, root: &Path) -> Result<Option<String>> {
        // 工具缺失时按探针错误处理（上层吞掉，不产生 finding）
        let npm = which::which("npm").map_err(|e| anyhow!("npm not available: {}", e))?;

        let output = Command::new(npm)
            .args(["ls", "--silent"])
            .current_dir(root)
            .output()?;

        if output.status.success() {
            Ok(None)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().take(5).collect::<Vec<_>>().join("; ");
            Ok(Some(format!("npm dependency resolution failed: {}", detail)))
        }
    }

    fn syntax_check(&self, root: &Path) -> Result<Option<String>> {
        let python = which::which("python3").map_err(|e| anyhow!("python3 not available: {}", e))?;

        let mut files = Vec::new();
        Self::collect_py_files(root, &mut files)?;

        for file in files {
            let output = Command::new(&python)
                .args(["-m", "py_compile"])
                .arg(&file)
                .output()?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = stderr.lines().last().unwrap_or("syntax error").to_string();
                return Ok(Some(format!(
                    "{}: {}",
                    file.display(),
                    detail
                )));
            }
        }
        Ok(None)
    }
}

/// 质量信号探测器
pub struct QualityDetector {
    root: PathBuf,
    change_volume_threshold: usize,
    runner: Box<dyn ProbeRunner + Send + Sync>,
}

impl QualityDetector {
    pub fn new(root: impl Into<PathBuf>, change_volume_threshold: usize) -> Self {
        Self {
            root: root.into(),
            change_volume_threshold,
            runner: Box::new(SystemProbeRunner::new()),
        }
    }

    /// 创建使用指定执行器的探测器（测试用）
    pub fn new_with_runner(
        root: impl Into<PathBuf>,
        change_volume_threshold: usize,
        runner: Box<dyn ProbeRunner + Send + Sync>,
    ) -> Self {
        Self {
            root: root.into(),
            change_volume_threshold,
            runner,
        }
    }

    /// 运行全部探针，产出零或多条 finding
    ///
    /// 本身永不失败：探针错误只记 warn 日志。
    pub fn probe(&self, vcs: &dyn Vcs) -> Vec<QualityFinding> {
        let mut findings = Vec::new();

        // 清单探针：恰好匹配一种清单类型时才运行
        match detect_manifest(&self.root) {
            Some(ManifestKind::Node) => {
                match self.runner.dependency_check(&self.root) {
                    Ok(Some(detail)) => findings.push(QualityFinding {
                        kind: FindingKind::DependencyError,
                        detail,
                    }),
                    Ok(None) => debug!("Dependency check passed"),
                    Err(e) => warn!(error = %e, "Dependency probe error, treated as no finding"),
                }
            }
            Some(ManifestKind::Python) => {
                match self.runner.syntax_check(&self.root) {
                    Ok(Some(detail)) => findings.push(QualityFinding {
                        kind: FindingKind::SyntaxError,
                        detail,
                    }),
                    Ok(None) => debug!("Syntax check passed"),
                    Err(e) => warn!(error = %e, "Syntax probe error, treated as no finding"),
                }
            }
            None => debug!("No unambiguous manifest, skipping manifest probe"),
        }

        // 变更量探针：与清单类型无关，总是运行
        match vcs.changed_paths() {
            Ok(changes) if changes.len() > self.change_volume_threshold => {
                findings.push(QualityFinding {
                    kind: FindingKind::ChangeVolumeHigh,
                    detail: format!(
                        "{} uncommitted changes (threshold {})",
                        changes.len(),
                        self.change_volume_threshold
                    ),
                });
            }
            Ok(changes) => debug!(changes = changes.len(), "Change volume below threshold"),
            Err(e) => warn!(error = %e, "Change volume probe error, treated as no finding"),
        }

        findings
    }
}
