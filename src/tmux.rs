//! tmux 会话目录模块 - 封装对 tmux substrate 的只读查询和按键注入
//!
//! 所有操作都是对活跃外部 substrate 的即时读取，不做任何缓存：
//! session/window 可能在两次调用之间异步关闭。

use anyhow::{anyhow, Result};
use std::process::Command;
use tracing::{debug, error, warn};

/// 会话目录接口
///
/// 协调循环只通过这个接口访问 tmux，便于未来换成事件驱动的 substrate
/// （以及在测试中用 fake 替换）。
pub trait SessionDirectory {
    /// 检查 session 是否存在
    fn session_exists(&self, session: &str) -> bool;

    /// 列出所有 session 名称
    fn list_sessions(&self) -> Vec<String>;

    /// 列出 session 中的所有 window（index, name）
    fn list_windows(&self, session: &str) -> Vec<(u32, String)>;

    /// 检查 window 是否存在于 session 中（按 index 或名称匹配）
    fn window_exists(&self, session: &str, window: &str) -> bool {
        self.list_windows(session)
            .iter()
            .any(|(idx, name)| idx.to_string() == window || name == window)
    }

    /// 捕获 window 的最近终端输出（best-effort，失败返回空字符串）
    ///
    /// 调用方必须先检查目标存在性；这里对缺失目标不报错。
    fn capture_recent_output(&self, session: &str, window: &str, lines: u32) -> String;

    /// 向 window 注入字面文本（不含提交）。返回是否成功。
    fn send_keys(&self, session: &str, window: &str, text: &str) -> bool;

    /// 向 window 注入提交信号（Enter）。返回是否成功。
    fn send_submit(&self, session: &str, window: &str) -> bool;
}

/// tmux 管理器 - SessionDirectory 的 tmux CLI 实现
pub struct TmuxManager;

impl TmuxManager {
    pub fn new() -> Self {
        Self
    }

    /// 拼接 tmux 目标地址 "session:window"
    fn target(session: &str, window: &str) -> String {
        format!("{}:{}", session, window)
    }

    /// 捕获 pane 输出（内部版本，带错误）
    fn capture_pane(&self, session: &str, window: &str, lines: u32) -> Result<String> {
        let output = Command::new("tmux")
            .args([
                "capture-pane",
                "-t", &Self::target(session, window),
                "-p",                          // print to stdout
                "-S", &format!("-{}", lines),  // start from N lines back
            ])
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(anyhow!(
                "Failed to capture pane from {}:{}",
                session,
                window
            ))
        }
    }
}

impl SessionDirectory for TmuxManager {
    fn session_exists(&self, session: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", session])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn list_sessions(&self) -> Vec<String> {
        let output = Command::new("tmux")
            .args(["list-sessions", "-F", "#{session_name}"])
            .output();

        match output {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout)
                .lines()
                .map(|s| s.to_string())
                .collect(),
            // tmux list-sessions fails if no sessions exist
            _ => Vec::new(),
        }
    }

    fn list_windows(&self, session: &str) -> Vec<(u32, String)> {
        let output = Command::new("tmux")
            .args([
                "list-windows",
                "-t", session,
                "-F", "#{window_index} #{window_name}",
            ])
            .output();

        match output {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout)
                .lines()
                .filter_map(|line| {
                    let (idx, name) = line.split_once(' ')?;
                    Some((idx.parse().ok()?, name.to_string()))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn capture_recent_output(&self, session: &str, window: &str, lines: u32) -> String {
        match self.capture_pane(session, window, lines) {
            Ok(content) => content,
            Err(e) => {
                warn!(session = %session, window = %window, error = %e, "Capture failed, returning empty");
                String::new()
            }
        }
    }

    fn send_keys(&self, session: &str, window: &str, text: &str) -> bool {
        let target = Self::target(session, window);
        debug!(target = %target, text_len = text.len(), "Sending literal keys");

        // 使用 -l 标志发送字面文本，避免 "Enter" 等特殊字符串被解释为按键
        let result = Command::new("tmux")
            .args(["send-keys", "-t", &target, "-l", text])
            .status();

        match result {
            Ok(status) if status.success() => true,
            Ok(_) => {
                error!(target = %target, "tmux send-keys returned non-zero");
                false
            }
            Err(e) => {
                error!(target = %target, error = %e, "Failed to spawn tmux send-keys");
                false
            }
        }
    }

    fn send_submit(&self, session: &str, window: &str) -> bool {
        let target = Self::target(session, window);
        debug!(target = %target, "Sending Enter");

        // 单独发送 Enter（不使用 -l，这里需要解释为按键）
        let result = Command::new("tmux")
            .args(["send-keys", "-t", &target, "Enter"])
            .status();

        match result {
            Ok(status) if status.success() => true,
            Ok(_) => {
                error!(target = %target, "tmux send-keys Enter returned non-zero");
                false
            }
            Err(e) => {
                error!(target = %target, error = %e, "Failed to spawn tmux send-keys Enter");
                false
            }
        }
    }
}

impl Default for TmuxManager {
    fn default() -> Self {
        Self::new()
    }
}
