//! 消息投递模块 - 经由按键注入向 worker window 投递已验证消息
//!
//! 投递是 fire-and-forget：先验证目标地址，再分两步注入（payload、submit），
//! 两步之间留固定沉降延迟。通道内部不做重试，重试是调用方的策略。

pub mod log;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::tmux::SessionDirectory;
use log::DeliveryLog;

/// 目标地址 (session, window)
///
/// 每次投递都针对活跃 substrate 重新解析，从不缓存：
/// window 可能在两个周期之间被关闭再重建。
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAddress {
    pub session: String,
    pub window: String,
}

impl TargetAddress {
    pub fn new(session: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            window: window.into(),
        }
    }

    /// 解析 "session:window" 形式的地址（window 缺省为 "0"）
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((session, window)) if !window.is_empty() => Self::new(session, window),
            _ => Self::new(raw, "0"),
        }
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.window)
    }
}

/// 投递成功回执
#[derive(Debug, Clone)]
pub struct DeliveryAck {
    pub target: String,
}

/// 投递错误
///
/// 三种失败形态必须可区分：目标缺失（完全未注入）、payload 注入失败
/// （完全失败）、submit 失败（部分投递，重试时不得重发 payload）。
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// session 不存在；附当前存活的 session 列表辅助诊断
    SessionNotFound {
        session: String,
        known_sessions: Vec<String>,
    },
    /// window 不存在于 session 中；附当前存活的 window 列表
    WindowNotFound {
        session: String,
        window: String,
        known_windows: Vec<String>,
    },
    /// payload 注入失败（完全失败，可整体重试）
    InjectFailed { target: String },
    /// payload 已落地但 submit 信号失败（部分投递，不可盲目重发 payload）
    PartialDelivery { target: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::SessionNotFound {
                session,
                known_sessions,
            } => write!(
                f,
                "session '{}' not found (live sessions: [{}])",
                session,
                known_sessions.join(", ")
            ),
            DeliveryError::WindowNotFound {
                session,
                window,
                known_windows,
            } => write!(
                f,
                "window '{}' not found in session '{}' (live windows: [{}])",
                window,
                session,
                known_windows.join(", ")
            ),
            DeliveryError::InjectFailed { target } => {
                write!(f, "payload injection failed for {}", target)
            }
            DeliveryError::PartialDelivery { target } => write!(
                f,
                "partial delivery to {}: payload landed, submit did not",
                target
            ),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// 消息投递通道
pub struct MessageChannel {
    directory: Arc<dyn SessionDirectory + Send + Sync>,
    delivery_log: DeliveryLog,
    settle_delay: Duration,
}

impl MessageChannel {
    pub fn new(
        directory: Arc<dyn SessionDirectory + Send + Sync>,
        settle_delay_ms: u64,
    ) -> Self {
        Self {
            directory,
            delivery_log: DeliveryLog::new(),
            settle_delay: Duration::from_millis(settle_delay_ms),
        }
    }

    /// 创建用于测试的通道（日志写入指定目录，沉降延迟可设为 0）
    pub fn new_with_log(
        directory: Arc<dyn SessionDirectory + Send + Sync>,
        delivery_log: DeliveryLog,
        settle_delay_ms: u64,
    ) -> Self {
        Self {
            directory,
            delivery_log,
            settle_delay: Duration::from_millis(settle_delay_ms),
        }
    }

    /// 投递一条消息
    ///
    /// 先按顺序验证 session、window（短路，分别报 `SessionNotFound` /
    /// `WindowNotFound`），再注入 payload，等沉降延迟，最后注入 submit。
    /// 每次尝试无论成败都先写 attempt 日志再动作。
    pub fn send(
        &self,
        address: &TargetAddress,
        payload: &str,
    ) -> Result<DeliveryAck, DeliveryError> {
        let target = address.to_string();

        // log-then-act：结果未知之前先落 attempt 记录
        if let Err(e) = self.delivery_log.log_attempt(&target, payload) {
            warn!(target = %target, error = %e, "Failed to log delivery attempt");
        }

        let result = self.deliver(address, payload);

        let outcome_text = match &result {
            Ok(_) => "delivered".to_string(),
            Err(e) => e.to_string(),
        };
        if let Err(e) = self.delivery_log.log_outcome(&target, &outcome_text) {
            warn!(target = %target, error = %e, "Failed to log delivery outcome");
        }

        match &result {
            Ok(_) => info!(target = %target, payload_len = payload.len(), "Message delivered"),
            Err(e) => warn!(target = %target, error = %e, "Message delivery failed"),
        }

        result
    }

    fn deliver(
        &self,
        address: &TargetAddress,
        payload: &str,
    ) -> Result<DeliveryAck, DeliveryError> {
        let target = address.to_string();

        if !self.directory.session_exists(&address.session) {
            return Err(DeliveryError::SessionNotFound {
                session: address.session.clone(),
                known_sessions: self.directory.list_sessions(),
            });
        }

        if !self.directory.window_exists(&address.session, &address.window) {
            let known_windows = self
                .directory
                .list_windows(&address.session)
                .into_iter()
                .map(|(idx, name)| format!("{}:{}", idx, name))
                .collect();
            return Err(DeliveryError::WindowNotFound {
                session: address.session.clone(),
                window: address.window.clone(),
                known_windows,
            });
        }

        if !self
            .directory
            .send_keys(&address.session, &address.window, payload)
        {
            return Err(DeliveryError::InjectFailed { target });
        }

        // 沉降延迟：给接收进程的输入缓冲时间注册 payload
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        if !self.directory.send_submit(&address.session, &address.window) {
            return Err(DeliveryError::PartialDelivery { target });
        }

        Ok(DeliveryAck { target })
    }
}
