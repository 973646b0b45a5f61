//! 集成测试共享的 fake substrate 实现
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tmux_supervisor::{ChangedPath, SessionDirectory, Vcs};

/// 可编程的 fake 会话目录，统计每条注入调用
#[derive(Default)]
pub struct FakeDirectory {
    /// session 名 -> window 列表
    pub sessions: Mutex<HashMap<String, Vec<(u32, String)>>>,
    pub pane_output: Mutex<String>,
    pub sent_payloads: Mutex<Vec<String>>,
    pub send_keys_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub fail_send_keys: AtomicBool,
    pub fail_submit: AtomicBool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个带单 window 的 session
    pub fn with_session(self, session: &str, window: &str) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.to_string(), vec![(0, window.to_string())]);
        self
    }

    pub fn set_pane_output(&self, output: &str) {
        *self.pane_output.lock().unwrap() = output.to_string();
    }

    pub fn payload_injections(&self) -> usize {
        self.send_keys_calls.load(Ordering::SeqCst)
    }

    pub fn submit_injections(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

impl SessionDirectory for FakeDirectory {
    fn session_exists(&self, session: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session)
    }

    fn list_sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn list_windows(&self, session: &str) -> Vec<(u32, String)> {
        self.sessions
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    fn capture_recent_output(&self, _session: &str, _window: &str, _lines: u32) -> String {
        self.pane_output.lock().unwrap().clone()
    }

    fn send_keys(&self, _session: &str, _window: &str, text: &str) -> bool {
        self.send_keys_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_send_keys.load(Ordering::SeqCst) {
            return false;
        }
        self.sent_payloads.lock().unwrap().push(text.to_string());
        true
    }

    fn send_submit(&self, _session: &str, _window: &str) -> bool {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        !self.fail_submit.load(Ordering::SeqCst)
    }
}

/// 可编程的 fake 版本控制 substrate
#[derive(Default)]
pub struct FakeVcs {
    pub changed: Mutex<usize>,
    pub revisions: Mutex<u32>,
    pub commit_ok: AtomicBool,
    pub commits: Mutex<Vec<String>>,
    pub status_errors: AtomicBool,
}

impl FakeVcs {
    pub fn new() -> Self {
        let vcs = Self::default();
        vcs.commit_ok.store(true, Ordering::SeqCst);
        vcs
    }

    pub fn set_changed(&self, n: usize) {
        *self.changed.lock().unwrap() = n;
    }

    pub fn set_revisions(&self, n: u32) {
        *self.revisions.lock().unwrap() = n;
    }
}

/// 包一层 Arc，让测试在周期之间继续改动 fake 的状态
pub struct SharedVcs(pub std::sync::Arc<FakeVcs>);

impl Vcs for SharedVcs {
    fn changed_paths(&self) -> Result<Vec<ChangedPath>> {
        self.0.changed_paths()
    }
    fn revision_count(&self) -> Result<u32> {
        self.0.revision_count()
    }
    fn recent_commits(&self, max_count: u32) -> Result<Vec<String>> {
        self.0.recent_commits(max_count)
    }
    fn commit_all(&self, message: &str) -> Result<bool> {
        self.0.commit_all(message)
    }
}

impl Vcs for FakeVcs {
    fn changed_paths(&self) -> Result<Vec<ChangedPath>> {
        if self.status_errors.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated status failure"));
        }
        let n = *self.changed.lock().unwrap();
        Ok((0..n)
            .map(|i| ChangedPath {
                status: " M".to_string(),
                path: format!("src/file_{}.rs", i),
            })
            .collect())
    }

    fn revision_count(&self) -> Result<u32> {
        Ok(*self.revisions.lock().unwrap())
    }

    fn recent_commits(&self, _max_count: u32) -> Result<Vec<String>> {
        Ok(self.commits.lock().unwrap().clone())
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        if self.commit_ok.load(Ordering::SeqCst) {
            self.commits.lock().unwrap().push(message.to_string());
            *self.changed.lock().unwrap() = 0;
            *self.revisions.lock().unwrap() += 1;
            Ok(true)
        } else {
            Err(anyhow!("simulated commit failure"))
        }
    }
}
