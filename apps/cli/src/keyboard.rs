//! 终端键盘输入
//!
//! 在 raw 模式下读取按键事件，回答“某个命名按键当前是否按住”。
//!
//! - 终端支持 kitty 键盘协议时，按下/松开事件精确跟踪按住状态
//! - 否则以最后一次按下/自动重复事件之后的一个短窗口视为按住
//!
//! raw 模式下 Ctrl-C 不产生 SIGINT，这里按中断处理（控制循环会退出）。

use anyhow::{Context, Result};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use servo_client::KeySource;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// 无松开事件时，按下后视为按住的时长（覆盖系统自动重复的间隔）
pub const HOLD_WINDOW: Duration = Duration::from_millis(120);

/// 按键名：字母数字小写，特殊键使用固定名称（`space`、`esc`、`up`、`f1` ...）
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_lowercase().to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Home => "home".to_string(),
        KeyCode::End => "end".to_string(),
        KeyCode::PageUp => "pageup".to_string(),
        KeyCode::PageDown => "pagedown".to_string(),
        KeyCode::Insert => "insert".to_string(),
        KeyCode::Delete => "delete".to_string(),
        KeyCode::F(n) => format!("f{}", n),
        _ => return None,
    };
    Some(name)
}

/// 按住状态跟踪（与终端无关，便于测试）
#[derive(Debug)]
pub struct KeyTracker {
    /// 按键名 → 最近一次按下/重复的时间
    held: BTreeMap<String, Instant>,
    /// 终端是否报告松开事件
    reports_release: bool,
    hold_window: Duration,
    interrupted: bool,
}

impl KeyTracker {
    pub fn new(reports_release: bool, hold_window: Duration) -> Self {
        Self {
            held: BTreeMap::new(),
            reports_release,
            hold_window,
            interrupted: false,
        }
    }

    pub fn apply(&mut self, event: KeyEvent, now: Instant) {
        if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c') {
            self.interrupted = true;
            return;
        }
        let Some(name) = key_name(event.code) else {
            return;
        };
        match event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                self.held.insert(name, now);
            },
            KeyEventKind::Release => {
                self.held.remove(&name);
            },
        }
    }

    /// 没有松开事件时，超出窗口的按键视为已松开
    pub fn expire(&mut self, now: Instant) {
        if self.reports_release {
            return;
        }
        let window = self.hold_window;
        self.held
            .retain(|_, pressed_at| now.saturating_duration_since(*pressed_at) <= window);
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(&key.to_lowercase())
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    fn interrupt(&mut self) {
        self.interrupted = true;
    }
}

/// raw 模式终端按键源；`enable` 之后生效，drop 时恢复终端
pub struct TerminalKeys {
    tracker: KeyTracker,
    interrupt: Arc<AtomicBool>,
    raw: bool,
    enhanced: bool,
}

impl TerminalKeys {
    /// 创建按键源（尚未接管终端）
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        Self {
            tracker: KeyTracker::new(false, HOLD_WINDOW),
            interrupt,
            raw: false,
            enhanced: false,
        }
    }

    /// 进入 raw 模式；终端支持时启用按下/松开事件
    pub fn enable(&mut self) -> Result<()> {
        if self.raw {
            return Ok(());
        }
        let supported = terminal::supports_keyboard_enhancement().unwrap_or(false);
        terminal::enable_raw_mode().context("无法进入终端 raw 模式")?;
        self.raw = true;
        if supported {
            match execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            ) {
                Ok(()) => self.enhanced = true,
                Err(e) => warn!("Keyboard enhancement unavailable: {}", e),
            }
        }
        self.tracker = KeyTracker::new(self.enhanced, HOLD_WINDOW);
        Ok(())
    }

    /// 是否精确跟踪松开事件
    pub fn precise(&self) -> bool {
        self.enhanced
    }

    fn drain_events(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                self.tracker.apply(key, Instant::now());
            }
        }
        Ok(())
    }
}

impl KeySource for TerminalKeys {
    fn poll(&mut self) {
        if let Err(e) = self.drain_events() {
            // 读不到键盘就无法安全地继续遥操作
            warn!("Keyboard read failed, stopping: {}", e);
            self.tracker.interrupt();
        }
        self.tracker.expire(Instant::now());
    }

    fn is_held(&self, key: &str) -> bool {
        self.tracker.is_held(key)
    }

    fn interrupted(&self) -> bool {
        self.tracker.interrupted() || self.interrupt.load(Ordering::SeqCst)
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        if self.raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}
