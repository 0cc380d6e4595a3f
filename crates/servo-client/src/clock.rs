//! 时钟与周期调度
//!
//! 控制循环和回放的所有等待都经过 [`Clock`]，测试时用 [`ManualClock`]
//! 记录每次睡眠而不真正等待。

use crate::ClientError;
use servo_tools::unix_ms_now;
use spin_sleep::SpinSleeper;
use std::cell::RefCell;
use std::time::{Duration, Instant};
use tracing::debug;

pub trait Clock {
    fn now(&self) -> Instant;

    /// 日志时间戳（Unix 毫秒）
    fn unix_ms(&self) -> u64;

    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn unix_ms(&self) -> u64 {
        (**self).unix_ms()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// 系统时钟（`spin_sleep` 低抖动延时）
#[derive(Debug, Default)]
pub struct SystemClock {
    sleeper: SpinSleeper,
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_ms(&self) -> u64 {
        unix_ms_now()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

/// 手动推进的时钟：`sleep` 只记录时长并推进时间
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_unix_ms: u64,
    elapsed: RefCell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(origin_unix_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_unix_ms,
            elapsed: RefCell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// 不记录为睡眠的时间推进（模拟处理耗时）
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.borrow_mut() += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.borrow()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn unix_ms(&self) -> u64 {
        self.origin_unix_ms + self.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

/// 周期调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// 睡眠“周期 - 本周期耗时”（不低于 0），不跨周期补偿漂移
    #[default]
    Remainder,
    /// 绝对截止时间：下一周期 = 上一截止时间 + 周期；超时后以当前时刻重新锚定
    Deadline,
}

impl PacingMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "remainder" => Some(PacingMode::Remainder),
            "deadline" => Some(PacingMode::Deadline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    mode: PacingMode,
    next_deadline: Option<Instant>,
}

impl Pacer {
    pub fn new(hz: f64, mode: PacingMode) -> Result<Self, ClientError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ClientError::InvalidFrequency(hz));
        }
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / hz),
            mode,
            next_deadline: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 周期末尾调用：按调度方式睡眠到下一周期
    pub fn wait<C: Clock + ?Sized>(&mut self, clock: &C, tick_start: Instant) {
        let now = clock.now();
        let delay = match self.mode {
            PacingMode::Remainder => self.period.saturating_sub(now.saturating_duration_since(tick_start)),
            PacingMode::Deadline => {
                let deadline = self.next_deadline.unwrap_or(tick_start) + self.period;
                if deadline > now {
                    self.next_deadline = Some(deadline);
                    deadline - now
                } else {
                    debug!(
                        "Tick overrun by {:?}, re-anchoring schedule",
                        now.saturating_duration_since(deadline)
                    );
                    self.next_deadline = Some(now);
                    Duration::ZERO
                }
            },
        };
        if !delay.is_zero() {
            clock.sleep(delay);
        }
    }
}
