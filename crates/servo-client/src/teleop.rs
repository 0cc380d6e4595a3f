//! 键盘遥操作控制循环
//!
//! 固定频率循环：每周期采样一次输入，按裁剪后的增量更新 [`SessionState`]，
//! 一次同步写下发所有目标位置，并向日志写一条记录。
//!
//! 会话状态在周期之间显式传递：[`TeleopLoop::tick`] 接收上一周期的状态，
//! 返回本周期的状态。总线的打开与关闭由调用方负责（通常使用 `BusGuard`）。

use crate::clock::{Clock, Pacer, PacingMode};
use crate::homing::{HomeStrategy, home_goals};
use crate::input::{InputSample, KeyMap, KeySource, SpecialKeys};
use crate::{ClientError, SessionState};
use servo_driver::ActuatorBus;
use servo_tools::{Joint, RecordSink};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 扭矩切换后的消抖等待
pub const TORQUE_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct TeleopConfig {
    /// 控制频率（Hz）
    pub hz: f64,
    /// 每周期每次按键的位置增量（舵机原始单位）
    pub step_units: i64,
    /// 是否以当前位置作为初始目标（读取失败时回退到回零策略）
    pub use_present_position_as_start: bool,
    pub home_strategy: HomeStrategy,
    pub pacing: PacingMode,
    pub debounce: Duration,
    /// 按下标记键时写入日志的文本
    pub marker_text: String,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            hz: 50.0,
            step_units: 10,
            use_present_position_as_start: false,
            home_strategy: HomeStrategy::default(),
            pacing: PacingMode::default(),
            debounce: TORQUE_DEBOUNCE,
            marker_text: "MARK".to_string(),
        }
    }
}

/// 单个周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue(SessionState),
    /// 周期开始时检测到退出；状态未被修改，也未写日志
    Quit(SessionState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// 完成的周期数（不含检测到退出的那一次）
    pub ticks: u64,
    pub writes: u64,
    pub torque_toggles: u64,
    pub final_state: SessionState,
}

pub struct TeleopLoop<B, K, C, S> {
    bus: B,
    keys: K,
    clock: C,
    sink: S,
    config: TeleopConfig,
    joints: Vec<Joint>,
    ids: Vec<u8>,
    keymap: KeyMap,
    special: SpecialKeys,
    writes: u64,
    torque_toggles: u64,
}

impl<B, K, C, S> TeleopLoop<B, K, C, S>
where
    B: ActuatorBus,
    K: KeySource,
    C: Clock,
    S: RecordSink,
{
    pub fn new(
        config: TeleopConfig,
        joints: Vec<Joint>,
        bus: B,
        keys: K,
        clock: C,
        sink: S,
    ) -> Result<Self, ClientError> {
        if joints.is_empty() {
            return Err(ClientError::NoJoints);
        }
        let ids = joints.iter().map(|j| j.id).collect();
        Ok(Self {
            bus,
            keys,
            clock,
            sink,
            config,
            joints,
            ids,
            keymap: KeyMap::new(),
            special: SpecialKeys::default(),
            writes: 0,
            torque_toggles: 0,
        })
    }

    /// 设置关节按键映射；没有对应关节的条目被忽略
    pub fn with_keymap(mut self, keymap: KeyMap) -> Self {
        self.keymap = keymap
            .into_iter()
            .filter(|(id, _)| {
                let known = self.ids.contains(id);
                if !known {
                    warn!("Ignoring key mapping for unconfigured joint {}", id);
                }
                known
            })
            .collect();
        self
    }

    pub fn with_special_keys(mut self, special: SpecialKeys) -> Self {
        self.special = special;
        self
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// 启动准备：配置位置模式并使能扭矩，选择初始目标
    pub fn prepare(&mut self) -> Result<SessionState, ClientError> {
        self.bus.configure_position_mode_and_enable(&self.ids)?;
        info!("Configured {} joints in position mode, torque enabled", self.ids.len());

        let goals = if self.config.use_present_position_as_start {
            match self.bus.read_positions(&self.ids) {
                Ok(present) => present.into_iter().map(|(id, p)| (id, i64::from(p))).collect(),
                Err(e) => {
                    warn!(
                        "Failed to read present positions ({}), falling back to {} homing",
                        e, self.config.home_strategy
                    );
                    home_goals(&self.joints, self.config.home_strategy)
                },
            }
        } else {
            home_goals(&self.joints, self.config.home_strategy)
        };

        let mut state = SessionState::new(goals, true);
        state.clamp_to(&self.joints);
        debug!("Initial goals: {:?}", state.goals);
        Ok(state)
    }

    /// 执行一个控制周期（不含周期末尾的睡眠）
    pub fn tick(&mut self, mut state: SessionState) -> Result<TickOutcome, ClientError> {
        self.keys.poll();
        let input = InputSample::capture(&self.keys, &self.keymap, &self.special);

        if input.quit {
            return Ok(TickOutcome::Quit(state));
        }

        state.estop = input.estop;

        if input.home {
            state.goals = home_goals(&self.joints, self.config.home_strategy);
            state.clamp_to(&self.joints);
            info!("Homing ({})", self.config.home_strategy);
        }

        if input.torque_toggle {
            self.clock.sleep(self.config.debounce);
            state.torque_on = !state.torque_on;
            self.bus.set_torque(&self.ids, state.torque_on)?;
            self.torque_toggles += 1;
            info!("Torque {}", if state.torque_on { "ON" } else { "OFF" });
        }

        if state.is_active() {
            self.apply_deltas(&mut state, &input.joints);
            self.bus.write_positions(&state.wire_goals(&self.joints))?;
            self.writes += 1;
        }

        let marker = if input.marker { self.config.marker_text.as_str() } else { "" };
        let record = state.to_record(self.clock.unix_ms(), &self.joints, marker);
        self.sink.write(&record)?;

        Ok(TickOutcome::Continue(state))
    }

    fn apply_deltas(&self, state: &mut SessionState, pressed: &BTreeMap<u8, (bool, bool)>) {
        let step = self.config.step_units;
        for joint in &self.joints {
            let Some(&(dec, inc)) = pressed.get(&joint.id) else {
                continue;
            };
            let goal = state.goals.entry(joint.id).or_insert_with(|| joint.midpoint());
            if dec {
                *goal -= step;
            }
            if inc {
                *goal += step;
            }
            *goal = joint.clamp(*goal);
        }
    }

    /// 准备后运行直到退出键（或中断）；总线错误、日志错误立即终止循环
    pub fn run(&mut self) -> Result<SessionSummary, ClientError> {
        // 频率非法时不触碰总线
        Pacer::new(self.config.hz, self.config.pacing)?;
        let state = self.prepare()?;
        self.run_from(state)
    }

    /// 从 [`prepare`](Self::prepare) 得到的状态开始运行
    ///
    /// 调用方可以在两者之间做只应在舵机配置成功后才做的事（例如创建会话日志）。
    pub fn run_from(&mut self, mut state: SessionState) -> Result<SessionSummary, ClientError> {
        let mut pacer = Pacer::new(self.config.hz, self.config.pacing)?;
        let mut ticks = 0u64;
        info!(
            "Control loop started at {} Hz ({:?} pacing, step {})",
            self.config.hz, self.config.pacing, self.config.step_units
        );

        loop {
            let tick_start = self.clock.now();
            match self.tick(state) {
                Ok(TickOutcome::Continue(next)) => state = next,
                Ok(TickOutcome::Quit(final_state)) => {
                    info!("Quit requested after {} ticks", ticks);
                    return Ok(SessionSummary {
                        ticks,
                        writes: self.writes,
                        torque_toggles: self.torque_toggles,
                        final_state,
                    });
                },
                Err(e) => {
                    error!("Control loop aborted after {} ticks: {}", ticks, e);
                    return Err(e);
                },
            }
            ticks += 1;
            pacer.wait(&self.clock, tick_start);
        }
    }
}
