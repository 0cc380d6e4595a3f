//! 按键输入抽象
//!
//! 控制循环只关心“某个命名按键当前是否按住”。每个周期开始时调用一次
//! [`KeySource::poll`]，随后由 [`InputSample::capture`] 一次性采样所有标志。

use std::collections::BTreeMap;

/// 按键状态来源（键盘、脚本、远程输入等）
pub trait KeySource {
    /// 刷新按键状态（每周期一次）
    fn poll(&mut self) {}

    /// 指定名称的按键当前是否按住
    fn is_held(&self, key: &str) -> bool;

    /// 外部中断请求（例如终端 Ctrl-C），按退出处理
    fn interrupted(&self) -> bool {
        false
    }
}

impl<K: KeySource + ?Sized> KeySource for &mut K {
    fn poll(&mut self) {
        (**self).poll()
    }

    fn is_held(&self, key: &str) -> bool {
        (**self).is_held(key)
    }

    fn interrupted(&self) -> bool {
        (**self).interrupted()
    }
}

/// 关节的减/增按键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointKeys {
    pub dec: String,
    pub inc: String,
}

impl JointKeys {
    pub fn new(dec: impl Into<String>, inc: impl Into<String>) -> Self {
        Self {
            dec: dec.into(),
            inc: inc.into(),
        }
    }
}

/// 关节 id → 按键
pub type KeyMap = BTreeMap<u8, JointKeys>;

/// 功能键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialKeys {
    pub home: String,
    pub torque_toggle: String,
    pub estop_hold: String,
    pub marker: String,
    pub quit: String,
}

impl Default for SpecialKeys {
    fn default() -> Self {
        Self {
            home: "h".to_string(),
            torque_toggle: "t".to_string(),
            estop_hold: "space".to_string(),
            marker: "m".to_string(),
            quit: "esc".to_string(),
        }
    }
}

/// 一个周期内采样到的全部输入标志
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSample {
    pub quit: bool,
    pub estop: bool,
    pub marker: bool,
    pub home: bool,
    pub torque_toggle: bool,
    /// 关节 id → (减, 增)，只包含有按键映射的关节
    pub joints: BTreeMap<u8, (bool, bool)>,
}

impl InputSample {
    pub fn capture<K: KeySource + ?Sized>(source: &K, keymap: &KeyMap, special: &SpecialKeys) -> Self {
        Self {
            quit: source.interrupted() || source.is_held(&special.quit),
            estop: source.is_held(&special.estop_hold),
            marker: source.is_held(&special.marker),
            home: source.is_held(&special.home),
            torque_toggle: source.is_held(&special.torque_toggle),
            joints: keymap
                .iter()
                .map(|(&id, keys)| (id, (source.is_held(&keys.dec), source.is_held(&keys.inc))))
                .collect(),
        }
    }
}

/// 按周期回放的按键脚本：第 N 次 `poll` 之后按住第 N 帧中的按键
///
/// 脚本耗尽后不再按住任何键。
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeys {
    frames: Vec<Vec<String>>,
    cursor: usize,
    current: Vec<String>,
}

impl ScriptedKeys {
    pub fn new<I, F, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: frames
                .into_iter()
                .map(|f| f.into_iter().map(Into::into).collect())
                .collect(),
            cursor: 0,
            current: Vec::new(),
        }
    }

    /// 已消费的帧数
    pub fn polled(&self) -> usize {
        self.cursor
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self) {
        self.current = self.frames.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
    }

    fn is_held(&self, key: &str) -> bool {
        self.current.iter().any(|k| k == key)
    }
}
