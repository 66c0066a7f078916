use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signature::ScreenSignature;

/// 探索过程支持的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    Scroll,
    TextInput,
    Back,
}

/// 本次探索允许执行的操作集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    pub tap: bool,
    pub scroll: bool,
    pub text_input: bool,
    pub back: bool,
}

impl ActionSet {
    /// 从操作类型列表构建
    pub fn from_kinds(kinds: &[ActionKind]) -> Self {
        let mut set = Self { tap: false, scroll: false, text_input: false, back: false };
        for kind in kinds {
            match kind {
                ActionKind::Tap => set.tap = true,
                ActionKind::Scroll => set.scroll = true,
                ActionKind::TextInput => set.text_input = true,
                ActionKind::Back => set.back = true,
            }
        }
        set
    }

    pub fn allows(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Tap => self.tap,
            ActionKind::Scroll => self.scroll,
            ActionKind::TextInput => self.text_input,
            ActionKind::Back => self.back,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.tap || self.scroll || self.text_input || self.back)
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        // 默认与原始配置保持一致：点击 + 滚动 + 返回
        Self { tap: true, scroll: true, text_input: false, back: true }
    }
}

/// 单次操作记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,

    /// 操作目标：元素稳定标识或滚动方向描述
    pub target: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// 操作之后的界面指纹；界面未变化时为 None
    pub resulting_signature: Option<ScreenSignature>,
}

/// 探索期间在界面上发现的错误信号（如崩溃弹窗）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiErrorSignal {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 探索终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// 时间预算耗尽
    DurationExpired,
    /// 所有可达操作已穷尽
    DeadEndExhausted,
    /// 界面上检测到错误且无法恢复
    ErrorDetected,
    /// 调用方请求取消
    Cancelled,
}

/// 一次探索运行的完整结果，生成后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationOutcome {
    /// 访问过的不同界面数
    pub screens_visited: usize,

    /// 交互过的元素数
    pub elements_interacted: usize,

    /// 按发出顺序排列的操作记录
    pub actions: Vec<ActionRecord>,

    /// 界面上检测到的错误信号
    pub ui_errors: Vec<UiErrorSignal>,

    pub terminal: TerminalReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_set_from_kinds() {
        let set = ActionSet::from_kinds(&[ActionKind::Tap, ActionKind::Back]);
        assert!(set.allows(ActionKind::Tap));
        assert!(set.allows(ActionKind::Back));
        assert!(!set.allows(ActionKind::Scroll));
        assert!(!set.allows(ActionKind::TextInput));
    }

    #[test]
    fn test_action_set_empty() {
        assert!(ActionSet::from_kinds(&[]).is_empty());
        assert!(!ActionSet::default().is_empty());
    }
}
