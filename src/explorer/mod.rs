//! 界面自动探索模块
//!
//! 在时间预算内遍历被测应用的界面：维护访问记忆、选择下一步操作、
//! 检测界面上暴露的错误状态，并产出结构化的探索结果。

pub mod element;
pub mod engine;
pub mod outcome;
pub mod signature;

pub use element::{Bounds, ElementDescriptor};
pub use engine::{CancelFlag, Explorer, ExplorerConfig};
pub use outcome::{
    ActionKind, ActionRecord, ActionSet, ExplorationOutcome, TerminalReason, UiErrorSignal,
};
pub use signature::ScreenSignature;
