//! 测试会话模块
//!
//! 编排整个测试流程：按顺序测试每个应用，采集日志证据，
//! 把探索结果与日志证据归并为唯一状态，按策略重试，最后汇总。

pub mod aggregator;
pub mod classifier;
pub mod orchestrator;

pub use aggregator::{summarize, SessionSummary};
pub use classifier::{classify, FailureKind, FailureRecord, RunStatus};
pub use orchestrator::{
    AppRunResult, AppSpec, SessionOrchestrator, SessionPolicy, SessionResult,
};
