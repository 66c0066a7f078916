use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::device::traits::Device;
use crate::error::AppError;

use super::element::ElementDescriptor;
use super::outcome::{
    ActionKind, ActionRecord, ActionSet, ExplorationOutcome, TerminalReason, UiErrorSignal,
};
use super::signature::ScreenSignature;

/// 错误弹窗关键词（命中即视为界面错误信号）
const ERROR_DIALOG_KEYWORDS: &[&str] = &[
    "has stopped",
    "keeps stopping",
    "unfortunately",
    "force close",
    "stopped unexpectedly",
    "isn't responding",
    "not responding",
    "已停止运行",
    "无响应",
];

/// 错误弹窗上常见的关闭按钮文案
const DISMISS_LABELS: &[&str] = &["ok", "close", "dismiss", "确定", "关闭"];

/// 协作式取消标志
///
/// 引擎在每轮循环开头检查一次；置位后引擎以 `Cancelled` 终止并保留已有记录。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 探索引擎配置
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// 单次设备调用超时，独立于整体时间预算
    pub step_timeout: Duration,

    /// 操作之间的等待间隔
    pub action_delay: Duration,

    /// 同一界面指纹上连续滚动的上限（防止无限滚动列表）
    pub scroll_cap: u32,

    /// 填入输入框的合成文本
    pub input_text_value: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
            action_delay: Duration::from_millis(500),
            scroll_cap: 5,
            input_text_value: "test input".to_string(),
        }
    }
}

/// 单次探索运行的内部状态，随运行创建、随运行丢弃
struct RunState {
    visited: HashSet<ScreenSignature>,
    /// 可交互元素按首次发现顺序排列（广度优先偏好的依据）
    discovery_order: Vec<String>,
    discovered: HashSet<String>,
    tapped: HashSet<String>,
    filled: HashSet<String>,
    /// (界面指纹, 连续滚动次数)
    scroll_run: Option<(ScreenSignature, u32)>,
    dismiss_attempted: bool,
    prev_signature: Option<ScreenSignature>,

    screens_visited: usize,
    elements_interacted: usize,
    actions: Vec<ActionRecord>,
    ui_errors: Vec<UiErrorSignal>,
}

impl RunState {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            discovery_order: Vec::new(),
            discovered: HashSet::new(),
            tapped: HashSet::new(),
            filled: HashSet::new(),
            scroll_run: None,
            dismiss_attempted: false,
            prev_signature: None,
            screens_visited: 0,
            elements_interacted: 0,
            actions: Vec::new(),
            ui_errors: Vec::new(),
        }
    }

    fn record(&mut self, kind: ActionKind, target: Option<String>) {
        self.actions.push(ActionRecord {
            kind,
            target,
            timestamp: Utc::now(),
            resulting_signature: None,
        });
    }

    fn finish(self, terminal: TerminalReason) -> ExplorationOutcome {
        ExplorationOutcome {
            screens_visited: self.screens_visited,
            elements_interacted: self.elements_interacted,
            actions: self.actions,
            ui_errors: self.ui_errors,
            terminal,
        }
    }
}

/// 界面自动探索引擎
///
/// 在时间预算内反复执行"快照 → 选择操作 → 执行"循环，
/// 用访问记忆避免重复探索，并检测界面上暴露的错误状态。
pub struct Explorer {
    device: Arc<dyn Device>,
    config: ExplorerConfig,
    cancel: CancelFlag,
}

impl Explorer {
    pub fn new(device: Arc<dyn Device>, config: ExplorerConfig, cancel: CancelFlag) -> Self {
        Self { device, config, cancel }
    }

    /// 对被测应用执行一次探索
    ///
    /// 返回 `Ok(ExplorationOutcome)` 表示探索正常终止（含检测到界面错误的情况）；
    /// 返回 `Err` 表示传输层故障（设备调用失败或超时），由调用方决定是否重试整次运行。
    pub async fn explore(
        &self,
        package: &str,
        budget: Duration,
        allowed: ActionSet,
    ) -> Result<ExplorationOutcome, AppError> {
        info!(
            package,
            budget_secs = budget.as_secs_f64(),
            "开始界面探索"
        );

        let started = Instant::now();
        let mut state = RunState::new();

        let terminal = loop {
            if self.cancel.is_cancelled() {
                info!(package, "收到取消请求，终止探索");
                break TerminalReason::Cancelled;
            }

            if started.elapsed() >= budget {
                debug!(package, "时间预算耗尽");
                break TerminalReason::DurationExpired;
            }

            let elements = self
                .call(self.device.snapshot(), "snapshot")
                .await?;
            let signature = ScreenSignature::derive(&elements);

            // 回填上一条操作的结果指纹（界面未变化时保持 None）
            if let Some(prev) = state.prev_signature {
                if signature != prev {
                    if let Some(last) = state.actions.last_mut() {
                        if last.resulting_signature.is_none() {
                            last.resulting_signature = Some(signature);
                        }
                    }
                }
            }
            state.prev_signature = Some(signature);

            if state.visited.insert(signature) {
                state.screens_visited += 1;
                debug!(%signature, total = state.screens_visited, "发现新界面");
            }

            for el in elements.iter().filter(|el| el.is_interactive()) {
                let key = el.stable_key();
                if state.discovered.insert(key.clone()) {
                    state.discovery_order.push(key);
                }
            }

            // 错误弹窗检测：记录信号并尝试关闭一次，再次出现则终止
            if let Some(message) = detect_error_dialog(&elements) {
                warn!(package, %message, "检测到错误弹窗");
                state.ui_errors.push(UiErrorSignal {
                    message,
                    timestamp: Utc::now(),
                });

                if state.dismiss_attempted {
                    break TerminalReason::ErrorDetected;
                }
                state.dismiss_attempted = true;

                self.dismiss_error_dialog(&elements).await?;
                if !self.app_in_foreground(package).await? {
                    break TerminalReason::ErrorDetected;
                }
                continue;
            }

            // 操作选择，优先级：文本输入 > 点击 > 滚动 > 返回
            if allowed.text_input {
                if let Some(el) = elements
                    .iter()
                    .find(|el| el.editable && !state.filled.contains(&el.stable_key()))
                {
                    let key = el.stable_key();
                    let (x, y) = el.bounds.center();
                    debug!(%key, "填充输入框");
                    self.call(self.device.tap(x, y), "tap").await?;
                    self.call(
                        self.device.input_text(&self.config.input_text_value),
                        "input_text",
                    )
                    .await?;
                    state.filled.insert(key.clone());
                    state.elements_interacted += 1;
                    state.scroll_run = None;
                    state.record(ActionKind::TextInput, Some(key));
                    self.pause().await;
                    continue;
                }
            }

            if allowed.tap {
                // 广度优先偏好：在当前界面的未点击元素中，取全局最早发现的那个
                let candidate = state
                    .discovery_order
                    .iter()
                    .filter(|key| !state.tapped.contains(*key))
                    .find_map(|key| {
                        elements
                            .iter()
                            .find(|el| el.clickable && el.stable_key() == **key)
                    })
                    .cloned();

                if let Some(el) = candidate {
                    let key = el.stable_key();
                    let (x, y) = el.bounds.center();
                    debug!(%key, "点击元素");
                    self.call(self.device.tap(x, y), "tap").await?;
                    state.tapped.insert(key.clone());
                    state.elements_interacted += 1;
                    state.scroll_run = None;
                    state.record(ActionKind::Tap, Some(key));
                    self.pause().await;
                    continue;
                }
            }

            if allowed.scroll && elements.iter().any(|el| el.scrollable) {
                let count = match state.scroll_run {
                    Some((sig, n)) if sig == signature => n,
                    _ => 0,
                };
                if count < self.config.scroll_cap {
                    let (width, height) = self
                        .call(self.device.screen_size(), "screen_size")
                        .await?;
                    let x = width as i32 / 2;
                    // 从下往上滑动，内容向下滚动
                    self.call(
                        self.device.swipe(
                            x,
                            (height as f64 * 0.8) as i32,
                            x,
                            (height as f64 * 0.2) as i32,
                            300,
                        ),
                        "swipe",
                    )
                    .await?;
                    state.scroll_run = Some((signature, count + 1));
                    state.record(ActionKind::Scroll, Some("down".to_string()));
                    self.pause().await;
                    continue;
                }
                debug!(%signature, cap = self.config.scroll_cap, "滚动达到上限，按死路处理");
            }

            // 死路：当前界面已无可尝试的操作
            if !allowed.back {
                debug!(package, "死路且不允许返回，终止探索");
                break TerminalReason::DeadEndExhausted;
            }

            debug!(package, "死路，按返回键");
            self.call(self.device.back(), "back").await?;
            state.record(ActionKind::Back, None);
            if !self.app_in_foreground(package).await? {
                // 已在根界面，返回键把应用退到了后台
                break TerminalReason::DeadEndExhausted;
            }
            self.pause().await;
        };

        let outcome = state.finish(terminal);
        info!(
            package,
            screens = outcome.screens_visited,
            interacted = outcome.elements_interacted,
            actions = outcome.actions.len(),
            terminal = ?outcome.terminal,
            "探索结束"
        );
        Ok(outcome)
    }

    /// 带单步超时的设备调用，超时归为传输层错误
    async fn call<T, F>(&self, fut: F, what: &str) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.config.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::DeviceTimeout(what.to_string())),
        }
    }

    /// 尝试关闭错误弹窗：优先点确认按钮，找不到则按返回键
    async fn dismiss_error_dialog(&self, elements: &[ElementDescriptor]) -> Result<(), AppError> {
        let button = elements.iter().find(|el| {
            el.clickable && DISMISS_LABELS.contains(&el.text.trim().to_lowercase().as_str())
        });

        match button {
            Some(el) => {
                let (x, y) = el.bounds.center();
                debug!(text = %el.text, "点击弹窗按钮");
                self.call(self.device.tap(x, y), "tap").await
            }
            None => {
                debug!("弹窗上未找到确认按钮，按返回键");
                self.call(self.device.back(), "back").await
            }
        }
    }

    async fn app_in_foreground(&self, package: &str) -> Result<bool, AppError> {
        let current = self
            .call(self.device.current_app(), "current_app")
            .await?;
        Ok(current == package)
    }

    async fn pause(&self) {
        if !self.config.action_delay.is_zero() {
            tokio::time::sleep(self.config.action_delay).await;
        }
    }
}

/// 检测界面上是否存在错误弹窗，返回命中的文本
fn detect_error_dialog(elements: &[ElementDescriptor]) -> Option<String> {
    for el in elements {
        let text = el.text.to_lowercase();
        let desc = el.content_desc.to_lowercase();
        for keyword in ERROR_DIALOG_KEYWORDS {
            if text.contains(keyword) || desc.contains(keyword) {
                return Some(if el.text.is_empty() {
                    el.content_desc.clone()
                } else {
                    el.text.clone()
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::element::Bounds;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    const PKG: &str = "com.example.app";

    fn button(id: &str, top: i32) -> ElementDescriptor {
        ElementDescriptor {
            resource_id: id.to_string(),
            class_name: "android.widget.Button".to_string(),
            text: String::new(),
            content_desc: String::new(),
            bounds: Bounds::new(0, top, 100, top + 100),
            clickable: true,
            scrollable: false,
            editable: false,
        }
    }

    fn label(text: &str, top: i32) -> ElementDescriptor {
        ElementDescriptor {
            resource_id: String::new(),
            class_name: "android.widget.TextView".to_string(),
            text: text.to_string(),
            content_desc: String::new(),
            bounds: Bounds::new(0, top, 100, top + 100),
            clickable: false,
            scrollable: false,
            editable: false,
        }
    }

    fn scroller(id: &str) -> ElementDescriptor {
        ElementDescriptor {
            resource_id: id.to_string(),
            class_name: "android.widget.ScrollView".to_string(),
            text: String::new(),
            content_desc: String::new(),
            bounds: Bounds::new(0, 0, 1080, 1920),
            clickable: false,
            scrollable: true,
            editable: false,
        }
    }

    fn edit(id: &str, top: i32) -> ElementDescriptor {
        ElementDescriptor {
            resource_id: id.to_string(),
            class_name: "android.widget.EditText".to_string(),
            text: String::new(),
            content_desc: String::new(),
            bounds: Bounds::new(0, top, 100, top + 100),
            clickable: true,
            scrollable: false,
            editable: true,
        }
    }

    /// 脚本化假设备：按元素中心坐标匹配点击目标，通过迁移表切换界面
    struct FakeDevice {
        screens: Vec<Vec<ElementDescriptor>>,
        current: Mutex<usize>,
        /// (界面下标, 元素稳定标识) -> 目标界面下标
        transitions: HashMap<(usize, String), usize>,
        /// 返回键的界面迁移；无表项时应用退到后台
        back_map: HashMap<usize, usize>,
        foreground: Mutex<String>,
        taps: Mutex<Vec<String>>,
        scrolls: AtomicU32,
        backs: AtomicU32,
        cancel_on_tap: Option<CancelFlag>,
        snapshot_delay: Option<Duration>,
    }

    impl FakeDevice {
        fn new(screens: Vec<Vec<ElementDescriptor>>) -> Self {
            Self {
                screens,
                current: Mutex::new(0),
                transitions: HashMap::new(),
                back_map: HashMap::new(),
                foreground: Mutex::new(PKG.to_string()),
                taps: Mutex::new(Vec::new()),
                scrolls: AtomicU32::new(0),
                backs: AtomicU32::new(0),
                cancel_on_tap: None,
                snapshot_delay: None,
            }
        }

        fn with_transition(mut self, from: usize, key: &str, to: usize) -> Self {
            self.transitions.insert((from, key.to_string()), to);
            self
        }

        fn with_back(mut self, from: usize, to: usize) -> Self {
            self.back_map.insert(from, to);
            self
        }

        fn with_cancel_on_tap(mut self, flag: CancelFlag) -> Self {
            self.cancel_on_tap = Some(flag);
            self
        }

        fn with_snapshot_delay(mut self, delay: Duration) -> Self {
            self.snapshot_delay = Some(delay);
            self
        }

        fn tapped_keys(&self) -> Vec<String> {
            self.taps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn serial(&self) -> &str {
            "fake-0001"
        }

        async fn is_connected(&self) -> bool {
            true
        }

        async fn launch_app(&self, _package: &str, _activity: Option<&str>) -> Result<(), AppError> {
            Ok(())
        }

        async fn stop_app(&self, _package: &str) -> Result<(), AppError> {
            Ok(())
        }

        async fn current_app(&self) -> Result<String, AppError> {
            Ok(self.foreground.lock().unwrap().clone())
        }

        async fn snapshot(&self) -> Result<Vec<ElementDescriptor>, AppError> {
            if let Some(delay) = self.snapshot_delay {
                tokio::time::sleep(delay).await;
            }
            let idx = *self.current.lock().unwrap();
            Ok(self.screens[idx].clone())
        }

        async fn tap(&self, x: i32, y: i32) -> Result<(), AppError> {
            let idx = *self.current.lock().unwrap();
            let target = self.screens[idx]
                .iter()
                .find(|el| el.bounds.center() == (x, y))
                .map(|el| el.stable_key());

            if let Some(key) = target {
                self.taps.lock().unwrap().push(key.clone());
                if let Some(next) = self.transitions.get(&(idx, key)) {
                    *self.current.lock().unwrap() = *next;
                }
            }
            if let Some(flag) = &self.cancel_on_tap {
                flag.cancel();
            }
            Ok(())
        }

        async fn swipe(&self, _: i32, _: i32, _: i32, _: i32, _: u32) -> Result<(), AppError> {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn input_text(&self, _text: &str) -> Result<(), AppError> {
            Ok(())
        }

        async fn back(&self) -> Result<(), AppError> {
            self.backs.fetch_add(1, Ordering::SeqCst);
            let idx = *self.current.lock().unwrap();
            match self.back_map.get(&idx) {
                Some(next) => *self.current.lock().unwrap() = *next,
                None => *self.foreground.lock().unwrap() = "com.android.launcher".to_string(),
            }
            Ok(())
        }

        async fn screen_size(&self) -> Result<(u32, u32), AppError> {
            Ok((1080, 1920))
        }

        async fn capture_screenshot(&self, path: &Path) -> Result<PathBuf, AppError> {
            Ok(path.to_path_buf())
        }
    }

    fn fast_config() -> ExplorerConfig {
        ExplorerConfig {
            step_timeout: Duration::from_secs(1),
            action_delay: Duration::ZERO,
            scroll_cap: 3,
            input_text_value: "test input".to_string(),
        }
    }

    fn explorer(device: FakeDevice) -> Explorer {
        Explorer::new(Arc::new(device), fast_config(), CancelFlag::new())
    }

    #[tokio::test]
    async fn test_dead_end_without_back_terminates_immediately() {
        // 空界面且禁止返回键，应在一步之内以死路终止
        let device = FakeDevice::new(vec![vec![label("静态内容", 0)]]);
        let outcome = explorer(device)
            .explore(PKG, Duration::from_secs(30), ActionSet::from_kinds(&[ActionKind::Tap]))
            .await
            .unwrap();

        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.screens_visited, 1);
    }

    #[tokio::test]
    async fn test_taps_all_elements_and_counts_screens() {
        let device = FakeDevice::new(vec![
            vec![button("id/a", 0)],
            vec![button("id/b", 0)],
        ])
        .with_transition(0, "id/a", 1)
        .with_back(1, 0);

        let dev_ref = Arc::new(device);
        let engine = Explorer::new(Arc::clone(&dev_ref) as Arc<dyn Device>, fast_config(), CancelFlag::new());
        let outcome = engine
            .explore(PKG, Duration::from_secs(30), ActionSet::default())
            .await
            .unwrap();

        // 两个界面都被访问，两个按钮各点击一次，最终返回键退出应用
        assert_eq!(outcome.screens_visited, 2);
        assert_eq!(outcome.elements_interacted, 2);
        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
        assert_eq!(dev_ref.tapped_keys(), vec!["id/a".to_string(), "id/b".to_string()]);

        // 第一次点击切换了界面，应回填结果指纹
        assert_eq!(outcome.actions[0].kind, ActionKind::Tap);
        assert!(outcome.actions[0].resulting_signature.is_some());
    }

    #[tokio::test]
    async fn test_breadth_first_prefers_earlier_discovered() {
        // 界面 0 上先发现 a、b；点击 a 进入界面 1（含 b 和新元素 c）。
        // 下一次点击应优先选更早发现的 b，而不是钻进 c。
        let device = FakeDevice::new(vec![
            vec![button("id/a", 0), button("id/b", 200)],
            vec![button("id/c", 400), button("id/b", 200)],
        ])
        .with_transition(0, "id/a", 1);

        let dev_ref = Arc::new(device);
        let engine = Explorer::new(Arc::clone(&dev_ref) as Arc<dyn Device>, fast_config(), CancelFlag::new());
        let outcome = engine
            .explore(
                PKG,
                Duration::from_secs(30),
                ActionSet::from_kinds(&[ActionKind::Tap]),
            )
            .await
            .unwrap();

        assert_eq!(
            dev_ref.tapped_keys(),
            vec!["id/a".to_string(), "id/b".to_string(), "id/c".to_string()]
        );
        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
    }

    #[tokio::test]
    async fn test_scroll_cap_falls_through_to_dead_end() {
        // 无限滚动界面：指纹不变化，滚动到上限后应落入死路处理而不是永远滚下去
        let device = FakeDevice::new(vec![vec![scroller("id/list")]]);

        let dev_ref = Arc::new(device);
        let engine = Explorer::new(Arc::clone(&dev_ref) as Arc<dyn Device>, fast_config(), CancelFlag::new());
        let outcome = engine
            .explore(
                PKG,
                Duration::from_secs(30),
                ActionSet::from_kinds(&[ActionKind::Scroll, ActionKind::Back]),
            )
            .await
            .unwrap();

        assert_eq!(dev_ref.scrolls.load(Ordering::SeqCst), 3);
        assert_eq!(dev_ref.backs.load(Ordering::SeqCst), 1);
        // 返回键把应用退到了后台
        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
        let scroll_actions = outcome
            .actions
            .iter()
            .filter(|a| a.kind == ActionKind::Scroll)
            .count();
        assert_eq!(scroll_actions, 3);
    }

    #[tokio::test]
    async fn test_text_input_filled_once_per_element() {
        let device = FakeDevice::new(vec![vec![edit("id/field", 0), button("id/submit", 200)]]);

        let dev_ref = Arc::new(device);
        let engine = Explorer::new(Arc::clone(&dev_ref) as Arc<dyn Device>, fast_config(), CancelFlag::new());
        let outcome = engine
            .explore(
                PKG,
                Duration::from_secs(30),
                ActionSet::from_kinds(&[ActionKind::TextInput, ActionKind::Tap]),
            )
            .await
            .unwrap();

        // 输入框只填充一次，随后点击按钮，再无操作可做后死路终止
        let inputs = outcome
            .actions
            .iter()
            .filter(|a| a.kind == ActionKind::TextInput)
            .count();
        assert_eq!(inputs, 1);
        assert_eq!(outcome.actions[0].kind, ActionKind::TextInput);
        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
    }

    #[tokio::test]
    async fn test_cancellation_preserves_partial_records() {
        let cancel = CancelFlag::new();
        let device = FakeDevice::new(vec![vec![button("id/a", 0), button("id/b", 200)]])
            .with_cancel_on_tap(cancel.clone());

        let engine = Explorer::new(Arc::new(device), fast_config(), cancel);
        let outcome = engine
            .explore(PKG, Duration::from_secs(30), ActionSet::default())
            .await
            .unwrap();

        assert_eq!(outcome.terminal, TerminalReason::Cancelled);
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].kind, ActionKind::Tap);
    }

    #[tokio::test]
    async fn test_error_dialog_terminates_after_failed_dismissal() {
        // 弹窗点击确定后仍然存在，第二次检测到即以错误终止
        let device = FakeDevice::new(vec![vec![
            label("Unfortunately, Example has stopped.", 0),
            {
                let mut ok = button("id/ok", 200);
                ok.text = "OK".to_string();
                ok
            },
        ]]);

        let outcome = explorer(device)
            .explore(PKG, Duration::from_secs(30), ActionSet::default())
            .await
            .unwrap();

        assert_eq!(outcome.terminal, TerminalReason::ErrorDetected);
        assert!(!outcome.ui_errors.is_empty());
        assert!(outcome.ui_errors[0].message.contains("has stopped"));
    }

    #[tokio::test]
    async fn test_error_dialog_dismissed_then_exploration_continues() {
        // 点击确定后弹窗消失，探索应继续而不是终止
        let dialog = vec![
            label("Unfortunately, Example has stopped.", 0),
            {
                let mut ok = button("id/ok", 200);
                ok.text = "OK".to_string();
                ok
            },
        ];
        let normal = vec![button("id/next", 0)];
        let device = FakeDevice::new(vec![dialog, normal]).with_transition(0, "id/ok", 1);

        let dev_ref = Arc::new(device);
        let engine = Explorer::new(Arc::clone(&dev_ref) as Arc<dyn Device>, fast_config(), CancelFlag::new());
        let outcome = engine
            .explore(
                PKG,
                Duration::from_secs(30),
                ActionSet::from_kinds(&[ActionKind::Tap]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.ui_errors.len(), 1);
        assert_eq!(outcome.terminal, TerminalReason::DeadEndExhausted);
        assert!(dev_ref.tapped_keys().contains(&"id/next".to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_timeout_surfaces_transport_error() {
        let device = FakeDevice::new(vec![vec![button("id/a", 0)]])
            .with_snapshot_delay(Duration::from_millis(100));

        let config = ExplorerConfig {
            step_timeout: Duration::from_millis(10),
            ..fast_config()
        };
        let engine = Explorer::new(Arc::new(device), config, CancelFlag::new());
        let err = engine
            .explore(PKG, Duration::from_secs(30), ActionSet::default())
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(matches!(err, AppError::DeviceTimeout(_)));
    }

    #[tokio::test]
    async fn test_budget_expiry_terminates_with_duration_expired() {
        // 按钮不改变界面，操作循环会一直进行到预算耗尽
        let device = FakeDevice::new(vec![vec![scroller("id/list"), button("id/a", 0)]])
            .with_back(0, 0);

        let config = ExplorerConfig {
            scroll_cap: u32::MAX,
            ..fast_config()
        };
        let engine = Explorer::new(Arc::new(device), config, CancelFlag::new());
        let outcome = engine
            .explore(PKG, Duration::from_millis(200), ActionSet::default())
            .await
            .unwrap();

        assert_eq!(outcome.terminal, TerminalReason::DurationExpired);
        assert!(!outcome.actions.is_empty());
    }
}
