use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::AppError;
use crate::explorer::element::ElementDescriptor;

/// 设备抽象 trait，定义测试所需的设备操作接口
///
/// 核心引擎只依赖该接口，不关心底层传输实现，测试中可替换为脚本化的假设备。
#[async_trait]
pub trait Device: Send + Sync {
    /// 获取设备序列号
    fn serial(&self) -> &str;

    /// 检查设备是否仍然连接
    async fn is_connected(&self) -> bool;

    /// 启动应用
    async fn launch_app(&self, package: &str, activity: Option<&str>) -> Result<(), AppError>;

    /// 强制停止应用
    async fn stop_app(&self, package: &str) -> Result<(), AppError>;

    /// 获取当前前台应用包名
    async fn current_app(&self) -> Result<String, AppError>;

    /// 截取当前界面快照，返回全部元素描述
    async fn snapshot(&self) -> Result<Vec<ElementDescriptor>, AppError>;

    /// 发送点击事件
    async fn tap(&self, x: i32, y: i32) -> Result<(), AppError>;

    /// 发送滑动事件
    async fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    ) -> Result<(), AppError>;

    /// 输入文本（需要焦点已在输入框上）
    async fn input_text(&self, text: &str) -> Result<(), AppError>;

    /// 按下返回键
    async fn back(&self) -> Result<(), AppError>;

    /// 获取屏幕尺寸 (宽度, 高度)
    async fn screen_size(&self) -> Result<(u32, u32), AppError>;

    /// 截图并保存到指定路径，返回产物路径
    async fn capture_screenshot(&self, path: &Path) -> Result<PathBuf, AppError>;
}
