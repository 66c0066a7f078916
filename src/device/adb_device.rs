use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::explorer::element::ElementDescriptor;

use super::hierarchy::parse_hierarchy;
use super::traits::Device;

/// 设备端界面层级 dump 的临时文件路径
const DUMP_REMOTE_PATH: &str = "/sdcard/apptester_ui_dump.xml";

/// KEYCODE_BACK
const KEYCODE_BACK: u32 = 4;

/// 通过 adb 命令驱动的真实设备
///
/// 所有操作都通过 `adb -s <serial> …` 子进程完成；每次调用带统一的
/// 命令超时，避免单个卡死的 adb 调用吞掉整个时间预算。
pub struct AdbDevice {
    serial: String,
    command_timeout: Duration,
}

impl AdbDevice {
    pub fn new(serial: String) -> Self {
        Self {
            serial,
            command_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 执行 adb 命令并返回标准输出（字节）
    async fn run_adb(&self, args: &[&str]) -> Result<Vec<u8>, AppError> {
        debug!(serial = %self.serial, ?args, "执行 adb 命令");

        let mut cmd = tokio::process::Command::new("adb");
        cmd.args(["-s", &self.serial]).args(args);

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| AppError::DeviceTimeout(format!("adb {}", args.join(" "))))?
            .map_err(|e| AppError::AdbError(format!("执行命令失败: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::AdbError(format!(
                "命令执行失败: adb {} ({})",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    /// 执行 adb shell 命令并返回文本输出
    async fn adb_shell(&self, command: &[&str]) -> Result<String, AppError> {
        let mut args = vec!["shell"];
        args.extend_from_slice(command);
        let stdout = self.run_adb(&args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// 解析 `wm size` 的输出
    ///
    /// 优先使用 Override size（应用看到的逻辑分辨率），否则取 Physical size。
    fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
        for prefix in ["Override size:", "Physical size:"] {
            for line in output.lines() {
                if let Some(size_part) = line.split(prefix).nth(1) {
                    let size_str = size_part.trim();
                    if let Some((w, h)) = size_str.split_once('x') {
                        if let (Ok(width), Ok(height)) =
                            (w.trim().parse::<u32>(), h.trim().parse::<u32>())
                        {
                            if width > 0 && height > 0 {
                                return Some((width, height));
                            }
                        }
                    }
                }
            }
        }
        None
    }

    /// 从 `dumpsys window` 输出中解析前台应用包名
    ///
    /// 格式: "mCurrentFocus=Window{... u0 com.package.name/com.activity.Name}"
    fn parse_foreground_package(output: &str) -> Option<String> {
        for line in output.lines() {
            if !line.contains("mCurrentFocus") && !line.contains("mFocusedApp") {
                continue;
            }
            let tail = line.rsplit(' ').next()?;
            let tail = tail.trim_end_matches('}');
            if let Some((package, _activity)) = tail.split_once('/') {
                return Some(package.to_string());
            }
        }
        None
    }

    /// 转义 `input text` 的特殊字符
    fn escape_input_text(text: &str) -> String {
        text.replace(' ', "%s")
            .replace('&', "\\&")
            .replace('(', "\\(")
            .replace(')', "\\)")
            .replace(';', "\\;")
            .replace('|', "\\|")
            .replace('<', "\\<")
            .replace('>', "\\>")
    }
}

#[async_trait]
impl Device for AdbDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn is_connected(&self) -> bool {
        match self.adb_shell(&["echo", "ping"]).await {
            Ok(out) => out == "ping",
            Err(_) => false,
        }
    }

    async fn launch_app(&self, package: &str, activity: Option<&str>) -> Result<(), AppError> {
        info!(package, "启动应用");

        match activity {
            Some(activity) => {
                let component = if activity.starts_with('.') {
                    format!("{}/{}{}", package, package, activity)
                } else {
                    format!("{}/{}", package, activity)
                };
                self.adb_shell(&["am", "start", "-n", &component]).await?;
            }
            None => {
                // 未配置 Activity 时用 monkey 发送 LAUNCHER intent
                self.adb_shell(&[
                    "monkey",
                    "-p",
                    package,
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ])
                .await?;
            }
        }

        Ok(())
    }

    async fn stop_app(&self, package: &str) -> Result<(), AppError> {
        info!(package, "强制停止应用");
        self.adb_shell(&["am", "force-stop", package]).await?;
        Ok(())
    }

    async fn current_app(&self) -> Result<String, AppError> {
        let output = self.adb_shell(&["dumpsys", "window", "windows"]).await?;
        Self::parse_foreground_package(&output)
            .ok_or_else(|| AppError::AdbError("无法解析当前应用包名".to_string()))
    }

    async fn snapshot(&self) -> Result<Vec<ElementDescriptor>, AppError> {
        // uiautomator 把层级写到设备端文件，再读回解析
        self.adb_shell(&["uiautomator", "dump", DUMP_REMOTE_PATH])
            .await?;
        let xml = self.adb_shell(&["cat", DUMP_REMOTE_PATH]).await?;

        if xml.is_empty() {
            return Err(AppError::HierarchyParseError(
                "界面层级 dump 为空".to_string(),
            ));
        }

        Ok(parse_hierarchy(&xml))
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), AppError> {
        debug!(x, y, "执行点击");
        self.adb_shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await?;
        Ok(())
    }

    async fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    ) -> Result<(), AppError> {
        debug!(start_x, start_y, end_x, end_y, duration_ms, "执行滑动");
        self.adb_shell(&[
            "input",
            "swipe",
            &start_x.to_string(),
            &start_y.to_string(),
            &end_x.to_string(),
            &end_y.to_string(),
            &duration_ms.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn input_text(&self, text: &str) -> Result<(), AppError> {
        debug!(text, "输入文本");
        let escaped = Self::escape_input_text(text);
        self.adb_shell(&["input", "text", &escaped]).await?;
        Ok(())
    }

    async fn back(&self) -> Result<(), AppError> {
        debug!("按下返回键");
        self.adb_shell(&["input", "keyevent", &KEYCODE_BACK.to_string()])
            .await?;
        Ok(())
    }

    async fn screen_size(&self) -> Result<(u32, u32), AppError> {
        let output = self.adb_shell(&["wm", "size"]).await?;
        Self::parse_screen_size(&output)
            .ok_or_else(|| AppError::AdbError(format!("无法解析屏幕尺寸: {}", output)))
    }

    async fn capture_screenshot(&self, path: &Path) -> Result<PathBuf, AppError> {
        debug!(path = %path.display(), "截取屏幕");

        let png = self.run_adb(&["exec-out", "screencap", "-p"]).await?;
        if png.is_empty() {
            return Err(AppError::AdbError("截图输出为空".to_string()));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "创建截图目录失败");
            }
        }
        tokio::fs::write(path, &png).await?;

        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_screen_size_prefers_override() {
        let output = "Physical size: 1440x3200\nOverride size: 1080x2400";
        assert_eq!(AdbDevice::parse_screen_size(output), Some((1080, 2400)));
    }

    #[test]
    fn test_parse_screen_size_physical_only() {
        let output = "Physical size: 1440x3200";
        assert_eq!(AdbDevice::parse_screen_size(output), Some((1440, 3200)));
    }

    #[test]
    fn test_parse_screen_size_invalid() {
        assert_eq!(AdbDevice::parse_screen_size("garbage"), None);
    }

    #[test]
    fn test_parse_foreground_package() {
        let output =
            "  mCurrentFocus=Window{1a2b3c u0 com.example.app/com.example.app.MainActivity}";
        assert_eq!(
            AdbDevice::parse_foreground_package(output),
            Some("com.example.app".to_string())
        );
    }

    #[test]
    fn test_parse_foreground_package_missing() {
        assert_eq!(AdbDevice::parse_foreground_package("no focus here"), None);
    }

    #[test]
    fn test_escape_input_text() {
        assert_eq!(AdbDevice::escape_input_text("hello world"), "hello%sworld");
        assert_eq!(AdbDevice::escape_input_text("a&b"), "a\\&b");
    }
}
