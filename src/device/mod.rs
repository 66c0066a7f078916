//! 设备传输模块
//!
//! 定义设备抽象接口，并提供基于 adb 的真实设备实现。
//! 核心引擎只依赖 [`Device`] trait，测试中可替换为脚本化实现。

pub mod adb_device;
pub mod hierarchy;
pub mod traits;

pub use adb_device::AdbDevice;
pub use traits::Device;
