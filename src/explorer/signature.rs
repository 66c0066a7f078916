use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::element::ElementDescriptor;

/// 界面指纹
///
/// 由当前界面的可交互元素集合派生，用于判定界面是否已访问过。
/// 同一布局无论元素顺序如何，都必须得到相同指纹。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSignature(pub u64);

impl ScreenSignature {
    /// 从界面快照计算指纹
    ///
    /// 规则：
    /// - 只纳入可交互元素，静态文本/装饰元素不参与；
    /// - 每个元素的贡献为稳定标识加交互标志位，不含显示文本，
    ///   避免时钟、计数器、广告等易变内容造成"新界面"误判；
    /// - 先按词法排序再哈希，渲染顺序变化不影响结果。
    pub fn derive(elements: &[ElementDescriptor]) -> Self {
        let mut tokens: Vec<String> = elements
            .iter()
            .filter(|el| el.is_interactive())
            .map(|el| {
                format!(
                    "{}#{}{}{}",
                    el.stable_key(),
                    el.clickable as u8,
                    el.scrollable as u8,
                    el.editable as u8
                )
            })
            .collect();
        tokens.sort();

        let mut hasher = DefaultHasher::new();
        tokens.hash(&mut hasher);
        ScreenSignature(hasher.finish())
    }
}

impl std::fmt::Display for ScreenSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
