use serde::{Deserialize, Serialize};

/// 元素边界矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// 解析 uiautomator dump 的边界格式 "[0,0][1080,100]"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let inner = s.strip_prefix('[')?;
        let (first, rest) = inner.split_once("][")?;
        let second = rest.strip_suffix(']')?;

        let (l, t) = first.split_once(',')?;
        let (r, b) = second.split_once(',')?;

        Some(Self {
            left: l.trim().parse().ok()?,
            top: t.trim().parse().ok()?,
            right: r.trim().parse().ok()?,
            bottom: b.trim().parse().ok()?,
        })
    }

    /// 元素中心点坐标
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// 是否为空矩形（dump 中无效元素的标记）
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }
}

/// 单个界面元素的不可变快照
///
/// 每次截取界面快照时重新生成，快照之间不共享。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// 资源 ID（可能为空）
    pub resource_id: String,

    /// 控件类名（如 "android.widget.Button"）
    pub class_name: String,

    /// 显示文本
    pub text: String,

    /// 无障碍描述
    pub content_desc: String,

    /// 边界矩形
    pub bounds: Bounds,

    pub clickable: bool,
    pub scrollable: bool,
    pub editable: bool,
}

impl ElementDescriptor {
    /// 元素的稳定标识
    ///
    /// 优先使用资源 ID；ID 为空时退化为类名加边界。
    /// 不使用显示文本，避免时钟、计数器等易变内容破坏去重。
    pub fn stable_key(&self) -> String {
        if self.resource_id.is_empty() {
            format!(
                "{}@[{},{}][{},{}]",
                self.class_name,
                self.bounds.left,
                self.bounds.top,
                self.bounds.right,
                self.bounds.bottom
            )
        } else {
            self.resource_id.clone()
        }
    }

    /// 是否为可交互元素
    pub fn is_interactive(&self) -> bool {
        self.clickable || self.scrollable || self.editable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: &str, class: &str, bounds: Bounds) -> ElementDescriptor {
        ElementDescriptor {
            resource_id: id.to_string(),
            class_name: class.to_string(),
            text: String::new(),
            content_desc: String::new(),
            bounds,
            clickable: true,
            scrollable: false,
            editable: false,
        }
    }

    #[test]
    fn test_parse_bounds() {
        let b = Bounds::parse("[0,0][1080,100]").unwrap();
        assert_eq!(b, Bounds::new(0, 0, 1080, 100));
        assert_eq!(b.center(), (540, 50));
    }

    #[test]
    fn test_parse_bounds_invalid() {
        assert!(Bounds::parse("").is_none());
        assert!(Bounds::parse("[0,0]").is_none());
        assert!(Bounds::parse("[a,b][c,d]").is_none());
    }

    #[test]
    fn test_stable_key_prefers_resource_id() {
        let el = element("com.example:id/btn_ok", "android.widget.Button", Bounds::new(0, 0, 10, 10));
        assert_eq!(el.stable_key(), "com.example:id/btn_ok");
    }

    #[test]
    fn test_stable_key_fallback_to_class_and_bounds() {
        let el = element("", "android.widget.Button", Bounds::new(5, 6, 7, 8));
        assert_eq!(el.stable_key(), "android.widget.Button@[5,6][7,8]");
    }
}
