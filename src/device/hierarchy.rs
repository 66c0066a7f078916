use regex::Regex;
use std::sync::OnceLock;

use crate::explorer::element::{Bounds, ElementDescriptor};

/// 输入框类控件的类名片段（映射为可编辑标志）
const EDITABLE_CLASSES: &[&str] = &[
    "android.widget.EditText",
    "android.widget.AutoCompleteTextView",
    "android.widget.MultiAutoCompleteTextView",
];

fn node_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node[^>]*>").unwrap())
}

fn attr_re(name: &str) -> Regex {
    Regex::new(&format!(r#"{}="([^"]*)""#, regex::escape(name))).unwrap()
}

/// 从 uiautomator dump 的 XML 层级中解析元素列表
///
/// 逐个匹配 `<node …>` 标签并提取属性；边界为空矩形的元素（不可见或
/// 零尺寸）直接丢弃。解析失败的单个节点跳过，不影响整个快照。
pub fn parse_hierarchy(xml: &str) -> Vec<ElementDescriptor> {
    static ATTRS: OnceLock<HierarchyAttrs> = OnceLock::new();
    let attrs = ATTRS.get_or_init(HierarchyAttrs::new);

    let mut elements = Vec::new();

    for m in node_re().find_iter(xml) {
        let node = m.as_str();

        let bounds = match attrs.get(&attrs.bounds, node).and_then(|s| Bounds::parse(&s)) {
            Some(b) if !b.is_empty() => b,
            _ => continue,
        };

        let class_name = attrs.get(&attrs.class, node).unwrap_or_default();
        let editable = EDITABLE_CLASSES.iter().any(|cls| class_name.contains(cls));

        elements.push(ElementDescriptor {
            resource_id: attrs.get(&attrs.resource_id, node).unwrap_or_default(),
            class_name,
            text: attrs.get(&attrs.text, node).map(unescape_xml).unwrap_or_default(),
            content_desc: attrs
                .get(&attrs.content_desc, node)
                .map(unescape_xml)
                .unwrap_or_default(),
            bounds,
            clickable: attrs.get(&attrs.clickable, node).as_deref() == Some("true"),
            scrollable: attrs.get(&attrs.scrollable, node).as_deref() == Some("true"),
            editable,
        });
    }

    elements
}

struct HierarchyAttrs {
    resource_id: Regex,
    class: Regex,
    text: Regex,
    content_desc: Regex,
    bounds: Regex,
    clickable: Regex,
    scrollable: Regex,
}

impl HierarchyAttrs {
    fn new() -> Self {
        Self {
            resource_id: attr_re("resource-id"),
            class: attr_re("class"),
            text: attr_re("text"),
            content_desc: attr_re("content-desc"),
            bounds: attr_re("bounds"),
            clickable: attr_re("clickable"),
            scrollable: attr_re("scrollable"),
        }
    }

    fn get(&self, re: &Regex, node: &str) -> Option<String> {
        re.captures(node)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn unescape_xml(s: String) -> String {
    if !s.contains('&') {
        return s;
    }
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" bounds="[0,0][0,0]" clickable="false" scrollable="false" />
  <node index="1" text="登录" resource-id="com.example:id/btn_login" class="android.widget.Button" content-desc="" bounds="[100,200][500,300]" clickable="true" scrollable="false" />
  <node index="2" text="" resource-id="com.example:id/input_name" class="android.widget.EditText" content-desc="用户名" bounds="[100,400][500,500]" clickable="true" scrollable="false" />
  <node index="3" text="" resource-id="" class="android.widget.ScrollView" content-desc="" bounds="[0,0][1080,1920]" clickable="false" scrollable="true" />
</hierarchy>"#;

    #[test]
    fn test_parse_hierarchy_extracts_elements() {
        let elements = parse_hierarchy(SAMPLE);
        // 空边界的根节点被丢弃
        assert_eq!(elements.len(), 3);

        let login = &elements[0];
        assert_eq!(login.resource_id, "com.example:id/btn_login");
        assert_eq!(login.text, "登录");
        assert!(login.clickable);
        assert!(!login.editable);
        assert_eq!(login.bounds.center(), (300, 250));

        let input = &elements[1];
        assert!(input.editable);
        assert_eq!(input.content_desc, "用户名");

        let list = &elements[2];
        assert!(list.scrollable);
    }

    #[test]
    fn test_parse_hierarchy_empty_input() {
        assert!(parse_hierarchy("").is_empty());
        assert!(parse_hierarchy("<hierarchy></hierarchy>").is_empty());
    }

    #[test]
    fn test_parse_hierarchy_unescapes_entities() {
        let xml = r#"<node text="A &amp; B" resource-id="id/x" class="android.widget.TextView" bounds="[0,0][10,10]" clickable="false" scrollable="false" />"#;
        let elements = parse_hierarchy(xml);
        assert_eq!(elements[0].text, "A & B");
    }
}
