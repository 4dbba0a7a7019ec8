//! Native locators rebuilt from tree elements.

use crate::accessibility::AccessibilityElement;

/// A W3C locator strategy plus its selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub using: &'static str,
    pub value: String,
}

pub const XPATH: &str = "xpath";
pub const IOS_PREDICATE: &str = "-ios predicate string";

/// `//class[@resource-id="…" and @text="…" and @content-desc="…" and @bounds="…"]`,
/// with only the attributes the element has.
pub fn uiautomator2_xpath(element: &AccessibilityElement) -> Locator {
    let class = element
        .android_class
        .as_deref()
        .or(element.element_type.as_deref())
        .filter(|class| !class.is_empty())
        .unwrap_or("*");

    let conditions: Vec<String> = [
        ("resource-id", &element.android_resource_id),
        ("text", &element.android_text),
        ("content-desc", &element.android_content_desc),
        ("bounds", &element.android_bounds),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(|value| format!("@{}={}", name, xpath_literal(value)))
    })
    .collect();

    let mut xpath = format!("//{}", class);
    if !conditions.is_empty() {
        xpath.push('[');
        xpath.push_str(&conditions.join(" and "));
        xpath.push(']');
    }

    Locator {
        using: XPATH,
        value: xpath,
    }
}

/// `type == "…" AND name == "…" AND value == "…" AND label == "…"`, with only the
/// attributes the element has.
pub fn xcuitest_predicate(element: &AccessibilityElement) -> Locator {
    let mut conditions = vec![format!(
        "type == {}",
        predicate_literal(element.element_type.as_deref().unwrap_or_default())
    )];

    for (name, value) in [
        ("name", &element.name),
        ("value", &element.value),
        ("label", &element.label),
    ] {
        if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
            conditions.push(format!("{} == {}", name, predicate_literal(value)));
        }
    }

    Locator {
        using: IOS_PREDICATE,
        value: conditions.join(" AND "),
    }
}

/// XPath 1.0 has no escapes inside string literals, so values holding both quote
/// kinds are spelled with `concat()`.
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    if !value.contains('\'') {
        return format!("'{}'", value);
    }

    let parts: Vec<String> = value
        .split('"')
        .map(|part| format!("\"{}\"", part))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

fn predicate_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
