//! Storefront UI settings per variant.

use serde::Serialize;

/// Variant served when no decision is available.
pub const DEFAULT_VARIANT: &str = "v1";

/// UI customisation sent to the frontend with the user's variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    pub theme: &'static str,
    pub primary_color: &'static str,
    pub show_discount: bool,
    pub featured_categories: &'static [&'static str],
    pub header_message: &'static str,
}

static V1: UiConfig = UiConfig {
    theme: "default",
    primary_color: "#007bff",
    show_discount: false,
    featured_categories: &["전자제품", "의류", "도서"],
    header_message: "AI Store에 오신 것을 환영합니다!",
};

static V2: UiConfig = UiConfig {
    theme: "modern",
    primary_color: "#28a745",
    show_discount: true,
    featured_categories: &["캠핑", "스포츠", "생활용품"],
    header_message: "🎉 특별 할인 이벤트 진행중!",
};

/// UI settings for `variant`; unknown variants get the default variant's.
#[must_use]
pub fn ui_config(variant: &str) -> &'static UiConfig {
    match variant {
        "v2" => &V2,
        _ => &V1,
    }
}
