//! Response message catalog.
//!
//! Only the handful of messages the API itself emits are localised. The
//! locale comes from `Accept-Language`, falling back to the configured
//! default.

use axum::http::{header, HeaderMap};
use serde::Deserialize;

/// Supported response languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Simplified Chinese.
    Zh,
}

/// Catalog keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    ValidationFailed,
    QueryFailed,
    Unauthorized,
    BadRequest,
    Internal,
}

impl Locale {
    /// Match a language tag such as `zh-CN` or `en_US` on its primary subtag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    /// First supported language in `Accept-Language`, in listed order.
    ///
    /// Quality weights are not ranked; clients list their preference first.
    pub fn negotiate(headers: &HeaderMap, default: Locale) -> Self {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| {
                raw.split(',')
                    .filter_map(|entry| entry.split(';').next())
                    .find_map(Self::from_tag)
            })
            .unwrap_or(default)
    }

    /// Catalog lookup.
    pub fn message(self, key: MessageKey) -> &'static str {
        match (self, key) {
            (Self::En, MessageKey::ValidationFailed) => "Parameter validation failed",
            (Self::En, MessageKey::QueryFailed) => "Query failed",
            (Self::En, MessageKey::Unauthorized) => "Unauthorized",
            (Self::En, MessageKey::BadRequest) => "Malformed request",
            (Self::En, MessageKey::Internal) => "An internal error occurred",
            (Self::Zh, MessageKey::ValidationFailed) => "参数验证失败",
            (Self::Zh, MessageKey::QueryFailed) => "查询失败",
            (Self::Zh, MessageKey::Unauthorized) => "未授权",
            (Self::Zh, MessageKey::BadRequest) => "请求格式错误",
            (Self::Zh, MessageKey::Internal) => "服务器内部错误",
        }
    }
}
