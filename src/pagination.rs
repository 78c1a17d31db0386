//! Page/limit normalization and the metadata derived from a count.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Raw query string values. Kept as strings so garbage input normalizes
/// instead of being rejected by the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub items_per_page: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// Leading integer of `raw`: `"2.5"` reads as 2 and `"12abc"` as 12.
/// Digit runs too long for `i64` saturate instead of being rejected.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    let value = match digits.parse::<i64>() {
        Ok(v) if negative => -v,
        Ok(v) => v,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    };
    Some(value)
}

fn positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(leading_int).filter(|v| *v >= 1)
}

pub fn normalize(raw_page: Option<&str>, raw_limit: Option<&str>) -> PageParams {
    let page = positive(raw_page).unwrap_or(DEFAULT_PAGE);
    let limit = positive(raw_limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    PageParams { page, limit }
}

impl PageQuery {
    pub fn normalize(&self) -> PageParams {
        normalize(self.page.as_deref(), self.limit.as_deref())
    }
}

pub fn skip(page: i64, limit: i64) -> i64 {
    (page - 1).saturating_mul(limit)
}

pub fn metadata(page: i64, limit: i64, total_items: i64) -> PaginationMeta {
    let total_pages = if limit > 0 {
        total_items / limit + i64::from(total_items % limit != 0)
    } else {
        0
    }
    .max(1);

    PaginationMeta {
        current_page: page,
        total_pages,
        total_items,
        items_per_page: limit,
        has_next_page: page < total_pages,
        has_previous_page: page > 1,
    }
}
