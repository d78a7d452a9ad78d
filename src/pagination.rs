use axum::http::header::{HeaderMap, HeaderValue};
use url::form_urlencoded;

use crate::data::Page;

/// Remove characters that aren't allowed in header values
fn sanitize_resource_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
}

/// Build the `Content-Range` header for a page, e.g. `blogs 0-9/100`.
///
/// An empty page reports `blogs 0-0/0` style bounds rather than underflowing.
#[must_use]
pub fn calculate_content_range(page: &Page, resource_name: &str) -> HeaderMap {
    let offset = page.offset();
    let last = (offset + page.count() as u64)
        .saturating_sub(1)
        .max(offset)
        .min(page.total_count.saturating_sub(1).max(offset));

    let safe_name = sanitize_resource_name(resource_name);
    let content_range = format!("{safe_name} {offset}-{last}/{}", page.total_count);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&content_range) {
        headers.insert("Content-Range", value);
    }
    headers
}

/// Rewrite the `page` parameter of a URL in place, or append it when absent.
/// Every other pair keeps its position, repeated keys included.
#[must_use]
pub fn with_page(path: &str, query: &str, page: u64) -> String {
    let page = page.to_string();
    let mut replaced = false;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key != "page" {
            serializer.append_pair(&key, &value);
        } else if !replaced {
            serializer.append_pair("page", &page);
            replaced = true;
        }
    }
    if !replaced {
        serializer.append_pair("page", &page);
    }
    format!("{path}?{}", serializer.finish())
}

/// Requested page and page size from the query string. Missing or malformed
/// values fall back to page 1 and `default_limit`; the size never exceeds
/// `max_limit`.
#[must_use]
pub fn page_params(
    page: Option<&str>,
    limit: Option<&str>,
    default_limit: u64,
    max_limit: u64,
) -> (u64, u64) {
    let page = page
        .and_then(|p| p.parse::<u64>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(1);
    let limit = limit
        .and_then(|l| l.parse::<u64>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(default_limit)
        .min(max_limit.max(1));
    (page, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Entity, Fields};

    fn page(current_page: u64, per_page: u64, items: usize, total_count: u64) -> Page {
        Page {
            items: vec![Entity::persisted(Fields::new()); items],
            current_page,
            per_page,
            total_count,
        }
    }

    #[test]
    fn test_content_range_normal() {
        let headers = calculate_content_range(&page(1, 10, 10, 100), "users");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert_eq!(value, "users 0-9/100");
    }

    #[test]
    fn test_content_range_last_partial_page() {
        let headers = calculate_content_range(&page(3, 10, 5, 25), "blogs");
        assert_eq!(headers["Content-Range"], "blogs 20-24/25");
    }

    #[test]
    fn test_content_range_empty() {
        let headers = calculate_content_range(&page(1, 10, 0, 0), "blogs");
        assert_eq!(headers["Content-Range"], "blogs 0-0/0");
    }

    #[test]
    fn test_content_range_handles_special_chars_gracefully() {
        let headers = calculate_content_range(&page(1, 10, 10, 100), "users\r\nInjected: evil");
        let value = headers.get("Content-Range").unwrap().to_str().unwrap();
        assert!(!value.contains('\r') && !value.contains('\n'));
        assert!(value.starts_with("usersInjected: evil"));
    }

    #[test]
    fn test_with_page_keeps_other_params() {
        assert_eq!(with_page("/blogs", "page=9&sort=name", 3), "/blogs?page=3&sort=name");
        assert_eq!(with_page("/blogs", "sort=name", 2), "/blogs?sort=name&page=2");
        assert_eq!(with_page("/blogs", "", 1), "/blogs?page=1");
    }

    #[test]
    fn test_with_page_keeps_repeated_keys_in_order() {
        assert_eq!(
            with_page("/blogs", "tag=a&page=9&tag=b&page=4", 2),
            "/blogs?tag=a&page=2&tag=b"
        );
        assert_eq!(with_page("/blogs", "q=a+b%26c", 1), "/blogs?q=a+b%26c&page=1");
    }

    #[test]
    fn test_page_params_defaults() {
        assert_eq!(page_params(None, None, 20, 100), (1, 20));
        assert_eq!(page_params(Some("3"), Some("5"), 20, 100), (3, 5));
        assert_eq!(page_params(Some("0"), Some("abc"), 20, 100), (1, 20));
    }

    #[test]
    fn test_page_params_clamps_to_max_limit() {
        assert_eq!(page_params(None, Some("5000"), 20, 100), (1, 100));
        assert_eq!(page_params(None, None, 500, 100), (1, 100));
        assert_eq!(page_params(None, Some("7"), 20, 0), (1, 1));
    }
}
