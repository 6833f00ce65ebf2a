// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 规范化URL，作为去重与缓存的键
///
/// 协议和主机小写、去掉默认端口（由 `url` 完成），去掉片段，
/// 非根路径去掉末尾的 `/`。
pub fn normalize_url(raw: &str) -> Result<String, ParseError> {
    let mut url = Url::parse(raw.trim())?;
    Ok(normalize_parsed(&mut url))
}

/// 对已解析的URL做同样的规范化
pub fn normalize_parsed(url: &mut Url) -> String {
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

/// 是否是可以抓取的 http/https 地址
pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_url() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        let path = "http://t.co/c";
        assert_eq!(resolve_url(&base, path).unwrap().as_str(), "http://t.co/c");
    }

    #[test]
    fn test_resolve_root_relative_url() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        assert_eq!(
            resolve_url(&base, "/c").unwrap().as_str(),
            "http://example.com/c"
        );
    }

    #[test]
    fn test_resolve_relative_url() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        assert_eq!(
            resolve_url(&base, "c").unwrap().as_str(),
            "http://example.com/a/c"
        );
    }

    #[test]
    fn test_normalize_collapses_equivalent_forms() {
        let expected = "https://example.com/esg";
        for raw in [
            "https://example.com/esg",
            "HTTPS://Example.COM/esg/",
            "https://example.com:443/esg#report",
        ] {
            assert_eq!(normalize_url(raw).unwrap(), expected, "input: {}", raw);
        }
    }

    #[test]
    fn test_normalize_keeps_root_and_query() {
        assert_eq!(
            normalize_url("http://example.com").unwrap(),
            "http://example.com/"
        );
        assert_eq!(
            normalize_url("http://example.com/a/?page=2").unwrap(),
            "http://example.com/a?page=2"
        );
    }
}
