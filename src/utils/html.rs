// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use scraper::{Html, Node, Selector};
use std::collections::HashMap;

use crate::domain::models::page::PageLink;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3").unwrap());
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

const INVISIBLE_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// 从HTML中提取的内容
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub title: String,
    pub text: String,
    pub headings: Vec<String>,
    pub meta: HashMap<String, String>,
    pub links: Vec<PageLink>,
}

/// 合并连续空白
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 解析HTML文档
///
/// 正文取 `body` 下所有可见文本节点；没有 `body` 时退化为整个文档。
pub fn parse_document(content: &str) -> ParsedDocument {
    let document = Html::parse_document(content);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let mut fragments: Vec<&str> = Vec::new();
    let root = match document.select(&BODY).next() {
        Some(body) => *body,
        None => document.tree.root(),
    };
    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| INVISIBLE_TAGS.contains(&name) || name == "title");
            if !hidden {
                fragments.push(&**text);
            }
        }
    }
    let text = collapse_whitespace(&fragments.join(" "));

    let headings = document
        .select(&HEADINGS)
        .map(|h| collapse_whitespace(&h.text().collect::<String>()))
        .filter(|h| !h.is_empty())
        .collect();

    let mut meta = HashMap::new();
    for tag in document.select(&META) {
        let element = tag.value();
        let key = element
            .attr("name")
            .or_else(|| element.attr("property"))
            .unwrap_or("");
        if key.is_empty() {
            continue;
        }
        meta.insert(
            key.to_string(),
            element.attr("content").unwrap_or("").to_string(),
        );
    }

    let links = document
        .select(&ANCHORS)
        .filter_map(|a| {
            a.value().attr("href").map(|href| PageLink {
                href: href.trim().to_string(),
                text: collapse_whitespace(&a.text().collect::<String>()),
            })
        })
        .collect();

    ParsedDocument {
        title,
        text,
        headings,
        meta,
        links,
    }
}
