//! Regex extraction over a document's text.

use regex::Regex;
use scraper::{Html, Node};

use crate::error::Result;
use crate::models::{RawItem, TextExtractorConfig};
use crate::services::fetcher::RawPage;

/// One item per match of `pattern`; named groups become fields.
pub struct TextExtractor {
    pattern: Regex,
    link: Option<Regex>,
    squash: Option<Regex>,
    html: bool,
}

impl TextExtractor {
    pub fn new(config: &TextExtractorConfig) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&config.pattern)?,
            link: config.link_pattern.as_deref().map(Regex::new).transpose()?,
            squash: config.squash_pattern.as_deref().map(Regex::new).transpose()?,
            html: config.html,
        })
    }

    fn prepare(&self, body: &str) -> String {
        let text = if self.html {
            visible_text(body)
        } else {
            body.to_string()
        };
        match &self.squash {
            Some(re) => re.replace_all(&text, "").into_owned(),
            None => text,
        }
    }
}

impl super::Extractor for TextExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<Result<RawItem>>> {
        let text = self.prepare(&page.body);
        let mut items = Vec::new();

        for caps in self.pattern.captures_iter(&text) {
            let mut item = RawItem::new();
            for name in self.pattern.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    item.insert(name.to_string(), m.as_str().to_string());
                }
            }

            if let (Some(re), Some(whole)) = (&self.link, caps.get(0)) {
                if let Some(m) = re.find(&text[whole.end()..]) {
                    item.entry("link".to_string()).or_insert_with(|| m.as_str().to_string());
                }
            }
            items.push(Ok(item));
        }

        Ok(items)
    }
}

/// Text nodes of an HTML document, skipping scripts and styles.
fn visible_text(body: &str) -> String {
    let document = Html::parse_document(body);
    let mut out = String::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| matches!(e.name(), "script" | "style")))
            .unwrap_or(false);
        if !hidden {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::extract::Extractor;

    fn config(pattern: &str) -> TextExtractorConfig {
        TextExtractorConfig {
            pattern: pattern.into(),
            link_pattern: None,
            squash_pattern: None,
            html: true,
        }
    }

    fn page(body: &str) -> RawPage {
        RawPage {
            url: "https://example.com/doc".into(),
            page: None,
            body: body.into(),
        }
    }

    #[test]
    fn test_named_groups_become_fields() {
        let extractor =
            TextExtractor::new(&config(r"《(?P<title>[^》]+)》第(?P<episode>\d+)集")).unwrap();
        let html = "<p>《仙逆》第5集</p><script>var x='《假》第9集';</script><p>《遮天》第12集</p>";
        let items = extractor.extract(&page(html)).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap()["title"], "仙逆");
        assert_eq!(items[1].as_ref().unwrap()["episode"], "12");
    }

    #[test]
    fn test_squash_and_link() {
        let mut cfg = config(r"(?P<title>\S+)更新至(?P<episode>\d+)");
        cfg.html = false;
        cfg.squash_pattern = Some(r"[\u{200b}\s]+".into());
        cfg.link_pattern = Some(r"https://pan\.example\.com/s/\w+".into());
        let extractor = TextExtractor::new(&cfg).unwrap();

        let body = "斗破\u{200b}苍穹 更新至 7\nhttps://pan.example.com/s/abc";
        let items = extractor.extract(&page(body)).unwrap();
        let item = items[0].as_ref().unwrap();
        assert_eq!(item["title"], "斗破苍穹");
        assert_eq!(item["episode"], "7");
        assert_eq!(item["link"], "https://pan.example.com/s/abc");
    }
}
