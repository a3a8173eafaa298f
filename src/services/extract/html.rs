//! CSS-selector extraction for HTML list pages.

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{HtmlExtractorConfig, RawItem};
use crate::services::fetcher::RawPage;
use crate::utils::resolve_url;

/// Extracts one item per row matched by `row_selector`.
pub struct HtmlExtractor {
    row: Selector,
    fields: Vec<(String, Selector)>,
    link: Option<Selector>,
    link_attr: String,
}

impl HtmlExtractor {
    /// Compile every selector up front so a typo fails at startup.
    pub fn new(config: &HtmlExtractorConfig) -> Result<Self> {
        let fields = config
            .fields
            .iter()
            .map(|(name, sel)| Ok((name.clone(), parse_selector(sel)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            row: parse_selector(&config.row_selector)?,
            fields,
            link: config.link_selector.as_deref().map(parse_selector).transpose()?,
            link_attr: config.link_attr.clone(),
        })
    }

    fn parse_row(&self, row: &ElementRef, base_url: Option<&url::Url>) -> RawItem {
        let mut item = RawItem::new();
        let mut title_elem = None;
        let mut first_match = None;

        for (name, sel) in &self.fields {
            if let Some(elem) = row.select(sel).next() {
                first_match.get_or_insert(elem);
                if name == "title" {
                    title_elem = Some(elem);
                }
                item.insert(name.clone(), elem.text().collect());
            }
        }

        let link_elem = match &self.link {
            Some(sel) => row.select(sel).next(),
            None => title_elem.or(first_match),
        };
        if let Some(href) = link_elem.and_then(|e| e.value().attr(&self.link_attr)) {
            let link = match base_url {
                Some(base) => resolve_url(base, href),
                None => href.to_string(),
            };
            item.entry("link".to_string()).or_insert(link);
        }

        item
    }
}

impl super::Extractor for HtmlExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<Result<RawItem>>> {
        let document = Html::parse_document(&page.body);
        let base_url = url::Url::parse(&page.url).ok();

        Ok(document
            .select(&self.row)
            .map(|row| Ok(self.parse_row(&row, base_url.as_ref())))
            .collect())
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
