//! Source fetcher.
//!
//! Retrieves one source, retrying transport failures and walking pages
//! until the source runs dry or a request cap is reached.

use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Backoff, FetcherConfig, HttpMethod, PagingConfig, SourceConfig};
use crate::services::extract::Extractor;
use crate::utils::http::create_async_client;
use crate::utils::url::with_query;

/// One fetched response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Final request URL, used to resolve relative links
    pub url: String,

    /// Page number for paged sources
    pub page: Option<u32>,

    pub body: String,
}

/// Everything fetched for one source in one run.
#[derive(Debug, Clone, Default)]
pub struct RawPayload {
    pub source_name: String,
    pub pages: Vec<RawPage>,
}

impl RawPayload {
    /// True when no page carried any content.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.body.trim().is_empty())
    }
}

/// HTTP fetcher with bounded retries.
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            config: config.clone(),
        })
    }

    /// Fetch `source`. The extractor is only consulted to count items on
    /// each page of a paged source.
    pub async fn fetch(&self, source: &SourceConfig, extractor: &dyn Extractor) -> Result<RawPayload> {
        let pages = match &source.paging {
            Some(paging) => self.fetch_pages(source, paging, extractor).await?,
            None => {
                let url = with_query(&source.url, fixed_query(source))?;
                let body = self.fetch_with_retry(source, &url).await?;
                vec![RawPage {
                    url,
                    page: None,
                    body,
                }]
            }
        };

        Ok(RawPayload {
            source_name: source.name.clone(),
            pages,
        })
    }

    async fn fetch_pages(
        &self,
        source: &SourceConfig,
        paging: &PagingConfig,
        extractor: &dyn Extractor,
    ) -> Result<Vec<RawPage>> {
        let cap = paging.request_cap();
        let delay = Duration::from_millis(self.config.page_delay_ms);
        let mut pages = Vec::new();
        let mut page_no = paging.start;

        for request in 1..=cap {
            if paging.last_page.is_some_and(|last| page_no > last) {
                debug!("[{}] Reached last page {}", source.name, page_no - 1);
                break;
            }

            let mut params = fixed_query(source);
            params.push((paging.param.as_str(), page_no.to_string()));
            if let (Some(name), Some(size)) = (&paging.size_param, paging.size) {
                params.push((name.as_str(), size.to_string()));
            }
            let url = with_query(&source.url, params)?;

            let body = self.fetch_with_retry(source, &url).await?;
            let page = RawPage {
                url,
                page: Some(page_no),
                body,
            };

            let count = extractor.page_len(&page)?;
            let more = has_more(paging, &page.body);
            pages.push(page);

            if count == 0 {
                debug!("[{}] Page {} is empty, stopping", source.name, page_no);
                break;
            }
            if more == Some(false) {
                debug!("[{}] Source reports no more pages after {}", source.name, page_no);
                break;
            }
            if request == cap {
                warn!(
                    "[{}] Stopped at the request cap of {} pages (expected about {})",
                    source.name, cap, paging.expected_pages
                );
                break;
            }

            page_no += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!("[{}] Fetched {} page(s)", source.name, pages.len());
        Ok(pages)
    }

    /// Fetch one URL, retrying transport failures with backoff.
    async fn fetch_with_retry(&self, source: &SourceConfig, url: &str) -> Result<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.send_once(source, url).await {
                Ok(body) if body.trim().is_empty() => {
                    return Err(AppError::shape(&source.name, format!("empty body from {url}")));
                }
                Ok(body) => return Ok(body),
                Err(message) => {
                    warn!(
                        "[{}] Attempt {}/{} for {} failed: {}",
                        source.name, attempt, max_attempts, url, message
                    );
                    last_error = message;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }
        }

        Err(AppError::transport(&source.name, max_attempts, last_error))
    }

    /// One request. Any error here is a transport error.
    async fn send_once(&self, source: &SourceConfig, url: &str) -> std::result::Result<String, String> {
        let method = match source.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut request = self.client.request(method, url);
        for (name, value) in &source.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let (HttpMethod::Post, Some(body)) = (source.method, &source.body) {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_delay_ms;
        let ms = match self.config.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(u64::from(attempt)),
        };
        Duration::from_millis(ms)
    }
}

fn fixed_query(source: &SourceConfig) -> Vec<(&str, String)> {
    source
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect()
}

/// Read the optional "has more" flag from a JSON page.
fn has_more(paging: &PagingConfig, body: &str) -> Option<bool> {
    let pointer = paging.has_more_pointer.as_deref()?;
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    match value.pointer(pointer)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractorConfig, JsonExtractorConfig};
    use crate::services::extract::build_extractor;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> FetcherConfig {
        FetcherConfig {
            retry_delay_ms: 10,
            page_delay_ms: 0,
            ..FetcherConfig::default()
        }
    }

    fn source(url: String, paging: Option<PagingConfig>) -> SourceConfig {
        SourceConfig {
            name: "test".into(),
            url,
            paging,
            ..SourceConfig::default()
        }
    }

    fn items_extractor() -> Box<dyn Extractor> {
        build_extractor(
            &ExtractorConfig::Json(JsonExtractorConfig {
                items_pointer: "/items".into(),
                ..JsonExtractorConfig::default()
            }),
            "test",
        )
        .unwrap()
    }

    fn page_body(page: u32, n: u32) -> String {
        let items: Vec<Value> = (0..n)
            .map(|i| serde_json::json!({"title": format!("p{page}-{i}")}))
            .collect();
        serde_json::json!({ "items": items }).to_string()
    }

    #[test]
    fn test_retry_delay() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.retry_delay(1), Duration::from_millis(2000));
        assert_eq!(fetcher.retry_delay(2), Duration::from_millis(4000));

        let fixed = FetcherConfig {
            backoff: Backoff::Fixed,
            ..FetcherConfig::default()
        };
        let fetcher = HttpFetcher::new(&fixed).unwrap();
        assert_eq!(fetcher.retry_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_has_more() {
        let paging = PagingConfig {
            has_more_pointer: Some("/data/hasMore".into()),
            ..PagingConfig::default()
        };
        assert_eq!(has_more(&paging, r#"{"data":{"hasMore":false}}"#), Some(false));
        assert_eq!(has_more(&paging, r#"{"data":{"hasMore":1}}"#), Some(true));
        assert_eq!(has_more(&paging, "<html>"), None);
        assert_eq!(has_more(&PagingConfig::default(), "{}"), None);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1, 2)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher
            .fetch(&source(format!("{}/feed", server.uri()), None), items_extractor().as_ref())
            .await
            .unwrap();

        assert_eq!(payload.pages.len(), 1);
        assert!(!payload.is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let err = fetcher
            .fetch(&source(server.uri(), None), items_extractor().as_ref())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transport { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let err = fetcher
            .fetch(&source(server.uri(), None), items_extractor().as_ref())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Shape { .. }));
    }

    #[tokio::test]
    async fn test_paging_stops_on_empty_page() {
        let server = MockServer::start().await;
        for page in 1..=3 {
            Mock::given(method("GET"))
                .and(path("/list"))
                .and(query_param("page", page.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_string(page_body(page, 20)))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(4, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let paging = PagingConfig {
            expected_pages: 3,
            ..PagingConfig::default()
        };
        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let extractor = items_extractor();
        let payload = fetcher
            .fetch(&source(format!("{}/list", server.uri()), Some(paging)), extractor.as_ref())
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 4);
        let total: usize = payload
            .pages
            .iter()
            .map(|p| extractor.page_len(p).unwrap())
            .sum();
        assert_eq!(total, 60);
    }

    #[tokio::test]
    async fn test_paging_respects_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1, 5)))
            .mount(&server)
            .await;

        let paging = PagingConfig {
            expected_pages: 1,
            max_pages: Some(2),
            ..PagingConfig::default()
        };
        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher
            .fetch(&source(server.uri(), Some(paging)), items_extractor().as_ref())
            .await
            .unwrap();

        assert_eq!(payload.pages.len(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    fn page_with_flag(page: u32, n: u32, more: bool) -> String {
        let mut body: Value = serde_json::from_str(&page_body(page, n)).unwrap();
        body["hasMore"] = Value::Bool(more);
        body.to_string()
    }

    #[tokio::test]
    async fn test_paging_stops_when_source_reports_no_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_flag(1, 10, true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_flag(2, 10, false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_flag(3, 10, true)))
            .expect(0)
            .mount(&server)
            .await;

        let paging = PagingConfig {
            expected_pages: 3,
            has_more_pointer: Some("/hasMore".into()),
            ..PagingConfig::default()
        };
        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher
            .fetch(&source(server.uri(), Some(paging)), items_extractor().as_ref())
            .await
            .unwrap();

        assert_eq!(payload.pages.len(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paging_stops_at_last_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1, 5)))
            .mount(&server)
            .await;

        let paging = PagingConfig {
            expected_pages: 4,
            last_page: Some(2),
            ..PagingConfig::default()
        };
        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher
            .fetch(&source(server.uri(), Some(paging)), items_extractor().as_ref())
            .await
            .unwrap();

        let numbers: Vec<_> = payload.pages.iter().map(|p| p.page).collect();
        assert_eq!(numbers, vec![Some(1), Some(2)]);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paging_sends_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "1"))
            .and(query_param("size", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1, 3)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "2"))
            .and(query_param("size", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(2, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let paging = PagingConfig {
            expected_pages: 1,
            size_param: Some("size".into()),
            size: Some(50),
            ..PagingConfig::default()
        };
        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher
            .fetch(&source(format!("{}/list", server.uri()), Some(paging)), items_extractor().as_ref())
            .await
            .unwrap();

        assert_eq!(payload.pages.len(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_post_source_sends_json_body() {
        let server = MockServer::start().await;
        let body = serde_json::json!({"category": "anime", "limit": 30});
        Mock::given(method("POST"))
            .and(path("/api/list"))
            .and(header("referer", "https://example.com/"))
            .and(body_json(body.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(1, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let mut post = source(format!("{}/api/list", server.uri()), None);
        post.method = HttpMethod::Post;
        post.body = Some(body);
        post.headers.insert("Referer".into(), "https://example.com/".into());

        let fetcher = HttpFetcher::new(&fast_config()).unwrap();
        let payload = fetcher.fetch(&post, items_extractor().as_ref()).await.unwrap();

        assert_eq!(payload.pages.len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method.as_str(), "POST");
    }
}
