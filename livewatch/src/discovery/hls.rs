//! Public camera directory scraping.
//!
//! A directory page is fetched, every `.m3u8` URL found in its HTML is
//! HEAD-checked, and the playlists that answer become search hits.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::GeoTag;
use super::search::{SearchHit, SearchProvider};
use crate::error::SearchError;
use crate::utils::http_client::build_scrape_client;
use crate::{Error, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Directory scraping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsPageConfig {
    pub page_timeout_secs: u64,
    /// Budget for each playlist liveness check.
    pub head_timeout_secs: u64,
    /// Playlists checked per page; the rest are ignored.
    pub max_links_per_page: usize,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl Default for HlsPageConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 10,
            head_timeout_secs: 3,
            max_links_per_page: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl HlsPageConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs.max(1))
    }

    pub fn head_timeout(&self) -> Duration {
        Duration::from_secs(self.head_timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_links_per_page == 0 {
            return Err(Error::config("discovery.hls.max_links_per_page must be at least 1"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::config("discovery.hls.user_agent cannot be empty"));
        }
        Ok(())
    }
}

struct LinkExtractor {
    playlist: Regex,
    title: Regex,
}

impl LinkExtractor {
    fn new() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            playlist: Regex::new(r#"https?://[^\s'"<>\\]+\.m3u8"#)?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
        })
    }

    /// Distinct playlist URLs in page order, at most `max`.
    fn links(&self, html: &str, max: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.playlist
            .find_iter(html)
            .map(|m| m.as_str())
            .filter(|link| seen.insert(*link))
            .take(max)
            .map(str::to_string)
            .collect()
    }

    fn title(&self, html: &str) -> Option<String> {
        let raw = self.title.captures(html)?.get(1)?.as_str();
        let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        (!title.is_empty()).then_some(title)
    }
}

/// Name for a playlist found on a page titled `page_title`.
fn stream_name(page_title: Option<&str>, link: &str) -> String {
    let file = link.rsplit('/').next().unwrap_or(link);
    let name_part = file.trim_end_matches(".m3u8").replace('_', " ");
    format!("{} - {}", page_title.unwrap_or("HLS camera"), name_part)
}

/// Scrapes directory pages for live HLS playlists. The descriptor term is the page URL.
pub struct HlsPageSource {
    client: reqwest::Client,
    extractor: LinkExtractor,
    config: HlsPageConfig,
}

impl HlsPageSource {
    pub fn new(config: HlsPageConfig) -> Result<Self> {
        let extractor =
            LinkExtractor::new().map_err(|e| Error::Other(format!("playlist pattern: {e}")))?;
        let client = build_scrape_client(
            &config.user_agent,
            config.page_timeout(),
            config.accept_invalid_certs,
        );
        Ok(Self {
            client,
            extractor,
            config,
        })
    }

    async fn fetch_page(&self, page_url: &str) -> std::result::Result<String, SearchError> {
        let response = self
            .client
            .get(page_url)
            .send()
            .await
            .map_err(|e| SearchError::Failed(format!("{page_url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited(format!("{page_url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SearchError::Failed(format!("{page_url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| SearchError::Malformed(format!("{page_url}: {e}")))
    }

    async fn is_live(&self, link: &str) -> bool {
        match self
            .client
            .head(link)
            .timeout(self.config.head_timeout())
            .send()
            .await
        {
            Ok(response) => {
                trace!(link = %link, status = %response.status(), "Playlist checked");
                response.status() == StatusCode::OK
            }
            Err(e) => {
                trace!(link = %link, error = %e, "Playlist check failed");
                false
            }
        }
    }
}

#[async_trait]
impl SearchProvider for HlsPageSource {
    async fn search(
        &self,
        page_url: &str,
        _geo_tag: &GeoTag,
    ) -> std::result::Result<Vec<SearchHit>, SearchError> {
        let html = self.fetch_page(page_url).await?;
        let page_title = self.extractor.title(&html);
        let links = self
            .extractor
            .links(&html, self.config.max_links_per_page);

        let mut hits = Vec::new();
        for link in &links {
            if self.is_live(link).await {
                hits.push(SearchHit {
                    title: stream_name(page_title.as_deref(), link),
                    page_ref: link.clone(),
                    geo_hint: None,
                });
            }
        }

        debug!(page = %page_url, links = links.len(), live = hits.len(), "Directory page scraped");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

    /// Minimal HTTP server answering `path -> (status, body)`; unknown paths are 404.
    async fn serve() -> (String, Routes) {
        let routes: Routes = Arc::default();
        let shared = routes.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = shared.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request);
                    let mut parts = request.split_whitespace();
                    let method = parts.next().unwrap_or_default().to_string();
                    let path = parts.next().unwrap_or_default().to_string();

                    let (status, body) = routes
                        .lock()
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, String::new()));
                    let mut response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    if method != "HEAD" {
                        response.push_str(&body);
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), routes)
    }

    fn source() -> HlsPageSource {
        HlsPageSource::new(HlsPageConfig::default()).unwrap()
    }

    #[test]
    fn test_links_are_distinct_and_capped() {
        let extractor = LinkExtractor::new().unwrap();
        let html = r#"
            <video src="https://cdn.example.com/live/praia_mole.m3u8"></video>
            <script>var s = 'https://cdn.example.com/live/praia_mole.m3u8';</script>
            <a href="http://10.0.0.5/hls/ponte.m3u8">ponte</a>
            <a href="https://cdn.example.com/live/other.m3u8">other</a>
        "#;
        assert_eq!(
            extractor.links(html, 10),
            vec![
                "https://cdn.example.com/live/praia_mole.m3u8",
                "http://10.0.0.5/hls/ponte.m3u8",
                "https://cdn.example.com/live/other.m3u8",
            ]
        );
        assert_eq!(extractor.links(html, 1).len(), 1);
    }

    #[test]
    fn test_title_and_stream_name() {
        let extractor = LinkExtractor::new().unwrap();
        let html = "<html><head><TITLE>\n  Florianópolis   webcams </TITLE></head></html>";
        let title = extractor.title(html);
        assert_eq!(title.as_deref(), Some("Florianópolis webcams"));
        assert_eq!(
            stream_name(title.as_deref(), "https://cdn.example.com/live/praia_mole.m3u8"),
            "Florianópolis webcams - praia mole"
        );
        assert_eq!(extractor.title("<html></html>"), None);
        assert_eq!(stream_name(None, "http://x/cam.m3u8"), "HLS camera - cam");
    }

    #[tokio::test]
    async fn test_search_keeps_only_answering_playlists() {
        let (base, routes) = serve().await;
        let page = format!(
            "<title>Floripa Cams</title>\
             <source src=\"{base}/live/praia_mole.m3u8\">\
             <source src=\"{base}/live/dead_cam.m3u8\">\
             <source src=\"{base}/live/praia_mole.m3u8\">"
        );
        {
            let mut routes = routes.lock();
            routes.insert("/dir".to_string(), (200, page));
            routes.insert("/live/praia_mole.m3u8".to_string(), (200, "#EXTM3U".to_string()));
        }
        let page_url = format!("{base}/dir");

        let hits = source().search(&page_url, &GeoTag::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].page_ref.ends_with("/live/praia_mole.m3u8"));
        assert_eq!(hits[0].title, "Floripa Cams - praia mole");
    }

    #[tokio::test]
    async fn test_page_status_maps_to_search_errors() {
        let (base, routes) = serve().await;
        routes.lock().insert("/busy".to_string(), (429, String::new()));
        routes.lock().insert("/down".to_string(), (503, String::new()));
        let source = source();

        assert!(matches!(
            source.search(&format!("{base}/busy"), &GeoTag::default()).await,
            Err(SearchError::RateLimited(_))
        ));
        assert!(matches!(
            source.search(&format!("{base}/down"), &GeoTag::default()).await,
            Err(SearchError::Failed(_))
        ));
    }
}
