use crate::app::ports::HttpClientPort;
use crate::config::KopisConfig;
use crate::constants::{area_name, API_DATE_FORMAT, AREAS};
use crate::error::{IngestError, Result};
use crate::parser;
use crate::types::{ConcertDetail, ListingStub};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Client for the KOPIS performance open API.
pub struct KopisApi {
    http: Arc<dyn HttpClientPort>,
    api_key: String,
    config: KopisConfig,
}

impl KopisApi {
    pub fn new(http: Arc<dyn HttpClientPort>, api_key: &str, config: KopisConfig) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            config,
        }
    }

    pub fn listing_url(&self, date: NaiveDate, area: u16) -> String {
        let day = date.format(API_DATE_FORMAT);
        format!(
            "{}/pblprfr?service={}&stdate={day}&eddate={day}&signgucode={}&shcate={}&rows={}&cpage=1",
            self.config.api_base.trim_end_matches('/'),
            self.api_key,
            area,
            self.config.genre_code,
            self.config.rows,
        )
    }

    pub fn detail_url(&self, external_id: &str) -> String {
        format!(
            "{}/pblprfr/{}?service={}&newsql=Y",
            self.config.api_base.trim_end_matches('/'),
            external_id,
            self.api_key,
        )
    }

    /// The key travels in the query string, so it is masked in every error.
    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.api_key, "***")
        }
    }

    async fn get_ok(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).await.map_err(|e| IngestError::Transport {
            url: self.redact(url),
            reason: self.redact(&e.to_string()),
        })?;
        if !response.is_success() {
            return Err(IngestError::Status {
                url: self.redact(url),
                status: response.status,
            });
        }
        Ok(response.bytes)
    }

    /// Listing stubs for one area on one day.
    pub async fn fetch_area_listings(&self, date: NaiveDate, area: u16) -> Result<Vec<ListingStub>> {
        let body = self.get_ok(&self.listing_url(date, area)).await?;
        parser::parse_listing(&body, area)
    }

    /// Listing stubs for every area on `date`. A failing area is logged and
    /// contributes nothing; the other areas are still queried.
    #[instrument(skip(self))]
    pub async fn fetch_listings(&self, date: NaiveDate) -> Vec<ListingStub> {
        let mut stubs = Vec::new();
        for (area, _) in AREAS {
            let name = area_name(area).unwrap_or_default();
            match self.fetch_area_listings(date, area).await {
                Ok(found) => {
                    debug!(area, area_name = name, count = found.len(), "Fetched area listings");
                    ::metrics::counter!("concert_finder_listings_fetched_total").increment(found.len() as u64);
                    stubs.extend(found);
                }
                Err(e) => {
                    warn!(area, area_name = name, error = %e, "Listing fetch failed for area, skipping");
                    ::metrics::counter!("concert_finder_area_fetch_failures_total").increment(1);
                }
            }
        }
        info!("Fetched {} listings for {}", stubs.len(), date);
        stubs
    }

    /// Detail record for one performance.
    pub async fn fetch_detail(&self, external_id: &str) -> Result<ConcertDetail> {
        let body = self.get_ok(&self.detail_url(external_id)).await?;
        parser::parse_detail(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{HttpResponse, PostRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Area 11 answers with one record, area 26 fails, the rest are empty.
    struct AreaHttp {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClientPort for AreaHttp {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            self.requested.lock().unwrap().push(url.to_string());
            if url.contains("signgucode=26") {
                return Err(IngestError::Parse("connection reset".into()));
            }
            let body = if url.contains("signgucode=11") {
                "<dbs><db><mt20id>PF1</mt20id><prfnm>A</prfnm><poster>http://x/p/PF1.jpg</poster></db></dbs>"
            } else {
                "<dbs></dbs>"
            };
            Ok(HttpResponse {
                status: 200,
                bytes: body.as_bytes().to_vec(),
                content_type: "text/xml".into(),
            })
        }

        async fn post(&self, _request: PostRequest) -> Result<HttpResponse> {
            unreachable!()
        }
    }

    fn api(http: Arc<dyn HttpClientPort>) -> KopisApi {
        KopisApi::new(http, "KEY", KopisConfig::default())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_urls() {
        let http = Arc::new(AreaHttp {
            requested: Mutex::new(Vec::new()),
        });
        let api = api(http);
        assert_eq!(
            api.listing_url(day(), 11),
            "http://www.kopis.or.kr/openApi/restful/pblprfr?service=KEY&stdate=20240101&eddate=20240101&signgucode=11&shcate=CCCA&rows=100&cpage=1"
        );
        assert_eq!(
            api.detail_url("PF1"),
            "http://www.kopis.or.kr/openApi/restful/pblprfr/PF1?service=KEY&newsql=Y"
        );
    }

    #[tokio::test]
    async fn test_fetch_listings_isolates_area_failures() {
        let http = Arc::new(AreaHttp {
            requested: Mutex::new(Vec::new()),
        });
        let api = api(http.clone());

        let stubs = api.fetch_listings(day()).await;
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].external_id, "PF1");
        assert_eq!(stubs[0].area, 11);
        assert_eq!(http.requested.lock().unwrap().len(), AREAS.len());
    }

    /// Fails every request the way reqwest reports a refused connection,
    /// with the full URL in the message.
    struct UnreachableHttp;

    #[async_trait]
    impl HttpClientPort for UnreachableHttp {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            Err(IngestError::Parse(format!(
                "error sending request for url ({url}): connection refused"
            )))
        }

        async fn post(&self, _request: PostRequest) -> Result<HttpResponse> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_transport_failure_masks_api_key() {
        let api = KopisApi::new(Arc::new(UnreachableHttp), "SECRET-KOPIS-KEY", KopisConfig::default());

        let err = api.fetch_detail("PF1").await.unwrap_err();
        assert!(matches!(err, IngestError::Transport { .. }));
        let message = err.to_string();
        assert!(!message.contains("SECRET-KOPIS-KEY"), "{message}");
        assert!(message.contains("service=***"), "{message}");

        let err = api.fetch_area_listings(day(), 11).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-KOPIS-KEY"));
    }
}
