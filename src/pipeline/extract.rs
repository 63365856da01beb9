use crate::app::ports::{HttpClientPort, PostRequest};
use crate::config::ExtractionConfig;
use crate::error::{IngestError, Result};
use crate::types::{CompositionEntry, ConcertRecord, ProgramSource};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Picks the extraction input for one concert: the blurb when it has more than
/// one character, otherwise the merged poster image.
pub fn select_source(record: &ConcertRecord, merged_poster: PathBuf) -> ProgramSource {
    let blurb = record.program_blurb.trim();
    if blurb.chars().count() > 1 {
        ProgramSource::TextSource(blurb.to_string())
    } else {
        ProgramSource::ImageSource(merged_poster)
    }
}

/// Keeps `composer|title` lines; anything else is dropped.
pub fn parse_pieces<S: AsRef<str>>(lines: &[S]) -> Vec<CompositionEntry> {
    lines
        .iter()
        .filter_map(|line| {
            let mut fields = line.as_ref().split('|');
            let composer = fields.next()?.trim();
            let title = fields.next()?.trim();
            if composer.is_empty() || title.is_empty() {
                return None;
            }
            Some(CompositionEntry {
                composer: composer.to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client that turns a blurb or poster into composition rows.
pub struct ProgramExtractor {
    http: Arc<dyn HttpClientPort>,
    api_key: String,
    config: ExtractionConfig,
}

impl ProgramExtractor {
    pub fn new(http: Arc<dyn HttpClientPort>, api_key: &str, config: ExtractionConfig) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            config,
        }
    }

    /// Request body for `source`. Reads the poster from disk for image sources.
    pub fn build_payload(&self, source: &ProgramSource) -> Result<Value> {
        let payload = match source {
            ProgramSource::TextSource(blurb) => json!({
                "model": self.config.text_model,
                "messages": [{
                    "role": "user",
                    "content": [{
                        "type": "text",
                        "text": format!("{}. {}.", blurb, self.config.program_prompt),
                    }],
                }],
                "max_tokens": self.config.max_tokens,
            }),
            ProgramSource::ImageSource(path) => {
                let bytes = fs::read(path).map_err(|e| {
                    IngestError::Extraction(format!("cannot read {}: {}", path.display(), e))
                })?;
                json!({
                    "model": self.config.vision_model,
                    "messages": [{
                        "role": "user",
                        "content": [
                            { "type": "text", "text": self.config.poster_prompt },
                            {
                                "type": "image_url",
                                "image_url": {
                                    "url": format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)),
                                },
                            },
                        ],
                    }],
                    "max_tokens": self.config.max_tokens,
                })
            }
        };
        Ok(payload)
    }

    /// One call to the extraction service. A non-success status yields no
    /// pieces rather than an error.
    #[instrument(skip(self, source), fields(path = source.kind()))]
    pub async fn extract(&self, external_id: &str, source: &ProgramSource) -> Result<Vec<CompositionEntry>> {
        let payload = self.build_payload(source)?;
        let request = PostRequest::json(&self.config.endpoint, &payload)?.with_bearer(&self.api_key);
        let response = self.http.post(request).await?;

        if !response.is_success() {
            warn!(
                status = response.status,
                body = %response.text(),
                "Extraction service returned an error, no pieces recorded"
            );
            ::metrics::counter!("concert_finder_extraction_failures_total").increment(1);
            return Ok(Vec::new());
        }

        let completion: ChatCompletion = serde_json::from_slice(&response.bytes)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| IngestError::Extraction("response has no message content".into()))?;

        let lines: Vec<&str> = content.split('\n').collect();
        let pieces = parse_pieces(&lines);
        debug!(lines = lines.len(), "Extraction response received");
        info!(pieces = pieces.len(), "Extracted program");
        ::metrics::counter!("concert_finder_pieces_extracted_total").increment(pieces.len() as u64);
        Ok(pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpResponse;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct CannedHttp {
        status: u16,
        body: String,
        posts: Mutex<Vec<PostRequest>>,
    }

    impl CannedHttp {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                posts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClientPort for CannedHttp {
        async fn get(&self, _url: &str) -> Result<HttpResponse> {
            unreachable!("extraction only posts")
        }

        async fn post(&self, request: PostRequest) -> Result<HttpResponse> {
            self.posts.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                bytes: self.body.clone().into_bytes(),
                content_type: "application/json".into(),
            })
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig {
            endpoint: "https://llm.test/v1/chat/completions".into(),
            text_model: "text-model".into(),
            vision_model: "vision-model".into(),
            max_tokens: 300,
            program_prompt: "List composer|title lines".into(),
            poster_prompt: "Read the poster and list composer|title lines".into(),
        }
    }

    fn record(blurb: &str) -> ConcertRecord {
        ConcertRecord {
            external_id: "PF230001".into(),
            area: 11,
            name: "신년 음악회".into(),
            event_day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            starts_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap(),
            runtime: "90분".into(),
            price: String::new(),
            venue: "예술의전당".into(),
            cast: "김철수".into(),
            program_blurb: blurb.into(),
            display_poster: "PF_D.jpg".into(),
            full_posters: vec!["PF_A.jpg".into()],
            ticket_vendors: BTreeMap::new(),
        }
    }

    fn completion(content: &str) -> String {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
    }

    #[test]
    fn test_parse_pieces_keeps_pipe_lines_only() {
        let pieces = parse_pieces(&["Beethoven|Symphony No. 5", "not a piece line", ""]);
        assert_eq!(
            pieces,
            vec![CompositionEntry {
                composer: "Beethoven".into(),
                title: "Symphony No. 5".into(),
            }]
        );
        assert!(parse_pieces(&["not a piece line"]).is_empty());
    }

    #[test]
    fn test_parse_pieces_trims_and_ignores_extra_fields() {
        let pieces = parse_pieces(&[" Brahms | Violin Concerto | Op. 77", "|untitled", "Ravel|"]);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].composer, "Brahms");
        assert_eq!(pieces[0].title, "Violin Concerto");
    }

    #[test]
    fn test_select_source_is_exclusive() {
        let merged = PathBuf::from("media/full_poster/PF230001_merged.jpg");
        assert_eq!(
            select_source(&record("Beethoven: Symphony No. 5"), merged.clone()),
            ProgramSource::TextSource("Beethoven: Symphony No. 5".into())
        );
        assert_eq!(
            select_source(&record(""), merged.clone()),
            ProgramSource::ImageSource(merged.clone())
        );
        assert_eq!(
            select_source(&record("x"), merged.clone()),
            ProgramSource::ImageSource(merged.clone())
        );
        assert_eq!(
            select_source(&record("  "), merged.clone()),
            ProgramSource::ImageSource(merged)
        );
    }

    #[tokio::test]
    async fn test_text_extraction_request_and_parse() {
        let http = CannedHttp::new(200, &completion("Mozart|Symphony No. 40\nHere are the pieces:\nHaydn|Cello Concerto No. 1"));
        let extractor = ProgramExtractor::new(http.clone(), "sk-test", config());

        let source = ProgramSource::TextSource("Mozart, Haydn".into());
        let pieces = extractor.extract("PF230001", &source).await.unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].composer, "Haydn");

        let posts = http.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://llm.test/v1/chat/completions");
        assert_eq!(posts[0].bearer_token.as_deref(), Some("sk-test"));
        let body: Value = serde_json::from_slice(&posts[0].body).unwrap();
        assert_eq!(body["model"], "text-model");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(
            body["messages"][0]["content"][0]["text"],
            "Mozart, Haydn. List composer|title lines."
        );
    }

    #[tokio::test]
    async fn test_image_extraction_embeds_base64_poster() {
        let dir = tempdir().unwrap();
        let poster = dir.path().join("PF230001_merged.jpg");
        fs::write(&poster, b"jpeg").unwrap();

        let http = CannedHttp::new(200, &completion("Bach|Goldberg Variations"));
        let extractor = ProgramExtractor::new(http.clone(), "sk-test", config());
        let pieces = extractor
            .extract("PF230001", &ProgramSource::ImageSource(poster))
            .await
            .unwrap();
        assert_eq!(pieces.len(), 1);

        let posts = http.posts.lock().unwrap();
        let body: Value = serde_json::from_slice(&posts[0].body).unwrap();
        assert_eq!(body["model"], "vision-model");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], "Read the poster and list composer|title lines");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,anBlZw==");
    }

    #[tokio::test]
    async fn test_non_success_yields_no_pieces() {
        let http = CannedHttp::new(429, r#"{"error":{"message":"rate limited"}}"#);
        let extractor = ProgramExtractor::new(http, "sk-test", config());
        let pieces = extractor
            .extract("PF230001", &ProgramSource::TextSource("Mozart".into()))
            .await
            .unwrap();
        assert!(pieces.is_empty());
    }

    #[tokio::test]
    async fn test_missing_merged_poster_is_an_error() {
        let http = CannedHttp::new(200, &completion("Bach|Goldberg Variations"));
        let extractor = ProgramExtractor::new(http.clone(), "sk-test", config());
        let result = extractor
            .extract("PF230001", &ProgramSource::ImageSource(PathBuf::from("/nonexistent/merged.jpg")))
            .await;
        assert!(matches!(result, Err(IngestError::Extraction(_))));
        assert!(http.posts.lock().unwrap().is_empty());
    }
}
