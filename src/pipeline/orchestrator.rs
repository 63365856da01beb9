use crate::apis::kopis::KopisApi;
use crate::app::ports::HttpClientPort;
use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::enrich::enrich;
use crate::pipeline::extract::{select_source, ProgramExtractor};
use crate::pipeline::posters::PosterStore;
use crate::storage::ConcertStore;
use crate::types::{ConcertRecord, ListingStub, PosterKind, ProgramSource};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Result of a complete ingestion run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub dates: usize,
    pub listings: usize,
    pub persisted: usize,
    pub skipped: usize,
    /// `"{external_id}: {step}: {error}"` for every failed step.
    pub errors: Vec<String>,
}

impl RunSummary {
    fn record_error(&mut self, external_id: &str, step: &str, error: &dyn std::fmt::Display) {
        self.errors.push(format!("{external_id}: {step}: {error}"));
    }
}

/// Fetch → enrich → persist → posters → program extraction, one listing at a
/// time.
pub struct Pipeline {
    kopis: KopisApi,
    posters: PosterStore,
    extractor: ProgramExtractor,
    store: ConcertStore,
}

impl Pipeline {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &Config, credentials: &Credentials) -> Result<Self> {
        let store = ConcertStore::open(&config.storage.database_path)?;
        Ok(Self::from_parts(
            KopisApi::new(http.clone(), &credentials.kopis_api_key, config.kopis.clone()),
            PosterStore::new(http.clone(), &config.kopis, &config.storage.media_root),
            ProgramExtractor::new(http, &credentials.openai_api_key, config.extraction.clone()),
            store,
        ))
    }

    pub fn from_parts(
        kopis: KopisApi,
        posters: PosterStore,
        extractor: ProgramExtractor,
        store: ConcertStore,
    ) -> Self {
        Self {
            kopis,
            posters,
            extractor,
            store,
        }
    }

    #[instrument(skip_all, fields(dates = dates.len()))]
    pub async fn run(&self, dates: &[NaiveDate]) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for &date in dates {
            info!("Ingesting listings for {}", date);
            let stubs = self.kopis.fetch_listings(date).await;
            summary.dates += 1;
            summary.listings += stubs.len();

            for stub in &stubs {
                let span = info_span!("listing", external_id = %stub.external_id, area = stub.area);
                self.process_listing(stub, date, &mut summary)
                    .instrument(span)
                    .await;
            }
        }

        metrics::run_duration(started.elapsed().as_secs_f64());
        info!(
            dates = summary.dates,
            listings = summary.listings,
            persisted = summary.persisted,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "Run finished"
        );
        summary
    }

    async fn process_listing(&self, stub: &ListingStub, date: NaiveDate, summary: &mut RunSummary) {
        let id = stub.external_id.as_str();

        let record = match self.enrich_listing(stub, date).await {
            Ok(record) => record,
            Err(e) => {
                warn!(external_id = id, error = %e, "Skipping listing: enrichment failed");
                metrics::listing_skipped("enrich");
                summary.skipped += 1;
                summary.record_error(id, "enrich", &e);
                return;
            }
        };

        if let Err(e) = self.persist_core(&record) {
            warn!(external_id = id, error = %e, "Skipping listing: concert insert failed");
            metrics::listing_skipped("persist");
            summary.skipped += 1;
            summary.record_error(id, "persist", &e);
            return;
        }
        metrics::listing_persisted();
        summary.persisted += 1;

        // Everything below is best effort: the concert row stays either way.
        let performers = self.store.insert_performers(&record);
        check(summary, id, "performers", performers);
        let vendors = self.store.insert_ticket_vendors(&record);
        check(summary, id, "ticket_vendors", vendors);
        let posters = self.store.insert_poster_references(&record);
        check(summary, id, "poster_references", posters);

        self.fetch_posters(&record, summary).await;
        self.extract_program(&record, summary).await;
    }

    async fn enrich_listing(&self, stub: &ListingStub, date: NaiveDate) -> Result<ConcertRecord> {
        let detail = self.kopis.fetch_detail(&stub.external_id).await?;
        enrich(stub, date, detail)
    }

    fn persist_core(&self, record: &ConcertRecord) -> Result<()> {
        let facility_id = self.store.find_or_create_facility(record.area, &record.venue)?;
        self.store.insert_concert(record, facility_id)
    }

    async fn fetch_posters(&self, record: &ConcertRecord, summary: &mut RunSummary) {
        let id = record.external_id.as_str();
        if record.display_poster.is_empty() {
            debug!(external_id = id, "No display poster");
        } else {
            let saved = self.posters.fetch(&record.display_poster, PosterKind::Display).await;
            if check(summary, id, "display_poster", saved).is_some() {
                metrics::poster_saved("display");
            }
        }
        for filename in &record.full_posters {
            let saved = self.posters.fetch(filename, PosterKind::Full).await;
            if check(summary, id, "full_poster", saved).is_some() {
                metrics::poster_saved("full");
            }
        }
    }

    async fn extract_program(&self, record: &ConcertRecord, summary: &mut RunSummary) {
        let id = record.external_id.as_str();
        let source = select_source(record, self.posters.merged_path(id));
        if let ProgramSource::ImageSource(_) = &source {
            let merged = self.posters.merge(id, &record.full_posters);
            if check(summary, id, "merge_posters", merged).is_none() {
                return;
            }
        }

        metrics::extraction_call(source.kind());
        let extracted = self.extractor.extract(id, &source).await;
        let Some(pieces) = check(summary, id, "extract_program", extracted) else {
            return;
        };
        metrics::pieces_found(pieces.len());
        if pieces.is_empty() {
            debug!(external_id = id, "No pieces extracted");
            return;
        }
        let written = self.store.insert_compositions(id, &pieces);
        check(summary, id, "compositions", written);
    }
}

/// Logs and records a failed post-insert step; the listing carries on.
fn check<T>(summary: &mut RunSummary, external_id: &str, step: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(external_id, step, error = %e, "Listing step failed");
            metrics::step_failed(step);
            summary.record_error(external_id, step, &e);
            None
        }
    }
}
