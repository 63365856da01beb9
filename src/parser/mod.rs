//! KOPIS response parsing.
//!
//! Responses are small XML documents (`<dbs><db>...</db></dbs>`). They are run
//! through the same `scraper` document model used for HTML pages, after
//! rewriting the two XML-only constructs it does not understand: self-closing
//! elements and CDATA sections.

use crate::error::{IngestError, Result};
use crate::types::{ConcertDetail, ListingStub, VendorLink};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

static SELF_CLOSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z][\w:.-]*)(\s[^<>]*?)?/>").expect("valid regex"));
static CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| IngestError::Parse(format!("bad selector '{css}': {e:?}")))
}

/// Rewrites `<tag/>` to `<tag></tag>` and inlines CDATA content as escaped text.
pub fn normalize_markup(xml: &str) -> String {
    let without_cdata = CDATA.replace_all(xml, |caps: &regex::Captures| {
        caps[1]
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    });
    SELF_CLOSING
        .replace_all(&without_cdata, "<$1$2></$1>")
        .into_owned()
}

fn parse_document(bytes: &[u8]) -> Html {
    let body = String::from_utf8_lossy(bytes);
    Html::parse_document(&normalize_markup(&body))
}

/// Trimmed text of the first `css` descendant of `parent`.
fn child_text(parent: &ElementRef, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(parent
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string()))
}

/// Last path segment of a poster URL.
pub fn poster_filename(url: &str) -> String {
    url.trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parses one per-area listing page into stubs. Records without an id or name
/// are dropped.
pub fn parse_listing(bytes: &[u8], area: u16) -> Result<Vec<ListingStub>> {
    let document = parse_document(bytes);
    let db_sel = selector("db")?;

    let mut stubs = Vec::new();
    for db in document.select(&db_sel) {
        let external_id = child_text(&db, "mt20id")?.unwrap_or_default();
        let name = child_text(&db, "prfnm")?.unwrap_or_default();
        if external_id.is_empty() || name.is_empty() {
            warn!(area, "Listing record without mt20id/prfnm, skipping");
            continue;
        }
        let display_poster = child_text(&db, "poster")?
            .map(|url| poster_filename(&url))
            .unwrap_or_default();
        stubs.push(ListingStub {
            area,
            external_id,
            name,
            display_poster,
        });
    }
    debug!(area, count = stubs.len(), "Parsed listing page");
    Ok(stubs)
}

/// Parses a detail response. Only the absence of the `<db>` record itself is
/// an error here; required-field checks happen during enrichment.
pub fn parse_detail(bytes: &[u8]) -> Result<ConcertDetail> {
    let document = parse_document(bytes);
    let db_sel = selector("db")?;
    let db = document
        .select(&db_sel)
        .next()
        .ok_or_else(|| IngestError::MissingField("db".into()))?;

    let vendor_links = match db.select(&selector("relates")?).next() {
        Some(relates) => {
            let relate_sel = selector("relate")?;
            let mut links = Vec::new();
            for relate in relates.select(&relate_sel) {
                let url = child_text(&relate, "relateurl")?.unwrap_or_default();
                if url.is_empty() {
                    continue;
                }
                let label = child_text(&relate, "relatenm")?;
                links.push(VendorLink { label, url });
            }
            Some(links)
        }
        None => None,
    };

    let full_posters = match db.select(&selector("styurls")?).next() {
        Some(styurls) => {
            let styurl_sel = selector("styurl")?;
            Some(
                styurls
                    .select(&styurl_sel)
                    .map(|el| poster_filename(&el.text().collect::<String>()))
                    .filter(|name| !name.is_empty())
                    .collect(),
            )
        }
        None => None,
    };

    Ok(ConcertDetail {
        name: child_text(&db, "prfnm")?,
        price: child_text(&db, "pcseguidance")?,
        runtime: child_text(&db, "prfruntime")?,
        cast: child_text(&db, "prfcast")?,
        venue: child_text(&db, "fcltynm")?,
        program_blurb: child_text(&db, "sty")?,
        showtime_guidance: child_text(&db, "dtguidance")?,
        vendor_links,
        full_posters,
    })
}
