use crate::error::{IngestError, Result};
use crate::types::{ConcertDetail, ConcertRecord, ListingStub, VendorLink};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// First parenthesized `H:MM`/`HH:MM`, e.g. `화요일 ~ 금요일(19:30)`.
static SHOWTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(\d{1,2}):(\d{2})").expect("valid regex"));

/// Second-level labels under which the registrable name sits one level deeper
/// (`ticketlink.co.kr`, `example.com.au`).
const SECOND_LEVEL_LABELS: [&str; 10] =
    ["co", "or", "ne", "go", "re", "pe", "ac", "com", "net", "org"];

const MIN_VENDOR_NAME_CHARS: usize = 2;

/// Local showtime from a `dtguidance` string. Falls back to midnight when no
/// usable `(HH:MM)` token exists.
pub fn parse_showtime(guidance: &str) -> NaiveTime {
    SHOWTIME
        .captures(guidance)
        .and_then(|caps| {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            NaiveTime::from_hms_opt(hour, minute, 0)
        })
        .unwrap_or(NaiveTime::MIN)
}

/// Interprets `day` + `time` as Asia/Seoul wall-clock time and converts to UTC.
pub fn seoul_to_utc(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let local = day.and_time(time);
    // Seoul has no DST, so the mapping is always unique.
    match Seoul.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local),
    }
}

fn host_of(raw_url: &str) -> Option<String> {
    let trimmed = raw_url.trim();
    let parsed = url::Url::parse(trimmed)
        .or_else(|_| url::Url::parse(&format!("http://{trimmed}")))
        .ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Vendor display name from a URL's registrable domain label:
/// `https://www.ticketvendor.co.kr/x` gives `ticketvendor`.
pub fn derive_vendor_name(raw_url: &str) -> String {
    let Some(host) = host_of(raw_url) else {
        return raw_url.trim().to_string();
    };
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    let label = if n >= 3 && labels[n - 1].len() == 2 && SECOND_LEVEL_LABELS.contains(&labels[n - 2]) {
        labels[n - 3]
    } else if n >= 2 {
        labels[n - 2]
    } else {
        host.as_str()
    };

    if label.chars().count() >= MIN_VENDOR_NAME_CHARS {
        label.to_string()
    } else {
        host.trim_start_matches("www.").to_string()
    }
}

/// Embedded label when it has at least two characters, else derived from the URL.
pub fn resolve_vendor_name(link: &VendorLink) -> String {
    match link.label.as_deref().map(str::trim) {
        Some(label) if label.chars().count() >= MIN_VENDOR_NAME_CHARS => label.to_string(),
        _ => derive_vendor_name(&link.url),
    }
}

/// Name to URL map; a later link with the same resolved name replaces an
/// earlier one.
pub fn collect_ticket_vendors(links: &[VendorLink]) -> BTreeMap<String, String> {
    let mut vendors = BTreeMap::new();
    for link in links {
        vendors.insert(resolve_vendor_name(link), link.url.trim().to_string());
    }
    vendors
}

/// Only an absent element is fatal; KOPIS often sends blank cast or runtime.
fn required(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| IngestError::MissingField(name.to_string()))
}

/// Builds the enriched record from a listing stub and its detail response.
pub fn enrich(stub: &ListingStub, event_day: NaiveDate, detail: ConcertDetail) -> Result<ConcertRecord> {
    let name = if stub.name.is_empty() {
        required(detail.name, "prfnm")?
    } else {
        stub.name.clone()
    };
    let runtime = required(detail.runtime, "prfruntime")?;
    let cast = required(detail.cast, "prfcast")?;
    let venue = required(detail.venue, "fcltynm")?;

    let showtime = match detail.showtime_guidance.as_deref() {
        Some(guidance) => parse_showtime(guidance),
        None => {
            warn!(external_id = %stub.external_id, "No dtguidance, defaulting showtime to 00:00");
            NaiveTime::MIN
        }
    };
    let starts_at = seoul_to_utc(event_day, showtime);

    let ticket_vendors = detail
        .vendor_links
        .as_deref()
        .map(collect_ticket_vendors)
        .unwrap_or_default();

    let full_posters = match detail.full_posters {
        Some(posters) if !posters.is_empty() => posters,
        _ if !stub.display_poster.is_empty() => vec![stub.display_poster.clone()],
        _ => Vec::new(),
    };

    debug!(
        external_id = %stub.external_id,
        %starts_at,
        vendors = ticket_vendors.len(),
        posters = full_posters.len(),
        "Enriched listing"
    );

    Ok(ConcertRecord {
        external_id: stub.external_id.clone(),
        area: stub.area,
        name,
        event_day,
        starts_at,
        runtime,
        price: detail.price.unwrap_or_default(),
        venue,
        cast,
        program_blurb: detail.program_blurb.unwrap_or_default(),
        display_poster: stub.display_poster.clone(),
        full_posters,
        ticket_vendors,
    })
}
