/// Administrative area codes (`signgucode`) queried for every date, with the
/// region name KOPIS uses for them.
pub const AREAS: [(u16, &str); 17] = [
    (11, "서울특별시"),
    (26, "부산광역시"),
    (27, "대구광역시"),
    (28, "인천광역시"),
    (29, "광주광역시"),
    (30, "대전광역시"),
    (31, "울산광역시"),
    (36, "세종특별자치시"),
    (41, "경기도"),
    (43, "충청북도"),
    (44, "충청남도"),
    (45, "전라북도"),
    (46, "전라남도"),
    (47, "경상북도"),
    (48, "경상남도"),
    (50, "제주특별자치도"),
    (51, "강원특별자치도"),
];

/// Region name for an area code, if it is one we query.
pub fn area_name(code: u16) -> Option<&'static str> {
    AREAS
        .iter()
        .find(|(area, _)| *area == code)
        .map(|(_, name)| *name)
}

// KOPIS open API
pub const KOPIS_API_BASE: &str = "http://www.kopis.or.kr/openApi/restful";
pub const KOPIS_CLASSICAL_GENRE: &str = "CCCA";
pub const KOPIS_PAGE_ROWS: u32 = 100;
pub const DISPLAY_POSTER_BASE: &str = "http://www.kopis.or.kr/upload/pfmPoster/";
pub const FULL_POSTER_BASE: &str = "http://www.kopis.or.kr/upload/pfmIntroImage/";

/// Date format used on the command line and in KOPIS queries.
pub const API_DATE_FORMAT: &str = "%Y%m%d";
/// Format of the stored UTC start instant.
pub const STORED_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Days ahead of "now" ingested by a scheduled run.
pub const SCHEDULED_LOOKAHEAD_DAYS: i64 = 60;

// Local storage
pub const DEFAULT_DATABASE_PATH: &str = "concertfinder.sqlite3";
pub const DEFAULT_MEDIA_ROOT: &str = "media";
pub const DISPLAY_POSTER_DIR: &str = "display_poster";
pub const FULL_POSTER_DIR: &str = "full_poster";

// Extraction service
pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";
pub const DEFAULT_MAX_TOKENS: u32 = 300;

/// Suffix ("and others") KOPIS appends to truncated cast lists.
pub const CAST_ETC_SUFFIX: &str = " 등";
pub const CAST_SEPARATOR: &str = ", ";
