//! Temporal extraction: find human-written date/time mentions in post text,
//! resolve them to absolute instants and rewrite the text around them.
//!
//! The title is scanned first. Its first resolved time becomes the entry's
//! event time and is removed from the title. The content blocks are then
//! scanned in order with a fresh [`ScanState`]: the first body time is removed
//! silently when it agrees with the title (or the title had none) and is
//! replaced by a "differs" annotation otherwise. Every later mention, in the
//! title or the body, is rewritten to chat timestamp markup.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Entry, EventTime, ExtractedEntry};
use crate::render::{differs_annotation, full_timestamp};

const DATE_FIELD: &str = r"(?:\d{1,2}(?:st|nd|rd|th)|\d{1,4}|[A-Za-z]{3,9})";
const TIME_PATTERN: &str = r"\d{1,2}[:.h]?\d{2}\s*(?:[aApP][mM])?";
const ZONE_PATTERN: &str = r"(?:Z|[A-Z]{2,5})";
const BRACKETED_ZONE_PATTERN: &str = r"(?i:Z|[A-Z]{2,5})";
const BRACKET_OPENED: &str = r"[\[\(\{<]";
const BRACKET_CLOSED: &str = r"[\]\)\}>]";
const BRACKET_CHARS: &[char] = &['[', '(', '{', '<', ']', ')', '}', '>'];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Where an occurrence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Title,
    Content(usize),
}

/// A single date/time mention that could not be turned into an instant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse {input:?}: {reason}")]
pub struct ParseFailure {
    pub input: String,
    pub reason: String,
}

impl ParseFailure {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(EventTime),
    Failed(ParseFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub location: Location,
    pub matched: String,
    pub resolution: Resolution,
}

/// Mutable extraction state threaded from the title scan into the body scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub first_time: Option<EventTime>,
    pub title_time: Option<EventTime>,
}

impl ScanState {
    /// State for the body scan, seeded with whatever the title produced.
    pub fn after_title(self) -> Self {
        Self {
            first_time: None,
            title_time: self.first_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub title: String,
    pub content: Vec<String>,
    pub parsed_time: Option<EventTime>,
    pub occurrences: Vec<Occurrence>,
}

impl Extraction {
    pub fn failures(&self) -> impl Iterator<Item = &ParseFailure> {
        self.occurrences
            .iter()
            .filter_map(|occurrence| match &occurrence.resolution {
                Resolution::Failed(failure) => Some(failure),
                Resolution::Resolved(_) => None,
            })
    }
}

#[derive(Debug)]
struct Candidate {
    start: usize,
    end: usize,
    date: String,
    time: String,
}

#[derive(Debug, Clone)]
pub struct TemporalExtractor {
    date_time: Regex,
    time_date: Regex,
    default_zone: Tz,
}

impl TemporalExtractor {
    /// `default_zone` applies to times written without a recognizable zone.
    pub fn new(default_zone: Tz) -> Self {
        let date = format!(r"(?P<date>\b{DATE_FIELD}[-./]{DATE_FIELD}[-./]{DATE_FIELD})");
        let tz_bracket =
            format!("(?:{BRACKET_OPENED}{BRACKETED_ZONE_PATTERN}{BRACKET_CLOSED})");
        // Bare lowercase zones are limited to known abbreviations so words
        // like "at" or "west" are not taken for a zone.
        let known_lowercase = ZONE_OFFSETS
            .iter()
            .map(|(name, _)| name.to_ascii_lowercase())
            .filter(|name| name.len() >= 3 && name != "west")
            .collect::<Vec<_>>()
            .join("|");
        // The bracketed zone is tried first so a bracket around the whole
        // expression is not mistaken for one around the zone.
        let tz_capture = format!(r"(?:{tz_bracket}|(?:{ZONE_PATTERN}|{known_lowercase})\b)");
        let time_with_zone = format!(r"(?P<time>{TIME_PATTERN}\s*{tz_capture}?)");

        let date_time = format!(
            r"{BRACKET_OPENED}?\s*(?P<datetime>{date}(?:\s*|T){time_with_zone})\s*{BRACKET_CLOSED}?"
        );
        let time_date = format!(
            r"{BRACKET_OPENED}?\s*(?P<datetime>{time_with_zone}\s*{date})\s*{BRACKET_CLOSED}?"
        );

        Self {
            date_time: Regex::new(&date_time).expect("date-time pattern"),
            time_date: Regex::new(&time_date).expect("time-date pattern"),
            default_zone,
        }
    }

    pub fn default_zone(&self) -> Tz {
        self.default_zone
    }

    /// Rewrites a copy of `title` and `content`; the inputs are untouched.
    pub fn extract(&self, title: &str, content: &[String]) -> Extraction {
        let mut occurrences = Vec::new();

        let (title, state) =
            self.scan_text(title, Location::Title, ScanState::default(), &mut occurrences);

        let mut state = state.after_title();
        let mut rewritten = Vec::with_capacity(content.len());
        for (index, block) in content.iter().enumerate() {
            let (text, next) =
                self.scan_text(block, Location::Content(index), state, &mut occurrences);
            rewritten.push(text);
            state = next;
        }

        Extraction {
            title,
            content: rewritten,
            parsed_time: state.title_time.or(state.first_time),
            occurrences,
        }
    }

    pub fn extract_entry(&self, entry: &Entry) -> ExtractedEntry {
        let extraction = self.extract(&entry.title, &entry.content);
        let mut rewritten = entry.clone();
        rewritten.title = extraction.title;
        rewritten.content = extraction.content;
        ExtractedEntry {
            entry: rewritten,
            parsed_time: extraction.parsed_time,
        }
    }

    /// Scans one text, returning the rewritten text and the updated state.
    pub fn scan_text(
        &self,
        text: &str,
        location: Location,
        mut state: ScanState,
        occurrences: &mut Vec<Occurrence>,
    ) -> (String, ScanState) {
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        for candidate in self.candidates(text) {
            output.push_str(&text[cursor..candidate.start]);
            let matched = &text[candidate.start..candidate.end];

            let resolution = match self.resolve(&candidate.date, &candidate.time) {
                Ok(time) => {
                    let replacement = if state.first_time.is_none() {
                        state.first_time = Some(time);
                        match state.title_time {
                            Some(title_time) if title_time != time => differs_annotation(&time),
                            _ => String::new(),
                        }
                    } else {
                        full_timestamp(&time)
                    };
                    output.push_str(&replacement);
                    Resolution::Resolved(time)
                }
                Err(failure) => {
                    warn!(?location, error = %failure, "Leaving unparseable timestamp in place");
                    output.push_str(matched);
                    Resolution::Failed(failure)
                }
            };

            occurrences.push(Occurrence {
                location,
                matched: matched.to_string(),
                resolution,
            });
            cursor = candidate.end;
        }

        output.push_str(&text[cursor..]);
        (output, state)
    }

    /// Matches of both shapes in reading order, without overlaps.
    fn candidates(&self, text: &str) -> Vec<Candidate> {
        let mut found: Vec<(Candidate, u8)> = Vec::new();
        for (priority, regex) in [(0u8, &self.date_time), (1u8, &self.time_date)] {
            for caps in regex.captures_iter(text) {
                if let Some(candidate) = candidate_from(&caps) {
                    found.push((candidate, priority));
                }
            }
        }
        found.sort_by_key(|(candidate, priority)| (candidate.start, *priority));

        let mut accepted: Vec<Candidate> = Vec::new();
        for (candidate, _) in found {
            let overlaps = accepted
                .last()
                .is_some_and(|previous| candidate.start < previous.end);
            if !overlaps {
                accepted.push(candidate);
            }
        }
        accepted
    }

    fn resolve(&self, date: &str, time: &str) -> Result<EventTime, ParseFailure> {
        let normalized = normalize_time(time);
        let combined = format!("{date} {normalized}");
        debug!(timestamp = %combined, "Parsing timestamp");

        let day = parse_date(date).map_err(|reason| ParseFailure::new(&combined, reason))?;
        let (clock, zone) =
            parse_time(&normalized).map_err(|reason| ParseFailure::new(&combined, reason))?;
        let naive = NaiveDateTime::new(day, clock);

        match zone.as_deref().and_then(zone_offset) {
            Some(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| ParseFailure::new(&combined, "time does not exist in zone")),
            None => {
                if let Some(unknown) = zone.as_deref() {
                    debug!(zone = unknown, "Unknown zone annotation; using default zone");
                }
                let local = self
                    .default_zone
                    .from_local_datetime(&naive)
                    .earliest()
                    .ok_or_else(|| {
                        ParseFailure::new(&combined, "local time skipped by a zone transition")
                    })?;
                let offset = local.offset().fix();
                Ok(local.with_timezone(&offset))
            }
        }
    }
}

fn candidate_from(caps: &Captures<'_>) -> Option<Candidate> {
    let whole = caps.get(0)?;
    Some(Candidate {
        start: whole.start(),
        end: whole.end(),
        date: caps.name("date")?.as_str().to_string(),
        time: caps.name("time")?.as_str().to_string(),
    })
}

/// Cleans a raw time fragment before parsing: strips brackets, maps a `24`
/// hour to `00` and pads a separator-less three digit time (`930` -> `0930`).
pub fn normalize_time(raw: &str) -> String {
    let mut time: String = raw
        .trim()
        .chars()
        .filter(|ch| !BRACKET_CHARS.contains(ch))
        .collect();

    if has_hour_24(&time) {
        time.replace_range(0..2, "00");
    }

    let bytes = time.as_bytes();
    let three_digits = bytes.len() >= 3
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && bytes.get(3).is_none_or(|next| !next.is_ascii_digit());
    if three_digits {
        time.insert(0, '0');
    }

    time
}

fn has_hour_24(time: &str) -> bool {
    let Some(rest) = time.strip_prefix("24") else {
        return false;
    };
    let rest = rest
        .strip_prefix([':', '.', 'h'])
        .unwrap_or(rest);
    let bytes = rest.as_bytes();
    bytes.len() >= 2 && bytes[..2].iter().all(u8::is_ascii_digit)
}

#[derive(Debug, Clone, Copy)]
enum DateField {
    Number { value: u32, digits: usize },
    Month(u32),
}

impl DateField {
    fn parse(raw: &str) -> Result<Self, String> {
        let lower = raw.to_ascii_lowercase();
        let digits_part = ["st", "nd", "rd", "th"]
            .iter()
            .find_map(|suffix| lower.strip_suffix(suffix))
            .filter(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(lower.as_str());

        if !digits_part.is_empty() && digits_part.chars().all(|ch| ch.is_ascii_digit()) {
            let value = digits_part
                .parse::<u32>()
                .map_err(|err| format!("bad number {raw:?}: {err}"))?;
            return Ok(DateField::Number {
                value,
                digits: digits_part.len(),
            });
        }

        if lower.len() >= 3 && lower.chars().all(|ch| ch.is_ascii_alphabetic()) {
            if let Some(index) = MONTHS.iter().position(|month| lower.starts_with(month)) {
                return Ok(DateField::Month(index as u32 + 1));
            }
        }

        Err(format!("unrecognized date field {raw:?}"))
    }

    fn number(self) -> Option<u32> {
        match self {
            DateField::Number { value, .. } => Some(value),
            DateField::Month(_) => None,
        }
    }

    fn is_year_like(self) -> bool {
        matches!(self, DateField::Number { value, digits } if digits >= 3 || value > 31)
    }
}

/// Lenient three-field date parsing with month-first precedence.
fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let fields = raw
        .split(['-', '.', '/'])
        .map(DateField::parse)
        .collect::<Result<Vec<_>, _>>()?;
    let &[a, b, c] = fields.as_slice() else {
        return Err(format!("expected three date fields in {raw:?}"));
    };

    let month_positions: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, field)| matches!(field, DateField::Month(_)))
        .map(|(index, _)| index)
        .collect();

    let (year, month, day) = match month_positions.as_slice() {
        [] => {
            let (a, b, c) = (
                a.number().unwrap_or_default(),
                b.number().unwrap_or_default(),
                c.number().unwrap_or_default(),
            );
            if fields[0].is_year_like() {
                if b > 12 { (a, c, b) } else { (a, b, c) }
            } else if fields[1].is_year_like() && !fields[2].is_year_like() {
                if a > 12 { (b, c, a) } else { (b, a, c) }
            } else if a > 12 {
                (c, b, a)
            } else {
                (c, a, b)
            }
        }
        [position] => {
            let month = match fields[*position] {
                DateField::Month(month) => month,
                DateField::Number { value, .. } => value,
            };
            let rest: Vec<DateField> = fields
                .iter()
                .enumerate()
                .filter(|(index, _)| index != position)
                .map(|(_, field)| *field)
                .collect();
            let (first, second) = (rest[0], rest[1]);
            let (year, day) = if first.is_year_like() && !second.is_year_like() {
                (first, second)
            } else {
                (second, first)
            };
            (
                year.number().unwrap_or_default(),
                month,
                day.number().unwrap_or_default(),
            )
        }
        _ => return Err(format!("more than one month name in {raw:?}")),
    };

    let year = if year < 100 { 2000 + year } else { year };
    let year = i32::try_from(year).map_err(|_| format!("year out of range in {raw:?}"))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("no such date {year:04}-{month:02}-{day:02}"))
}

/// Parses a normalized time, returning the clock time and any zone text.
fn parse_time(raw: &str) -> Result<(NaiveTime, Option<String>), String> {
    let digits_end = raw
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(raw.len());
    let (hour_text, minute_text, rest) = if digits_end == 4 {
        (&raw[..2], &raw[2..4], &raw[4..])
    } else if digits_end == 1 || digits_end == 2 {
        let after = raw[digits_end..]
            .strip_prefix([':', '.', 'h'])
            .ok_or_else(|| format!("missing separator in {raw:?}"))?;
        if after.len() < 2 || !after.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
            return Err(format!("missing minutes in {raw:?}"));
        }
        (&raw[..digits_end], &after[..2], &after[2..])
    } else {
        return Err(format!("unrecognized time {raw:?}"));
    };

    let mut hour: u32 = hour_text
        .parse()
        .map_err(|err| format!("bad hour in {raw:?}: {err}"))?;
    let minute: u32 = minute_text
        .parse()
        .map_err(|err| format!("bad minute in {raw:?}: {err}"))?;

    let mut rest = rest.trim_start();
    let meridiem = rest
        .get(..2)
        .map(str::to_ascii_lowercase)
        .filter(|marker| marker == "am" || marker == "pm");
    if let Some(marker) = meridiem {
        if hour == 0 || hour > 12 {
            return Err(format!("hour {hour} is not valid with {marker}"));
        }
        hour = match (marker.as_str(), hour) {
            ("am", 12) => 0,
            ("pm", 12) => 12,
            ("pm", h) => h + 12,
            (_, h) => h,
        };
        rest = &rest[2..];
    }

    let clock = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| format!("no such time {hour:02}:{minute:02}"))?;
    let zone = Some(rest.trim().to_string()).filter(|zone| !zone.is_empty());
    Ok((clock, zone))
}

/// Offsets in minutes for zone abbreviations commonly written in posts.
const ZONE_OFFSETS: &[(&str, i32)] = &[
    ("Z", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("UT", 0),
    ("WET", 0),
    ("BST", 60),
    ("WEST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("MSK", 180),
    ("IST", 330),
    ("AWST", 480),
    ("JST", 540),
    ("KST", 540),
    ("ACST", 570),
    ("AEST", 600),
    ("ACDT", 630),
    ("AEDT", 660),
    ("NZST", 720),
    ("NZDT", 780),
    ("HST", -600),
    ("AKST", -540),
    ("AKDT", -480),
    ("PST", -480),
    ("PDT", -420),
    ("MST", -420),
    ("MDT", -360),
    ("CST", -360),
    ("CDT", -300),
    ("EST", -300),
    ("EDT", -240),
    ("AST", -240),
    ("ADT", -180),
];

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.to_ascii_uppercase();
    let (_, minutes) = ZONE_OFFSETS.iter().find(|(name, _)| *name == zone)?;
    FixedOffset::east_opt(minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;

    fn at(rfc3339: &str) -> EventTime {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn utc_extractor() -> TemporalExtractor {
        TemporalExtractor::new(UTC)
    }

    #[test]
    fn normalizes_hour_24() {
        assert_eq!(normalize_time("24:30"), "00:30");
        assert_eq!(normalize_time("24.15pm"), "00.15pm");
        assert_eq!(normalize_time("2400"), "0000");
        assert_eq!(normalize_time("24h05 UTC"), "00h05 UTC");
        assert_eq!(normalize_time("23:30"), "23:30");
    }

    #[test]
    fn pads_three_digit_times() {
        assert_eq!(normalize_time("930"), "0930");
        assert_eq!(normalize_time("930pm"), "0930pm");
        assert_eq!(normalize_time(" 815 EST"), "0815 EST");
        assert_eq!(normalize_time("1930"), "1930");
        assert_eq!(normalize_time("9:30"), "9:30");
    }

    #[test]
    fn strips_brackets() {
        assert_eq!(normalize_time("18:00 (UTC)"), "18:00 UTC");
        assert_eq!(normalize_time("[245]"), "0245");
    }

    #[test]
    fn parses_dates_leniently() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(parse_date("2024-05-01"), Ok(day(2024, 5, 1)));
        assert_eq!(parse_date("05/01/2024"), Ok(day(2024, 5, 1)));
        assert_eq!(parse_date("25.12.2024"), Ok(day(2024, 12, 25)));
        assert_eq!(parse_date("12/25/24"), Ok(day(2024, 12, 25)));
        assert_eq!(parse_date("3-Mar-24"), Ok(day(2024, 3, 3)));
        assert_eq!(parse_date("2024/Jun/7th"), Ok(day(2024, 6, 7)));
        assert_eq!(parse_date("2024-31-12"), Ok(day(2024, 12, 31)));
        assert!(parse_date("v1.2.3").is_err());
        assert!(parse_date("02/30/2024").is_err());
    }

    #[test]
    fn parses_times() {
        let clock = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(parse_time("18:00"), Ok((clock(18, 0), None)));
        assert_eq!(parse_time("0930"), Ok((clock(9, 30), None)));
        assert_eq!(parse_time("6.30pm"), Ok((clock(18, 30), None)));
        assert_eq!(parse_time("12:15 am"), Ok((clock(0, 15), None)));
        assert_eq!(parse_time("12h00PM"), Ok((clock(12, 0), None)));
        assert_eq!(
            parse_time("20:00 EST"),
            Ok((clock(20, 0), Some("EST".to_string())))
        );
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("13:00pm").is_err());
    }

    #[test]
    fn title_time_is_consumed() {
        let extraction = utc_extractor().extract("Raid 2024-05-01 18:00 UTC tonight", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00Z")));
        assert_eq!(extraction.title, "Raidtonight");
        assert_eq!(extraction.occurrences.len(), 1);
        assert_eq!(extraction.occurrences[0].location, Location::Title);
    }

    #[test]
    fn bracketed_expression_is_consumed_whole() {
        let extraction = utc_extractor().extract("Raid [05/01/2024 6:00pm (EST)]", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00-05:00")));
        assert_eq!(extraction.title, "Raid ");
    }

    #[test]
    fn lowercase_zones_are_recognized() {
        let extractor = TemporalExtractor::new(New_York);

        let bare = extractor.extract("Raid 05/01/2024 6:00pm est", &[]);
        assert_eq!(bare.parsed_time, Some(at("2024-05-01T18:00:00-05:00")));
        assert_eq!(bare.title, "Raid");

        let bracketed = extractor.extract("Raid 05/01/2024 6:00pm (pst)", &[]);
        assert_eq!(bracketed.parsed_time, Some(at("2024-05-01T18:00:00-08:00")));
        assert_eq!(bracketed.title, "Raid");
    }

    #[test]
    fn lowercase_words_are_not_zones() {
        let extraction =
            TemporalExtractor::new(New_York).extract("Raid 05/01/2024 6:00pm at the keep", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00-04:00")));
        assert_eq!(extraction.title, "Raidat the keep");
    }

    #[test]
    fn time_before_date_is_recognized() {
        let extraction = utc_extractor().extract("Meet at 18:30 2024-06-02", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-06-02T18:30:00Z")));
        assert_eq!(extraction.title, "Meet at");
    }

    #[test]
    fn iso_t_separator() {
        let extraction = utc_extractor().extract("Event 2024-06-02T0930", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-06-02T09:30:00Z")));
    }

    #[test]
    fn default_zone_applies_without_annotation() {
        let extraction = TemporalExtractor::new(New_York).extract("Run 2024-07-04 20:00", &[]);
        assert_eq!(extraction.parsed_time, Some(at("2024-07-04T20:00:00-04:00")));
    }

    #[test]
    fn body_time_used_when_title_has_none() {
        let content = vec!["Starts 2024-05-01 18:00 sharp".to_string()];
        let extraction = utc_extractor().extract("Raid night", &content);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00Z")));
        assert_eq!(extraction.title, "Raid night");
        assert_eq!(extraction.content, vec!["Startssharp".to_string()]);
    }

    #[test]
    fn matching_body_time_is_consumed() {
        let content = vec!["Starts 2024-05-01 18:00, be early".to_string()];
        let extraction = utc_extractor().extract("Raid 2024-05-01 18:00", &content);
        assert_eq!(extraction.content, vec!["Starts, be early".to_string()]);
    }

    #[test]
    fn differing_body_time_is_annotated() {
        let content = vec!["Actually 2024-05-01 19:00".to_string()];
        let extraction = utc_extractor().extract("Raid 2024-05-01 18:00", &content);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00Z")));
        let body_time = at("2024-05-01T19:00:00Z");
        assert_eq!(
            extraction.content,
            vec![format!("Actually{}", differs_annotation(&body_time))]
        );
    }

    #[test]
    fn later_mentions_are_rendered() {
        let content = vec![
            "Doors 2024-05-01 17:30.".to_string(),
            "Afterparty 2024-05-01 23:00!".to_string(),
        ];
        let extraction =
            utc_extractor().extract("Raid 2024-05-01 18:00 / backup 2024-05-02 18:00", &content);
        let backup = at("2024-05-02T18:00:00Z");
        let doors = at("2024-05-01T17:30:00Z");
        let after = at("2024-05-01T23:00:00Z");
        assert_eq!(extraction.title, format!("Raid/ backup{}", full_timestamp(&backup)));
        assert_eq!(extraction.content[0], format!("Doors{}.", differs_annotation(&doors)));
        assert_eq!(extraction.content[1], format!("Afterparty{}!", full_timestamp(&after)));
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00Z")));
    }

    #[test]
    fn failures_are_collected_and_left_in_place() {
        let content = vec!["Typo 2024-13-45 10:30 then 2024-05-01 18:00".to_string()];
        let extraction = utc_extractor().extract("No time here", &content);
        assert_eq!(extraction.failures().count(), 1);
        assert_eq!(extraction.parsed_time, Some(at("2024-05-01T18:00:00Z")));
        assert!(extraction.content[0].contains("2024-13-45 10:30"));
    }

    #[test]
    fn nothing_found_leaves_time_unset() {
        let content = vec!["See you after 6pm".to_string()];
        let extraction = utc_extractor().extract("Hangout", &content);
        assert_eq!(extraction.parsed_time, None);
        assert!(extraction.occurrences.is_empty());
        assert_eq!(extraction.content, content);
    }

    #[test]
    fn extract_entry_leaves_input_untouched() {
        let entry = Entry::new(Some("t3_a".into()), "https://example.com/a", "Raid 2024-05-01 18:00")
            .with_content(["Again 2024-05-01 19:00"]);
        let snapshot = entry.clone();
        let extracted = utc_extractor().extract_entry(&entry);
        assert_eq!(entry, snapshot);
        assert_eq!(extracted.entry.id, "t3_a");
        assert_eq!(extracted.entry.title, "Raid");
        assert_eq!(extracted.parsed_time, Some(at("2024-05-01T18:00:00Z")));
    }

    #[test]
    fn state_resets_between_title_and_body() {
        let title_state = ScanState {
            first_time: Some(at("2024-05-01T18:00:00Z")),
            title_time: None,
        };
        assert_eq!(
            title_state.after_title(),
            ScanState {
                first_time: None,
                title_time: Some(at("2024-05-01T18:00:00Z")),
            }
        );
    }
}
