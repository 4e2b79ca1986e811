//! Chat rendering for extracted entries, plus the timestamp markup the
//! extractor writes back into post text.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{EventTime, ExtractedEntry};

/// Discord rejects message content longer than this many characters.
pub const MAX_CONTENT_CHARS: usize = 2000;
/// More images than this are left as plain links instead of embeds.
pub const MAX_INLINE_IMAGES: usize = 4;
pub const ACCENT_COLOR: u32 = 0x4444CC;

const BODY_SEPARATOR: &str = "\n━━━━━━━━━━━━━━━━━━━━\n";
const BLOCK_DELIMITER: &str = "---";
const UNKNOWN_CATEGORY: &str = "(Unknown source!)";

static IMAGE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(https?://[^\s'"]+\.(?:jpg|jpeg|png|gif|bmp|webp|svg)(?:\?[^\s'"]*)?)>"#)
        .expect("image link pattern")
});

/// `<t:UNIX:STYLE>` markup, rendered client-side in the reader's own zone.
pub fn chat_timestamp(time: &EventTime, style: char) -> String {
    format!("<t:{}:{}>", time.timestamp(), style)
}

/// Absolute plus relative display, e.g. `<t:1714600800:F> (<t:1714600800:R>)`.
pub fn full_timestamp(time: &EventTime) -> String {
    format!("{} ({})", chat_timestamp(time, 'F'), chat_timestamp(time, 'R'))
}

pub fn differs_annotation(time: &EventTime) -> String {
    format!("Time in body is different: {}", full_timestamp(time))
}

/// Links shown in the message footer once the calendar call has succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarLinks {
    pub event: Option<String>,
    pub calendar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub content: String,
    pub images: Vec<String>,
    pub accent_color: u32,
}

pub fn render_entry(extracted: &ExtractedEntry, links: &CalendarLinks) -> ChatMessage {
    let entry = &extracted.entry;
    let category = entry.category().unwrap_or(UNKNOWN_CATEGORY);

    let mut header = format!(
        "New Post in {category}!\n# [{}]({})",
        entry.title.trim(),
        entry.link
    );
    if let Some(time) = &extracted.parsed_time {
        header.push_str(&format!("\n## Time: {}", full_timestamp(time)));
    }

    let blocks: Vec<&str> = entry
        .content
        .iter()
        .flat_map(|content| content.split(BLOCK_DELIMITER))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let joined = blocks.join(BODY_SEPARATOR);

    let urls: Vec<String> = IMAGE_LINK_RE
        .captures_iter(&joined)
        .map(|caps| caps[1].to_string())
        .collect();
    let (body, images) = if !urls.is_empty() && urls.len() <= MAX_INLINE_IMAGES {
        let stripped = IMAGE_LINK_RE.replace_all(&joined, "").trim().to_string();
        (stripped, urls)
    } else {
        (joined, Vec::new())
    };

    let footer = render_footer(extracted, links);

    ChatMessage {
        content: compose(&header, &body, &footer),
        images,
        accent_color: ACCENT_COLOR,
    }
}

fn render_footer(extracted: &ExtractedEntry, links: &CalendarLinks) -> String {
    let mut footer = String::new();
    if links.event.is_some() || links.calendar.is_some() {
        footer.push_str("Google Calendar:");
        if let Some(event) = &links.event {
            footer.push_str(&format!(" [[Specific Event]]({event})"));
        }
        if let Some(calendar) = &links.calendar {
            footer.push_str(&format!(" [[Whole Calendar]]({calendar})"));
        }
        footer.push('\n');
    }

    let author = extracted.entry.author.as_ref();
    let name = author
        .and_then(|author| author.name.as_deref())
        .unwrap_or("unknown");
    match author.and_then(|author| author.link.as_deref()) {
        Some(href) => footer.push_str(&format!("submitted by [{name}]({href})")),
        None => footer.push_str(&format!("submitted by {name}")),
    }
    footer
}

fn compose(header: &str, body: &str, footer: &str) -> String {
    let full = join_sections(header, body, footer);
    if full.chars().count() <= MAX_CONTENT_CHARS {
        return full;
    }

    let fixed = join_sections(header, "", footer).chars().count();
    let budget = MAX_CONTENT_CHARS.saturating_sub(fixed + 1);
    let mut truncated: String = body.chars().take(budget).collect();
    truncated.push('…');
    let shortened = join_sections(header, &truncated, footer);
    if shortened.chars().count() <= MAX_CONTENT_CHARS {
        shortened
    } else {
        shortened.chars().take(MAX_CONTENT_CHARS).collect()
    }
}

fn join_sections(header: &str, body: &str, footer: &str) -> String {
    if body.is_empty() {
        format!("{header}\n\n{footer}")
    } else {
        format!("{header}\n\n{body}\n\n{footer}")
    }
}
