use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::SENTINEL;

/// Errors that can occur while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML and no item could be recovered.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// One `<item>` from an RSS document.
///
/// Lives for a single pipeline pass and is never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// `<title>` text, or `N/A` when absent.
    pub title: String,
    pub link: String,
    /// `<description>` text (often HTML), or `N/A` when absent.
    pub description: String,
    /// `<pubDate>` text as published by the feed.
    pub published_raw: Option<String>,
}

impl FeedItem {
    /// Normalized publication date, see [`published_date`].
    pub fn published(&self) -> String {
        published_date(self.published_raw.as_deref())
    }

    /// Publication instant in UTC, when `pubDate` is RFC 2822 (or RFC 3339,
    /// which some feeds emit instead).
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.published_raw.as_deref()?.trim();
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

/// Normalizes a feed date by token position into `DD/Mon/YYYY`.
///
/// - 6 tokens (`Mon, 04 Nov 2024 18:47:32 -0500`) → tokens 1..=3
/// - 3 to 5 tokens (`30 Oct 2024 07:30:08`) → tokens 0..=2
/// - anything shorter, or no date at all → `N/A`
///
/// The tokens are not checked against a calendar; the stored value is the
/// feed's own spelling.
///
/// # Examples
///
/// ```
/// use infobroker::feed::published_date;
///
/// assert_eq!(published_date(Some("Mon, 04 Nov 2024 18:47:32 -0500")), "04/Nov/2024");
/// assert_eq!(published_date(Some("30 Oct 2024 07:30:08")), "30/Oct/2024");
/// assert_eq!(published_date(Some("")), "N/A");
/// ```
pub fn published_date(raw: Option<&str>) -> String {
    let parts: Vec<&str> = raw.unwrap_or_default().split_whitespace().collect();
    match parts.len() {
        6 => format!("{}/{}/{}", parts[1], parts[2], parts[3]),
        n if n >= 3 => format!("{}/{}/{}", parts[0], parts[1], parts[2]),
        _ => SENTINEL.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    /// Fields whose first element has ended; repeats are ignored.
    closed: [bool; 4],
}

impl ItemBuilder {
    fn close(&mut self, field: Field) {
        self.closed[field as usize] = true;
    }

    fn push(&mut self, field: Field, text: &str) {
        if self.closed[field as usize] {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    fn build(self) -> Option<FeedItem> {
        let link = self
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())?;
        let or_sentinel = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| SENTINEL.to_string())
        };
        Some(FeedItem {
            title: or_sentinel(self.title),
            link,
            description: or_sentinel(self.description),
            published_raw: self
                .pub_date
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        })
    }
}

/// Extracts every `<item>` element from an RSS document.
///
/// Items are found at any depth. Only the direct `title`, `link`,
/// `description` and `pubDate` children are read; text and CDATA are
/// concatenated and entity-unescaped. When a child repeats, the first one
/// wins. Items without a link are dropped with a
/// warning.
///
/// Recovery is best-effort: if the document breaks after some items were read,
/// those items are returned and the error is logged. A document that fails
/// before yielding any item is a [`ParseError`].
pub fn parse_items(bytes: &[u8]) -> Result<Vec<FeedItem>, ParseError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, only the
    // five XML builtins; custom entities fail in `unescape()`.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut skipped = 0usize;
    let mut buf = Vec::new();

    let mut current: Option<ItemBuilder> = None;
    // Depth below the current <item>; fields are only read at depth 1.
    let mut depth: usize = 0;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if current.is_some() {
                    depth += 1;
                    if depth == 1 {
                        field = Field::from_name(e.name().as_ref());
                    }
                } else if e.name().as_ref() == b"item" {
                    current = Some(ItemBuilder::default());
                    depth = 0;
                    field = None;
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() {
                    if depth == 0 && e.name().as_ref() == b"item" {
                        if let Some(item) = current.take().and_then(ItemBuilder::build) {
                            items.push(item);
                        } else {
                            skipped += 1;
                        }
                    } else {
                        if depth == 1 {
                            if let (Some(item), Some(f)) = (current.as_mut(), field.take()) {
                                item.close(f);
                            }
                        }
                        depth = depth.saturating_sub(1);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    match e.unescape() {
                        Ok(text) => item.push(f, &text),
                        Err(err) => {
                            tracing::debug!(error = %err, "Unescape failed, keeping raw text");
                            item.push(f, &String::from_utf8_lossy(&e));
                        }
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let position = reader.error_position();
                if items.is_empty() {
                    return Err(ParseError::Xml {
                        position,
                        message: e.to_string(),
                    });
                }
                tracing::warn!(
                    position = position,
                    recovered = items.len(),
                    error = %e,
                    "Feed XML is malformed, keeping items parsed so far"
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if skipped > 0 {
        tracing::warn!(skipped = skipped, "Feed items without a link skipped");
    }

    Ok(items)
}
