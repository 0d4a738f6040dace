//! Header normalization: raw header text to typed identity fields.
//!
//! Also hosts the subject reply helpers, RFC 2047 encoded-word decoding and
//! the permissive date parser used for the `Date:` header.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::HeaderConfig;
use crate::error::{MailError, Result};
use crate::model::address::Address;
use crate::model::message::MessageIdentity;
use crate::parser::scanner::RawHeaderMap;

/// One or more leading `re:` / `re[2]:` / `re(2):` markers.
static REPLY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^((re|re[\[(]\d+[\])]):\s*)+").expect("valid regex"));

static ANGLE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^<>]+)>").expect("valid regex"));

static DAY_OF_WEEK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").expect("valid regex")
});

/// `16-JUL-2025` style dates (IMAP INTERNALDATE and some servers).
static DASHED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})-([A-Za-z]{3})-(\d{4})").expect("valid regex"));

/// Trailing `(CET)` style comment.
static TRAILING_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("valid regex"));

const DATE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const NAMED_ZONES: &[(&str, &str)] = &[
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("UT", "+0000"),
    ("CEST", "+0200"),
    ("CET", "+0100"),
    ("JST", "+0900"),
];

/// Build a [`MessageIdentity`] from a scanned header map.
///
/// `message-id` and `date` are checked first: if either is absent or empty,
/// or the date does not parse, the record is rejected before any optional
/// field is derived.
pub fn normalize_headers(raw: &RawHeaderMap, cfg: &HeaderConfig) -> Result<MessageIdentity> {
    let message_id = raw
        .get("message-id")
        .map(sanitize_message_id)
        .filter(|id| !id.is_empty())
        .ok_or(MailError::MissingHeader("message-id"))?;

    let date_raw = raw
        .get("date")
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(MailError::MissingHeader("date"))?;
    let date = parse_date(date_raw).ok_or_else(|| MailError::InvalidDate(date_raw.to_string()))?;

    let subject = match raw.get("subject") {
        Some(s) => collapse_whitespace(&decode_encoded_words(s)),
        None => cfg.default_subject.clone(),
    };

    let references = raw
        .get("references")
        .map(|r| {
            let ids = extract_message_ids(r);
            if ids.is_empty() {
                r.split_whitespace()
                    .map(sanitize_message_id)
                    .filter(|id| !id.is_empty())
                    .collect()
            } else {
                ids
            }
        })
        .unwrap_or_default();

    let list_address = raw.get("list-post").and_then(|post| {
        let post = post.trim();
        let post = post.strip_prefix("<mailto:").unwrap_or(post);
        let post = post.strip_suffix('>').unwrap_or(post);
        single_address(post)
    });

    let recipient_email = ["envelope-to", "x-original-to", "delivered-to"]
        .iter()
        .find_map(|name| raw.get(name))
        .map(str::to_string);

    Ok(MessageIdentity {
        message_id,
        date,
        subject,
        from: raw.get("from").and_then(single_address),
        to: address_list(raw.get("to")),
        cc: address_list(raw.get("cc")),
        bcc: address_list(raw.get("bcc")),
        references,
        in_reply_to: raw
            .get("in-reply-to")
            .map(extract_message_ids)
            .unwrap_or_default(),
        reply_to: raw.get("reply-to").and_then(single_address),
        list_address,
        list_subscribe: raw.get("list-subscribe").map(str::to_string),
        list_unsubscribe: raw.get("list-unsubscribe").map(str::to_string),
        recipient_email,
        source_marked_read: raw.get("status").is_some_and(|s| s.contains('R')),
    })
}

fn single_address(raw: &str) -> Option<Address> {
    let addr = decode_display_name(Address::parse(raw));
    addr.email.contains('@').then_some(addr)
}

/// Split first, decode after: an encoded comma inside a display name must
/// not become a list delimiter.
fn address_list(raw: Option<&str>) -> Vec<Address> {
    raw.map(|r| {
        Address::parse_list(r)
            .into_iter()
            .map(decode_display_name)
            .collect()
    })
    .unwrap_or_default()
}

fn decode_display_name(addr: Address) -> Address {
    if addr.display_name.contains("=?") {
        Address::new(&decode_encoded_words(&addr.display_name), &addr.email)
    } else {
        addr
    }
}

/// Extract the contents of every `<…>` token, sanitized.
pub fn extract_message_ids(s: &str) -> Vec<String> {
    ANGLE_TOKEN
        .captures_iter(s)
        .map(|c| sanitize_message_id(&c[1]))
        .filter(|id| !id.is_empty())
        .collect()
}

/// Reduce a message-id to its bare token: angle brackets, whitespace and
/// non-ASCII characters are removed.
fn sanitize_message_id(raw: &str) -> String {
    let inner = ANGLE_TOKEN
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str());
    inner
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_whitespace() && *c != '<' && *c != '>')
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Subject reply markers ───────────────────────────────────────

/// Whether the subject starts with one or more reply markers.
pub fn is_reply(subject: &str) -> bool {
    REPLY_PREFIX.is_match(subject)
}

/// Strip all leading reply markers: `"re: re[2]: re: Hello"` → `"Hello"`.
pub fn normalize_subj(subject: &str) -> String {
    REPLY_PREFIX.replace(subject, "").into_owned()
}

/// Prefix a single `"Re: "` unless the subject is already a reply.
pub fn reify_subj(subject: &str) -> String {
    if is_reply(subject) {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

// ── Encoded words ───────────────────────────────────────────────

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Decoding is delegated to `mail-parser` through a one-header message. If
/// that fails the input is returned unchanged.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }
    let wrapped = format!("Subject: {input}\r\n\r\n");
    mail_parser::MessageParser::default()
        .parse(wrapped.as_bytes())
        .and_then(|m| m.subject().map(str::to_string))
        .unwrap_or_else(|| input.to_string())
}

// ── Dates ───────────────────────────────────────────────────────

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and many broken real-world variants:
/// missing or long weekday names, trailing zone comments, named zones,
/// `DD-MON-YYYY` dates.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let uncommented = TRAILING_COMMENT.replace(trimmed, "");
    let bare = DAY_OF_WEEK.replace(&uncommented, "").into_owned();
    let dashed = DASHED_DATE
        .replace(&bare, |c: &regex::Captures<'_>| {
            format!("{} {} {}", &c[1], title_case(&c[2]), &c[3])
        })
        .into_owned();

    for candidate in [bare.as_str(), dashed.as_str()] {
        if let Some(dt) = parse_with_formats(candidate) {
            return Some(dt);
        }
        if let Some(dt) = replace_named_zone(candidate).and_then(|c| parse_with_formats(&c)) {
            return Some(dt);
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

fn parse_with_formats(candidate: &str) -> Option<DateTime<Utc>> {
    DATE_FORMATS.iter().find_map(|fmt| {
        DateTime::parse_from_str(candidate, fmt)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(candidate, fmt)
                    .ok()
                    .map(|ndt| Utc.from_utc_datetime(&ndt))
            })
    })
}

/// `"… 10:00:00 EST"` → `"… 10:00:00 -0500"`; `None` if no known zone name ends the string.
fn replace_named_zone(s: &str) -> Option<String> {
    let (head, zone) = s.rsplit_once(' ')?;
    NAMED_ZONES
        .iter()
        .find(|(name, _)| zone.eq_ignore_ascii_case(name))
        .map(|(_, offset)| format!("{head} {offset}"))
}

fn title_case(month: &str) -> String {
    let mut chars = month.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Last resort: let `mail-parser` interpret the value as a `Date:` header.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    if !input.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let wrapped = format!("Date: {input}\r\n\r\n");
    let parsed = mail_parser::MessageParser::default().parse(wrapped.as_bytes())?;
    let date = parsed.date()?;
    if date.year < 1900 || date.month == 0 || date.day == 0 {
        return None;
    }
    let dt = date.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
