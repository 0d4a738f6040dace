//! Integration tests: mbox records through header normalization and body chunking.

use std::path::Path;

use mailchunk::config::{ChunkingConfig, HeaderConfig};
use mailchunk::parser::header::{decode_encoded_words, parse_date};
use mailchunk::parser::mbox;
use mailchunk::parser::scanner::scan_headers;
use mailchunk::{Chunk, ChunkKind, MailError, MboxSource, Message, MessageSource};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Byte offsets of every `From ` separator in a file.
fn record_offsets(path: &Path) -> Vec<u64> {
    let data = std::fs::read(path).unwrap();
    let mut offsets = Vec::new();
    let mut pos = 0usize;
    for line in data.split_inclusive(|&b| b == b'\n') {
        if mbox::is_mbox_separator(line) {
            offsets.push(pos as u64);
        }
        pos += line.len();
    }
    offsets
}

fn load_nth(n: usize) -> (MboxSource<std::fs::File>, mailchunk::Result<Message>) {
    let path = fixture("simple.mbox");
    let offset = record_offsets(&path)[n];
    let mut source = MboxSource::open(&path).unwrap();
    let msg = Message::load(&mut source, offset, &HeaderConfig::default());
    (source, msg)
}

// ─── Framing ────────────────────────────────────────────────────────

#[test]
fn test_simple_mbox_record_count() {
    assert_eq!(record_offsets(&fixture("simple.mbox")).len(), 6);
}

#[test]
fn test_empty_mbox_has_no_records() {
    assert!(record_offsets(&fixture("empty.mbox")).is_empty());
    let mut source = MboxSource::open(fixture("empty.mbox")).unwrap();
    let err = source.load_header(0).unwrap_err();
    assert!(err.is_transport());
}

#[test]
fn test_scanner_stops_at_header_end_in_file() {
    let file = std::fs::File::open(fixture("simple.mbox")).unwrap();
    let mut reader = std::io::BufReader::new(file);
    let headers = scan_headers(&mut reader).unwrap();
    assert_eq!(headers.get("subject"), Some("Hello World"));
    assert_eq!(headers.get("delivered-to"), Some("user2@example.com"));
}

// ─── First record: plain text with signature ───────────────────────

#[test]
fn test_plain_record() {
    let (mut source, msg) = load_nth(0);
    let mut msg = msg.unwrap();
    let id = &msg.identity;
    assert_eq!(id.message_id, "msg001@example.com");
    assert_eq!(id.subject, "Hello World");
    let from = id.from.as_ref().unwrap();
    assert_eq!(from.display_name, "User One");
    assert_eq!(from.email, "user1@example.com");
    assert_eq!(id.to.len(), 2);
    assert_eq!(id.to[1].display_name, "Doe, Jane");
    assert_eq!(id.recipient_email.as_deref(), Some("user2@example.com"));
    assert!(id.source_marked_read);
    assert!(!msg.has_label("unread"));

    let chunks = msg.chunks(&mut source, &ChunkingConfig::default()).to_vec();
    let kinds: Vec<ChunkKind> = chunks.iter().map(Chunk::kind).collect();
    assert_eq!(kinds, vec![ChunkKind::Text, ChunkKind::Signature]);
    assert_eq!(chunks[1].lines()[0], "--");
    assert_eq!(
        msg.snippet(),
        Some("Hi there, This is the first message in the box.")
    );
}

// ─── Second record: multipart reply with attachment ────────────────

#[test]
fn test_multipart_reply_with_attachment() {
    let (mut source, msg) = load_nth(1);
    let mut msg = msg.unwrap();
    assert_eq!(msg.identity.in_reply_to, vec!["msg001@example.com"]);
    assert_eq!(msg.identity.references, vec!["msg001@example.com"]);
    assert_eq!(msg.indexable_subject(), "Hello World");
    assert!(msg.has_label("unread"));

    let chunks = msg.chunks(&mut source, &ChunkingConfig::default()).to_vec();
    let kinds: Vec<ChunkKind> = chunks.iter().map(Chunk::kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChunkKind::Text,
            ChunkKind::Quote,
            ChunkKind::Text,
            ChunkKind::Attachment
        ]
    );
    assert_eq!(
        chunks[1].lines(),
        &[
            "User One wrote:".to_string(),
            "> Hi there,".to_string(),
            "> This is the first message in the box.".to_string(),
        ]
    );

    let Chunk::Attachment(att) = &chunks[3] else {
        panic!("expected attachment, got {:?}", chunks[3]);
    };
    assert_eq!(att.content_type, "application/pdf");
    assert_eq!(att.filename.as_deref(), Some("report.pdf"));
    assert_eq!(att.description, "attachment; filename=\"report.pdf\"");
    assert!(att.part.size > 0);

    // the reference resolves back to the undecoded part
    let tree = source.load_body(msg.locator).unwrap();
    let part = tree.part_at(&att.part.path).unwrap();
    assert!(part.payload().starts_with(b"%PDF"));

    assert_eq!(
        msg.snippet(),
        Some("Thanks for the note. Report attached.")
    );
}

// ─── Third record: encoded words, list headers, Latin-1 body ───────

#[test]
fn test_encoded_headers_and_latin1_body() {
    let (mut source, msg) = load_nth(2);
    let mut msg = msg.unwrap();
    let id = &msg.identity;
    assert_eq!(id.subject, "Café con leña");
    assert_eq!(id.from.as_ref().unwrap().display_name, "José García");
    assert_eq!(
        id.date.format("%Y-%m-%d %H:%M").to_string(),
        "2024-01-03 08:15"
    );
    assert_eq!(
        id.references,
        vec!["msg001@example.com", "msg002@example.com"]
    );
    assert_eq!(
        id.list_address.as_ref().map(|a| a.email.as_str()),
        Some("cafe@lists.example.es")
    );
    assert_eq!(
        id.list_unsubscribe.as_deref(),
        Some("<mailto:cafe-leave@lists.example.es>")
    );

    let chunks = msg.chunks(&mut source, &ChunkingConfig::default());
    assert_eq!(chunks[0].lines()[0], "Hola, ¿qué tal?");
}

// ─── Fourth record: escaped From and legacy block quote ────────────

#[test]
fn test_block_quote_absorbs_rest() {
    let (mut source, msg) = load_nth(3);
    let mut msg = msg.unwrap();
    assert_eq!(
        msg.identity.from.as_ref().unwrap().display_name,
        "User Three"
    );

    let chunks = msg.chunks(&mut source, &ChunkingConfig::default()).to_vec();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].kind(), ChunkKind::Text);
    // a single quoted line is kept as text
    assert!(chunks[0]
        .lines()
        .contains(&">From the archive: nothing changed.".to_string()));
    assert_eq!(chunks[1].kind(), ChunkKind::Quote);
    assert_eq!(chunks[1].lines()[0], "----- Original Message -----");
    assert!(chunks[1]
        .lines()
        .contains(&"Old text that should stay quoted.".to_string()));
    assert_eq!(msg.snippet(), Some("Notes below."));
}

// ─── Records that cannot be indexed ────────────────────────────────

#[test]
fn test_unparseable_date_is_format_error() {
    let (_, msg) = load_nth(4);
    let err = msg.unwrap_err();
    assert!(matches!(err, MailError::InvalidDate(_)));
    assert!(err.is_format());
}

#[test]
fn test_missing_message_id_is_format_error() {
    let (_, msg) = load_nth(5);
    let err = msg.unwrap_err();
    assert!(matches!(err, MailError::MissingHeader("message-id")));
}

// ─── On-disk sources ───────────────────────────────────────────────

#[test]
fn test_source_on_temp_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("copy.mbox");
    std::fs::copy(fixture("simple.mbox"), &path).unwrap();

    let mut source = MboxSource::open(&path).unwrap();
    let mut msg = Message::load(&mut source, 0, &HeaderConfig::default()).unwrap();
    let raw = msg.raw_message(&mut source).unwrap();
    assert!(raw.starts_with(b"From user1@example.com"));
    assert!(raw.ends_with(b"User One\n\n"));

    source.mark_broken("copy removed");
    msg.invalidate();
    let chunks = msg.chunks(&mut source, &ChunkingConfig::default());
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].lines().iter().any(|l| l == "copy removed"));
}

// ─── Header helpers ────────────────────────────────────────────────

#[test]
fn test_date_parsing_formats() {
    let cases = [
        "Mon, 01 Jan 2024 10:00:00 +0000",
        "1 Jan 2024 10:00:00 +0000",
        "Mon, 01 Jan 2024 10:00:00 +0000 (UTC)",
        "2024-01-01T10:00:00Z",
    ];
    for case in cases {
        let dt = parse_date(case).unwrap_or_else(|| panic!("failed to parse '{case}'"));
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 10:00");
    }
    assert!(parse_date("not a date").is_none());
}

#[test]
fn test_decode_encoded_words_base64_utf8() {
    assert_eq!(
        decode_encoded_words("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="),
        "Hola mundo"
    );
}

#[test]
fn test_decode_encoded_words_plain_passthrough() {
    assert_eq!(decode_encoded_words("Just plain"), "Just plain");
}
