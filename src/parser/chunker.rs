//! Body chunker: segments plain-text bodies into text, quote and signature
//! chunks, and derives the preview snippet along the way.
//!
//! Classification is a small state machine over lines. The heuristics live
//! in two rule tables ([`next_state`] consults them) so each rule can be
//! tested without the line-iteration plumbing. A rule may look one line
//! ahead, at the next non-blank line only.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::ChunkingConfig;
use crate::model::chunk::Chunk;

/// `>`, `|` or `}` after at most four spaces.
static QUOTE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,4}[>|}]").expect("valid regex"));

/// Attribution lines that usually introduce a quotation.
static QUOTE_INTRO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(^\s*(excerpts from|in article|in message|in reply to|quoting)\b)|(\b(wrote|writes|said)\s*:\s*$)|(^\s*on\b.*:\s*$)",
    )
    .expect("valid regex")
});

static SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(^(- )*-- ?$)|(^\s*----------+\s*$)|(^\s*_________+\s*$)|(^\s*--~--~-)|(^\s*--\+\+\*\*==)",
    )
    .expect("valid regex")
});

static BLOCK_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^-----\s*original message\s*----+\s*$").expect("valid regex"));

static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*$").expect("valid regex"));

/// Rules, banners and other lines that say nothing about the message.
static DECORATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=*#_-]{3,}").expect("valid regex"));

/// Classification state of the line being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Text,
    Quote,
    /// Everything after a legacy "Original Message" delimiter.
    BlockQuote,
    Signature,
}

/// Extra condition a rule puts on the surroundings of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Always,
    /// The next non-blank line is a quote marker or another introduction.
    NextOpensQuote,
    /// The line is within the trailing signature window.
    NearEnd,
}

struct Rule {
    pattern: &'static Lazy<Regex>,
    guard: Guard,
    target: ChunkState,
}

/// Tried in order while in Text; no match stays in Text.
static TEXT_RULES: [Rule; 4] = [
    Rule {
        pattern: &QUOTE_MARKER,
        guard: Guard::Always,
        target: ChunkState::Quote,
    },
    Rule {
        pattern: &QUOTE_INTRO,
        guard: Guard::NextOpensQuote,
        target: ChunkState::Quote,
    },
    Rule {
        pattern: &SIGNATURE,
        guard: Guard::NearEnd,
        target: ChunkState::Signature,
    },
    Rule {
        pattern: &BLOCK_QUOTE,
        guard: Guard::Always,
        target: ChunkState::BlockQuote,
    },
];

/// Tried in order while in Quote; no match returns to Text.
static QUOTE_RULES: [Rule; 4] = [
    Rule {
        pattern: &QUOTE_MARKER,
        guard: Guard::Always,
        target: ChunkState::Quote,
    },
    Rule {
        pattern: &QUOTE_INTRO,
        guard: Guard::NextOpensQuote,
        target: ChunkState::Quote,
    },
    Rule {
        pattern: &BLANK,
        guard: Guard::NextOpensQuote,
        target: ChunkState::Quote,
    },
    Rule {
        pattern: &SIGNATURE,
        guard: Guard::NearEnd,
        target: ChunkState::Signature,
    },
];

/// Everything a rule may look at for one line.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub line: &'a str,
    /// Next non-blank line after this one, if any.
    pub next_nonblank: Option<&'a str>,
    /// Number of lines from this one to the end of the body, this one included.
    pub remaining: usize,
    pub max_sig_distance: usize,
}

impl Rule {
    fn applies(&self, ctx: &LineContext<'_>) -> bool {
        if !self.pattern.is_match(ctx.line) {
            return false;
        }
        match self.guard {
            Guard::Always => true,
            Guard::NextOpensQuote => ctx
                .next_nonblank
                .is_some_and(|next| QUOTE_MARKER.is_match(next) || QUOTE_INTRO.is_match(next)),
            Guard::NearEnd => ctx.remaining < ctx.max_sig_distance,
        }
    }
}

/// State after reading `ctx.line` in `state`.
///
/// BlockQuote and Signature absorb every remaining line.
pub fn next_state(state: ChunkState, ctx: &LineContext<'_>) -> ChunkState {
    let (rules, fallback): (&[Rule], ChunkState) = match state {
        ChunkState::Text => (&TEXT_RULES, ChunkState::Text),
        ChunkState::Quote => (&QUOTE_RULES, ChunkState::Text),
        ChunkState::BlockQuote | ChunkState::Signature => return state,
    };
    rules
        .iter()
        .find(|rule| rule.applies(ctx))
        .map_or(fallback, |rule| rule.target)
}

/// Finds the next non-blank line, scanning each blank run once.
struct Lookahead<'a> {
    lines: &'a [String],
    next: usize,
}

impl<'a> Lookahead<'a> {
    fn new(lines: &'a [String]) -> Self {
        Self { lines, next: 0 }
    }

    fn after(&mut self, i: usize) -> Option<&'a str> {
        if i >= self.next {
            self.next = self.lines[i + 1..]
                .iter()
                .position(|l| !BLANK.is_match(l))
                .map_or(self.lines.len(), |p| i + 1 + p);
        }
        self.lines.get(self.next).map(String::as_str)
    }
}

/// Accumulates the preview snippet from leading text lines.
///
/// A disabled builder never collects anything; it is used when the message
/// already carries a snippet that must not be overwritten.
#[derive(Debug, Clone)]
pub struct SnippetBuilder {
    text: String,
    len: usize,
    limit: usize,
    enabled: bool,
}

impl SnippetBuilder {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            len: 0,
            limit,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0)
        }
    }

    pub fn is_full(&self) -> bool {
        !self.enabled || self.len >= self.limit
    }

    /// Feed one line read in `state`. Only non-blank, non-decorative Text
    /// lines count.
    pub fn observe(&mut self, state: ChunkState, line: &str) {
        if self.is_full() || state != ChunkState::Text {
            return;
        }
        if BLANK.is_match(line) || DECORATIVE.is_match(line) {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text
            .push_str(&line.split_whitespace().collect::<Vec<_>>().join(" "));

        self.len = self.text.chars().count();
        if self.len > self.limit {
            if let Some((idx, _)) = self.text.char_indices().nth(self.limit) {
                self.text.truncate(idx);
            }
            self.len = self.limit;
        }
    }

    /// The snippet, or `None` if the builder was disabled.
    pub fn finish(self) -> Option<String> {
        self.enabled.then_some(self.text)
    }
}

/// Split decoded text into lines with normalized line endings; tabs become
/// four spaces.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.replace('\r', "").replace('\t', "    "))
        .collect()
}

/// Break a line at whitespace so no piece is wider than `width` columns.
/// Words longer than `width` are cut hard.
pub fn soft_wrap(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = line;

    while width > 0 && rest.width() > width {
        let mut cols = 0;
        let mut limit = rest.len();
        for (idx, ch) in rest.char_indices() {
            let w = ch.width().unwrap_or(0);
            if cols + w > width {
                limit = idx;
                break;
            }
            cols += w;
        }
        if limit == 0 {
            // a single character wider than the column
            limit = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let head = &rest[..limit];
        let cut = if rest[limit..].starts_with(char::is_whitespace) {
            Some(limit)
        } else {
            head.rfind(char::is_whitespace)
        };
        match cut {
            Some(cut) if cut > 0 => {
                out.push(head[..cut].to_string());
                let ws = rest[cut..].chars().next().map_or(1, char::len_utf8);
                rest = &rest[cut + ws..];
            }
            _ => {
                out.push(head.to_string());
                rest = &rest[limit..];
            }
        }
    }

    out.push(rest.to_string());
    out
}

/// Turns plain-text leaves into chunks.
#[derive(Debug, Clone)]
pub struct BodyChunker<'a> {
    cfg: &'a ChunkingConfig,
}

impl<'a> BodyChunker<'a> {
    pub fn new(cfg: &'a ChunkingConfig) -> Self {
        Self { cfg }
    }

    /// Classify `lines` into chunks, feeding Text lines to `snippet`.
    pub fn chunk(&self, lines: &[String], snippet: &mut SnippetBuilder) -> Vec<Chunk> {
        let mut out = Emitter::default();
        let mut lookahead = Lookahead::new(lines);
        let mut state = ChunkState::Text;
        let mut buffer: Vec<String> = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let ctx = LineContext {
                line: line.as_str(),
                next_nonblank: lookahead.after(i),
                remaining: lines.len() - i,
                max_sig_distance: self.cfg.max_sig_distance,
            };
            let new_state = next_state(state, &ctx);

            if new_state == state {
                buffer.push(line.clone());
            } else {
                out.leave(state, std::mem::take(&mut buffer));
                buffer.push(line.clone());
                state = new_state;
            }

            snippet.observe(state, line);
        }

        out.finish(state, buffer);
        out.into_chunks(self.cfg.wrap_width)
    }
}

/// Raw chunk kinds before Text wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Text,
    Quote,
    Signature,
}

#[derive(Debug, Default)]
struct Emitter {
    spans: Vec<(Span, Vec<String>)>,
}

impl Emitter {
    fn push(&mut self, span: Span, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        // adjacent text only happens around a dropped one-line quote
        if span == Span::Text {
            if let Some((Span::Text, prev)) = self.spans.last_mut() {
                prev.extend(lines);
                return;
            }
        }
        self.spans.push((span, lines));
    }

    /// Flush the buffer of a state being left mid-body.
    fn leave(&mut self, state: ChunkState, lines: Vec<String>) {
        match state {
            ChunkState::Quote if lines.len() == 1 => self.push(Span::Text, lines),
            _ => self.finish(state, lines),
        }
    }

    /// Flush the buffer of the state the body ended in.
    fn finish(&mut self, state: ChunkState, lines: Vec<String>) {
        let span = match state {
            ChunkState::Text => Span::Text,
            ChunkState::Quote | ChunkState::BlockQuote => Span::Quote,
            ChunkState::Signature => Span::Signature,
        };
        self.push(span, lines);
    }

    fn into_chunks(self, wrap_width: usize) -> Vec<Chunk> {
        self.spans
            .into_iter()
            .map(|(span, lines)| match span {
                Span::Text => Chunk::Text(
                    lines
                        .iter()
                        .flat_map(|l| soft_wrap(l, wrap_width))
                        .collect(),
                ),
                Span::Quote => Chunk::Quote(lines),
                Span::Signature => Chunk::Signature(lines),
            })
            .collect()
    }
}

/// Result of chunking a standalone body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBody {
    pub chunks: Vec<Chunk>,
    pub snippet: String,
}

/// Chunk a plain-text body in one go.
pub fn chunk_body(text: &str, cfg: &ChunkingConfig) -> ChunkedBody {
    let mut snippet = SnippetBuilder::new(cfg.snippet_len);
    let chunks = BodyChunker::new(cfg).chunk(&split_lines(text), &mut snippet);
    ChunkedBody {
        chunks,
        snippet: snippet.finish().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn chunk(v: &[&str]) -> (Vec<Chunk>, String) {
        let cfg = ChunkingConfig::default();
        let mut snippet = SnippetBuilder::new(cfg.snippet_len);
        let chunks = BodyChunker::new(&cfg).chunk(&lines(v), &mut snippet);
        (chunks, snippet.finish().unwrap())
    }

    fn ctx<'a>(line: &'a str, next: Option<&'a str>, remaining: usize) -> LineContext<'a> {
        LineContext {
            line,
            next_nonblank: next,
            remaining,
            max_sig_distance: 15,
        }
    }

    #[test]
    fn test_text_quote_text_signature() {
        let (chunks, snippet) = chunk(&[
            "Hi there.",
            "> quoted line one",
            "> quoted line two",
            "Thanks,",
            "-- ",
            "Jane",
        ]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Text(lines(&["Hi there."])),
                Chunk::Quote(lines(&["> quoted line one", "> quoted line two"])),
                Chunk::Text(lines(&["Thanks,"])),
                Chunk::Signature(lines(&["-- ", "Jane"])),
            ]
        );
        assert_eq!(snippet, "Hi there. Thanks,");
    }

    #[test]
    fn test_single_line_quote_folds_into_text() {
        let (chunks, _) = chunk(&["Hello.", "> one line", "Bye."]);
        assert_eq!(
            chunks,
            vec![Chunk::Text(lines(&["Hello.", "> one line", "Bye."]))]
        );
    }

    #[test]
    fn test_quote_introduction_needs_quote_after_it() {
        let (chunks, _) = chunk(&["On Monday, Jane wrote:", "> hi", "> there", "ok"]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Quote(lines(&["On Monday, Jane wrote:", "> hi", "> there"])),
                Chunk::Text(lines(&["ok"])),
            ]
        );

        let (chunks, _) = chunk(&["Jane wrote:", "nothing quoted here"]);
        assert_eq!(
            chunks,
            vec![Chunk::Text(lines(&["Jane wrote:", "nothing quoted here"]))]
        );
    }

    #[test]
    fn test_lookahead_skips_blank_lines() {
        let (chunks, _) = chunk(&["Jane wrote:", "", "> a", "> b"]);
        assert_eq!(
            chunks,
            vec![Chunk::Quote(lines(&["Jane wrote:", "", "> a", "> b"]))]
        );
    }

    #[test]
    fn test_blank_line_ends_quote_unless_quote_continues() {
        let (chunks, _) = chunk(&["> a", "> b", "", "reply"]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Quote(lines(&["> a", "> b"])),
                Chunk::Text(lines(&["", "reply"])),
            ]
        );
    }

    #[test]
    fn test_signature_only_near_end() {
        let mut body: Vec<String> = lines(&["intro", "----------"]);
        body.extend((0..20).map(|i| format!("line {i}")));
        let cfg = ChunkingConfig::default();
        let chunks = BodyChunker::new(&cfg).chunk(&body, &mut SnippetBuilder::disabled());
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Chunk::Text(_)));
    }

    #[test]
    fn test_block_quote_absorbs_everything() {
        let (chunks, _) = chunk(&[
            "See below.",
            "-----Original Message-----",
            "From: someone",
            "Plain line",
            "-- ",
            "> not a nested quote",
        ]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Text(lines(&["See below."])),
                Chunk::Quote(lines(&[
                    "-----Original Message-----",
                    "From: someone",
                    "Plain line",
                    "-- ",
                    "> not a nested quote",
                ])),
            ]
        );
    }

    #[test]
    fn test_signature_from_quote() {
        let (chunks, _) = chunk(&["> a", "> b", "-- ", "sig"]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Quote(lines(&["> a", "> b"])),
                Chunk::Signature(lines(&["-- ", "sig"])),
            ]
        );
    }

    #[test]
    fn test_trailing_single_quote_line_stays_quote() {
        let (chunks, _) = chunk(&["text", "> last"]);
        assert_eq!(
            chunks,
            vec![
                Chunk::Text(lines(&["text"])),
                Chunk::Quote(lines(&["> last"])),
            ]
        );
    }

    #[test]
    fn test_empty_body() {
        let (chunks, snippet) = chunk(&[]);
        assert!(chunks.is_empty());
        assert_eq!(snippet, "");
    }

    #[test]
    fn test_next_state_rules() {
        use ChunkState::*;
        assert_eq!(next_state(Text, &ctx("  > x", None, 10)), Quote);
        assert_eq!(next_state(Text, &ctx("      > x", None, 10)), Text);
        assert_eq!(next_state(Text, &ctx("| piped", None, 10)), Quote);
        assert_eq!(next_state(Text, &ctx("-- ", None, 3)), Signature);
        assert_eq!(next_state(Text, &ctx("-- ", None, 15)), Text);
        assert_eq!(next_state(Text, &ctx("__________", None, 2)), Signature);
        assert_eq!(
            next_state(Text, &ctx("----- Original Message -----", None, 50)),
            BlockQuote
        );
        assert_eq!(
            next_state(Text, &ctx("In article <x@y>, bob writes:", Some("> z"), 9)),
            Quote
        );
        assert_eq!(
            next_state(Text, &ctx("Excerpts from bob's message:", Some("Quoting alice:"), 9)),
            Quote
        );
        assert_eq!(next_state(Quote, &ctx("", Some("> more"), 9)), Quote);
        assert_eq!(next_state(Quote, &ctx("", Some("text"), 9)), Text);
        assert_eq!(next_state(Quote, &ctx("plain", None, 9)), Text);
        assert_eq!(next_state(Signature, &ctx("> x", None, 1)), Signature);
        assert_eq!(next_state(BlockQuote, &ctx("-- ", None, 1)), BlockQuote);
    }

    #[test]
    fn test_snippet_truncated_to_limit() {
        let long = "a".repeat(50) + " " + &"b".repeat(60);
        let (_, snippet) = chunk(&[&long]);
        assert_eq!(snippet.chars().count(), 80);
        assert!(long.starts_with(&snippet));
    }

    #[test]
    fn test_snippet_skips_decorative_and_blank() {
        let (_, snippet) = chunk(&["", "=====", "  Hello   there  ", "", "world"]);
        assert_eq!(snippet, "Hello there world");
    }

    #[test]
    fn test_disabled_snippet() {
        let cfg = ChunkingConfig::default();
        let mut snippet = SnippetBuilder::disabled();
        BodyChunker::new(&cfg).chunk(&lines(&["text"]), &mut snippet);
        assert_eq!(snippet.finish(), None);
    }

    #[test]
    fn test_text_lines_are_wrapped() {
        let long = format!("{} {}", "x".repeat(60), "y".repeat(30));
        let (chunks, _) = chunk(&[&long, "> q1", "> q2"]);
        assert_eq!(
            chunks[0],
            Chunk::Text(vec!["x".repeat(60), "y".repeat(30)])
        );
    }

    #[test]
    fn test_quote_lines_not_wrapped() {
        let long = format!("> {}", "q ".repeat(60));
        let (chunks, _) = chunk(&[&long, &long]);
        assert_eq!(chunks, vec![Chunk::Quote(vec![long.clone(), long])]);
    }

    #[test]
    fn test_soft_wrap() {
        assert_eq!(soft_wrap("short", 80), vec!["short"]);
        assert_eq!(soft_wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(soft_wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(soft_wrap("", 4), vec![""]);
        // wide characters count two columns
        assert_eq!(soft_wrap("日本語テキスト", 6), vec!["日本語", "テキス", "ト"]);
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(
            split_lines("a\r\nb\tc\r\n-- \r\n"),
            vec!["a", "b    c", "-- "]
        );
    }

    #[test]
    fn test_chunk_body() {
        let body = chunk_body("Hello\n\n> a\n> b\n", &ChunkingConfig::default());
        assert_eq!(body.snippet, "Hello");
        assert_eq!(body.chunks.len(), 2);
    }
}
