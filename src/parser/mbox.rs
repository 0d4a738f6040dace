//! MBOX record framing.
//!
//! A record starts with a `From ` separator line and ends right before the
//! next line matching `^From \S+`, or at end of stream. Readers here never
//! consume the separator of the following record.

use std::io::{BufRead, Seek, SeekFrom};

use tracing::warn;

use crate::error::Result;

/// Default maximum record size in bytes (256 MB).
pub const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Check whether a line is an MBOX separator (`From ` followed by a
/// non-blank token).
pub fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(UTF8_BOM).unwrap_or(line);
    match line.strip_prefix(b"From ") {
        Some(rest) => rest.first().is_some_and(|b| !b.is_ascii_whitespace()),
        None => false,
    }
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
///
/// This is the one definition of the line that ends a header block.
pub fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

/// Report whether the stream is positioned at the start of a record.
///
/// The whole next line is read and then given back, so the answer does not
/// depend on how much of it happens to be buffered.
pub fn at_separator<R: BufRead + Seek>(reader: &mut R) -> Result<bool> {
    let mut line = Vec::with_capacity(128);
    let n = reader.read_until(b'\n', &mut line)?;
    if n > 0 {
        unread(reader, n)?;
    }
    Ok(is_mbox_separator(&line))
}

/// Read one line (including its terminator) into `line`, unless the stream
/// is at end or at the separator of another record. Returns `false` when
/// nothing was read.
///
/// `first` marks the very first line of a record, whose own separator is
/// allowed through. A separator met later is given back, leaving the
/// stream at the start of the next record.
pub fn next_record_line<R: BufRead + Seek>(
    reader: &mut R,
    line: &mut Vec<u8>,
    first: bool,
) -> Result<bool> {
    line.clear();
    let n = reader.read_until(b'\n', line)?;
    if n == 0 {
        return Ok(false);
    }
    if !first && is_mbox_separator(line) {
        unread(reader, n)?;
        line.clear();
        return Ok(false);
    }
    Ok(true)
}

fn unread<R: Seek>(reader: &mut R, len: usize) -> Result<()> {
    let back = i64::try_from(len).unwrap_or(i64::MAX);
    reader.seek(SeekFrom::Current(-back))?;
    Ok(())
}

/// Read the remainder of the current record, stopping before the next
/// `From ` separator.
///
/// The stream must be positioned at the start of a record (its own
/// separator line, if any, is included in the result).
pub fn read_record<R: BufRead + Seek>(reader: &mut R, max_size: usize) -> Result<Vec<u8>> {
    let mut record = Vec::with_capacity(16 * 1024);
    let mut line = Vec::with_capacity(1024);
    let mut first = true;
    let mut truncated = false;

    while next_record_line(reader, &mut line, first)? {
        first = false;
        if record.len() + line.len() <= max_size {
            record.extend_from_slice(&line);
        } else if !truncated {
            warn!(max_size, "Record exceeds maximum size, truncating body");
            truncated = true;
        }
    }

    Ok(record)
}

/// Skip the `From ` separator line at the start of a record, if present.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if is_mbox_separator(data) {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
        return &[];
    }
    data
}

/// Split a record into its header block (without the blank line) and body.
pub fn split_header_body(data: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| pos + p + 1)
            .unwrap_or(data.len());
        if is_blank_line(&data[pos..end]) {
            return (&data[..pos], &data[end..]);
        }
        pos = end;
    }
    (data, &[])
}
