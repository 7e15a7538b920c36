//! The SMTP reply formatting helper (§6): turns a `{code, reason}` pair into
//! the wire text for `reply_code`/rejection/temp-fail responses.
//!
//! Grounded on the teacher's hand-rolled reject/tempfail string building in
//! `milter_message.rs` (`ResponseMessage::reject`/`tempfail` build a single
//! `"<code> <text>"` line with no escaping or wrapping); generalized here to
//! the full multi-line continuation syntax the wire protocol allows, the way
//! `miltr-common`'s reply-code handling treats `%` escaping as part of the
//! encoder rather than the caller's job.

use crate::error::{Error, ProtocolError};

/// Longest a single physical reply line may be, including the leading
/// `"<code>-"`/`"<code> "` prefix.
const MAX_LINE_LEN: usize = 950;
/// Hard cap on the whole formatted reply, matching the codec's payload limit
/// for a `reply_code` cstring (64 KiB minus the NUL and a one-byte margin).
const MAX_REPLY_LEN: usize = 64 * 1024 - 2;

/// Format an SMTP reply: canonicalize line endings to CRLF, double any `%`,
/// wrap long lines, and join with the `code-`/`code ` continuation markers.
///
/// `code` must be a valid 3-digit SMTP reply code (`100..=599`). The input
/// `reason` may already contain embedded line breaks for an explicit
/// multi-line reply; each logical line is independently wrapped to
/// [`MAX_LINE_LEN`] bytes.
pub fn format_reply(code: u16, reason: &str) -> Result<String, Error> {
    if !(100..=599).contains(&code) {
        return Err(ProtocolError::Malformed("reply_code", format!("code {code} out of range 100..=599")).into());
    }

    let escaped = reason.replace('%', "%%");
    let normalized = escaped.replace("\r\n", "\n").replace('\r', "\n");

    let prefix_len = 4; // 3-digit code + separator
    let budget = MAX_LINE_LEN.saturating_sub(prefix_len);

    let mut lines: Vec<String> = Vec::new();
    for logical_line in normalized.split('\n') {
        if logical_line.is_empty() {
            lines.push(String::new());
            continue;
        }
        for chunk in wrap_bytes(logical_line, budget) {
            lines.push(chunk);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }

    let last = lines.len() - 1;
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let sep = if i == last { ' ' } else { '-' };
        out.push_str(&code.to_string());
        out.push(sep);
        out.push_str(line);
        if i != last {
            out.push_str("\r\n");
        }
    }

    if out.len() > MAX_REPLY_LEN {
        return Err(ProtocolError::ReplyTooLarge.into());
    }

    Ok(out)
}

/// Split `s` into UTF-8-safe chunks of at most `max_bytes` bytes each.
fn wrap_bytes(s: &str, max_bytes: usize) -> Vec<String> {
    if max_bytes == 0 || s.len() <= max_bytes {
        return vec![s.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < s.len() {
        let mut end = (start + max_bytes).min(s.len());
        while end > start && !s.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // a single char wider than max_bytes; take it whole rather than
            // produce an empty chunk.
            end = s[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(s.len());
        }
        chunks.push(s[start..end].to_string());
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_line_reply_uses_space_separator() {
        let reply = format_reply(550, "5.7.1 No").unwrap();
        assert_eq!(reply, "550 5.7.1 No");
    }

    #[test]
    fn embedded_newline_produces_dash_then_space_continuation() {
        let reply = format_reply(250, "first\nsecond").unwrap();
        assert_eq!(reply, "250-first\r\n250 second");
    }

    #[test]
    fn percent_is_doubled() {
        let reply = format_reply(250, "100% done").unwrap();
        assert_eq!(reply, "250 100%% done");
    }

    #[test]
    fn every_line_preserves_the_code_and_stays_under_the_limit() {
        let long_reason = "x".repeat(3000);
        let reply = format_reply(451, &long_reason).unwrap();
        for line in reply.split("\r\n") {
            assert!(line.starts_with("451"));
            assert!(line.len() <= MAX_LINE_LEN);
        }
    }

    #[test]
    fn rejects_code_out_of_range() {
        assert!(format_reply(99, "x").is_err());
        assert!(format_reply(600, "x").is_err());
    }

    #[test]
    fn rejects_reply_larger_than_hard_cap() {
        let huge = "x".repeat(MAX_REPLY_LEN * 2);
        assert!(format_reply(250, &huge).is_err());
    }
}
