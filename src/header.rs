//! The header buffer, cursor, and diff computation (part of C5, §4.5, §9).
//!
//! The teacher never buffered headers at all — `MessageHandler::handle_header`
//! saw one `(name, value)` pair at a time with no way to look back or edit
//! earlier ones. This module is new, grounded on §9's explicit design note to
//! use "owning storage plus integer indices" rather than a doubly linked
//! list, and on the edit-script shape `miltr-common`'s modification builder
//! emits (`other_examples/75978518_..._modifications-mod.rs.rs`).

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::{Error, UsageError};
use crate::message::ModificationAction;

/// What to do when a message carries more than `max_headers` fields (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOverflowPolicy {
    Reject,
    Clear,
    Truncate,
}

/// One buffered header field: the value as received, plus enough metadata
/// to reconstruct a minimal edit script against the original at end-of-message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub canonical_key: String,
    pub value: String,
    pub raw: Bytes,
    pub deleted: bool,
    /// Position in the snapshot taken at decision time, or `None` for a
    /// header the filter itself inserted.
    source_index: Option<usize>,
}

impl HeaderField {
    fn new(name: &str, value: &str, source_index: Option<usize>) -> Self {
        Self {
            canonical_key: canonical_key(name),
            raw: format_raw(name, value),
            name: name.to_string(),
            value: value.to_string(),
            deleted: false,
            source_index,
        }
    }
}

/// Title-case each hyphen-separated segment of a header name, e.g.
/// `"x-test"` -> `"X-Test"`, the way `sendmail` canonicalizes header keys.
pub fn canonical_key(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn format_raw(name: &str, value: &str) -> Bytes {
    Bytes::from(format!("{name}: {value}\r\n"))
}

/// Strip a single leading space from a header value, the way sendmail
/// itself does before handing the value to a filter that did not negotiate
/// `HEADER_LEAD_SPACE` (§2.2, §6). Only one space is ever removed.
fn strip_one_leading_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

/// Restore the single leading space a non-negotiating MTA expects on values
/// sent back in `add_header`/`insert_header`/`change_header` actions. A
/// `change_header` with an empty value means "delete this occurrence", so an
/// empty value is left untouched rather than turned into a bare space.
fn restore_leading_space(value: &str, lead_space_supported: bool) -> String {
    if lead_space_supported || value.is_empty() {
        value.to_string()
    } else {
        format!(" {value}")
    }
}

/// The buffered header list for one message.
#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    fields: Vec<HeaderField>,
    max_headers: usize,
    policy: HeaderOverflowPolicy,
}

impl HeaderList {
    pub fn new(max_headers: usize, policy: HeaderOverflowPolicy) -> Self {
        Self {
            fields: Vec::new(),
            max_headers,
            policy,
        }
    }

    /// Record a header exactly as it arrived off the wire. `lead_space_supported`
    /// is the negotiated `HEADER_LEAD_SPACE` bit (§2.2, §6): when it was not
    /// negotiated, the MTA has already stripped a single leading space from
    /// `value` before sending it, so the stored value is normalized the same
    /// way regardless of whether that space actually made the trip.
    pub fn push_from_wire(
        &mut self,
        name: &str,
        value: &str,
        lead_space_supported: bool,
    ) -> Result<(), Error> {
        let value = if lead_space_supported {
            value
        } else {
            strip_one_leading_space(value)
        };
        if self.fields.len() >= self.max_headers {
            return match self.policy {
                HeaderOverflowPolicy::Reject => Err(Error::application(format!(
                    "header count exceeds the configured max of {}",
                    self.max_headers
                ))),
                HeaderOverflowPolicy::Clear => {
                    self.fields.clear();
                    Ok(())
                }
                HeaderOverflowPolicy::Truncate => Ok(()),
            };
        }
        let idx = self.fields.len();
        self.fields.push(HeaderField::new(name, value, Some(idx)));
        Ok(())
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.iter().filter(|f| !f.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value for `name`, in arrival order, skipping deleted fields.
    /// Comparison is case-insensitive per RFC 5322.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.deleted && f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).into_iter().next()
    }

    /// Render the surviving headers back into a single block, in order,
    /// using each field's original wire bytes (or synthesized bytes for
    /// anything the filter added or edited).
    pub fn render(&self) -> Bytes {
        let mut out = bytes::BytesMut::new();
        for field in &self.fields {
            if !field.deleted {
                out.extend_from_slice(&field.raw);
            }
        }
        out.freeze()
    }

    /// A cursor positioned before the first field.
    pub fn cursor(&mut self) -> HeaderCursor<'_> {
        HeaderCursor {
            list: self,
            position: None,
        }
    }

    fn insert_new(&mut self, pos: usize, name: &str, value: &str) {
        self.fields.insert(pos, HeaderField::new(name, value, None));
    }
}

/// Walks a [`HeaderList`] one field at a time, allowing in-place edits,
/// deletion, and insertion (§6, §9). Implemented as owning storage plus an
/// integer index rather than a linked list, per the design note in §9.
pub struct HeaderCursor<'a> {
    list: &'a mut HeaderList,
    position: Option<usize>,
}

impl<'a> HeaderCursor<'a> {
    /// Advance to the next field (including deleted ones, so a caller can
    /// inspect what it already removed). Returns `false` once exhausted.
    pub fn next(&mut self) -> bool {
        let next_pos = match self.position {
            None => 0,
            Some(p) => p + 1,
        };
        if next_pos < self.list.fields.len() {
            self.position = Some(next_pos);
            true
        } else {
            self.position = Some(self.list.fields.len());
            false
        }
    }

    fn current(&self) -> Result<&HeaderField, Error> {
        match self.position {
            None => Err(UsageError::CursorNotPositioned.into()),
            Some(p) if p < self.list.fields.len() => Ok(&self.list.fields[p]),
            Some(_) => Err(UsageError::CursorExhausted.into()),
        }
    }

    pub fn key(&self) -> Result<&str, Error> {
        self.current().map(|f| f.name.as_str())
    }

    pub fn canonical_key(&self) -> Result<&str, Error> {
        self.current().map(|f| f.canonical_key.as_str())
    }

    pub fn value(&self) -> Result<&str, Error> {
        self.current().map(|f| f.value.as_str())
    }

    pub fn is_deleted(&self) -> Result<bool, Error> {
        self.current().map(|f| f.deleted)
    }

    /// Replace both the key and value of the current field.
    pub fn replace(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let pos = self.position.ok_or(UsageError::CursorNotPositioned)?;
        let field = self
            .list
            .fields
            .get_mut(pos)
            .ok_or(UsageError::CursorExhausted)?;
        field.name = key.to_string();
        field.canonical_key = canonical_key(key);
        field.value = value.to_string();
        field.raw = format_raw(key, value);
        Ok(())
    }

    /// Replace just the value, keeping the current field's key.
    pub fn set(&mut self, value: &str) -> Result<(), Error> {
        let pos = self.position.ok_or(UsageError::CursorNotPositioned)?;
        let field = self
            .list
            .fields
            .get_mut(pos)
            .ok_or(UsageError::CursorExhausted)?;
        field.value = value.to_string();
        field.raw = format_raw(&field.name.clone(), value);
        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        let pos = self.position.ok_or(UsageError::CursorNotPositioned)?;
        let field = self
            .list
            .fields
            .get_mut(pos)
            .ok_or(UsageError::CursorExhausted)?;
        field.deleted = true;
        Ok(())
    }

    pub fn insert_before(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let pos = self.position.ok_or(UsageError::CursorNotPositioned)?;
        self.list.insert_new(pos, key, value);
        self.position = Some(pos + 1);
        Ok(())
    }

    pub fn insert_after(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let pos = self.position.ok_or(UsageError::CursorNotPositioned)?;
        self.list.insert_new(pos + 1, key, value);
        Ok(())
    }

    /// Parse the current field's value as an RFC 5322 address list (`To`,
    /// `Cc`, `From`, ...) using the same header-folding rules `mailparse`
    /// applies to top-level headers.
    pub fn address_list(&self) -> Result<Vec<mailparse::MailAddr>, Error> {
        let value = self.value()?;
        mailparse::addrparse(value)
            .map(|list| list.into_iter().collect())
            .map_err(|e| Error::application(format!("could not parse address list: {e}")))
    }

    /// Decode the current field as a `Subject` header, undoing RFC 2047
    /// encoded words.
    pub fn decoded_value(&self) -> Result<String, Error> {
        let key = self.key()?;
        let value = self.value()?;
        let raw = format!("{key}:{value}\n");
        let (parsed, _) = mailparse::parse_header(raw.as_bytes())
            .map_err(|e| Error::application(format!("could not decode header: {e}")))?;
        Ok(parsed.get_value())
    }

    /// Parse the current field as an RFC 2822 `Date` header.
    pub fn date(&self) -> Result<chrono::DateTime<chrono::FixedOffset>, Error> {
        let value = self.value()?;
        chrono::DateTime::parse_from_rfc2822(value.trim())
            .map_err(|e| Error::application(format!("could not parse date header: {e}")))
    }

    /// Encode `date` as an RFC 2822 value (e.g. `Tue, 1 Jul 2003 10:52:37 +0200`)
    /// and set it as the current field's value, the inverse of [`Self::date`].
    pub fn set_date(&mut self, date: chrono::DateTime<chrono::FixedOffset>) -> Result<(), Error> {
        self.set(&date.to_rfc2822())
    }
}

/// Count how many fields sharing `fields[idx]`'s canonical key precede (and
/// include) `idx` — the wire protocol's per-key 1-based index for `change_header`.
fn same_key_index(fields: &[HeaderField], idx: usize) -> u32 {
    let key = &fields[idx].canonical_key;
    fields[..=idx]
        .iter()
        .filter(|f| &f.canonical_key == key)
        .count() as u32
}

/// Compute the `change_header`/`insert_header` actions that turn `orig` into
/// `current` (§4.5, §8 property 9, §9's "+100 offset" workaround).
///
/// Original fields are compared by identity (their snapshot position), not
/// by re-deriving an equal-prefix/suffix window: an unmodified original
/// field never produces an action regardless of where edits land around it,
/// which is observably equivalent to the windowed algorithm for the actions
/// actually sent over the wire.
pub fn diff(
    orig: &[HeaderField],
    current: &[HeaderField],
    lead_space_supported: bool,
) -> Vec<ModificationAction> {
    let mut change_ops: Vec<(usize, ModificationAction)> = Vec::new();
    let mut handled: HashSet<usize> = HashSet::new();

    for field in current {
        if let Some(oi) = field.source_index {
            if oi >= orig.len() {
                continue;
            }
            handled.insert(oi);
            if field.deleted || field.raw != orig[oi].raw {
                let value = if field.deleted {
                    String::new()
                } else {
                    restore_leading_space(&field.value, lead_space_supported)
                };
                change_ops.push((
                    oi,
                    ModificationAction::ChangeHeader {
                        index: same_key_index(orig, oi),
                        name: orig[oi].name.clone(),
                        value,
                    },
                ));
            }
        }
    }
    for (oi, field) in orig.iter().enumerate() {
        if !handled.contains(&oi) {
            change_ops.push((
                oi,
                ModificationAction::ChangeHeader {
                    index: same_key_index(orig, oi),
                    name: field.name.clone(),
                    value: String::new(),
                },
            ));
        }
    }

    // Emit back-to-front: once the MTA applies a change at a given same-key
    // index, later (higher) indices of the same key would otherwise shift.
    change_ops.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result: Vec<ModificationAction> = change_ops.into_iter().map(|(_, a)| a).collect();

    let last_survivor_pos = current
        .iter()
        .rposition(|f| f.source_index.is_some() && !f.deleted);

    let mut middle_inserts: Vec<(u32, &HeaderField)> = Vec::new();
    let mut trailing_inserts: Vec<&HeaderField> = Vec::new();
    let mut survivors_seen = 0u32;

    for (pos, field) in current.iter().enumerate() {
        if field.source_index.is_some() {
            if !field.deleted {
                survivors_seen += 1;
            }
            continue;
        }
        if field.deleted {
            continue;
        }
        let is_trailing = match last_survivor_pos {
            Some(lp) => pos > lp,
            None => true,
        };
        if is_trailing {
            trailing_inserts.push(field);
        } else {
            middle_inserts.push((survivors_seen, field));
        }
    }

    for (survivors_before, field) in middle_inserts.into_iter().rev() {
        result.push(ModificationAction::InsertHeader {
            index: survivors_before + 1,
            name: field.name.clone(),
            value: restore_leading_space(&field.value, lead_space_supported),
        });
    }

    for (rank, field) in trailing_inserts.into_iter().enumerate() {
        result.push(ModificationAction::InsertHeader {
            index: orig.len() as u32 + 100 + rank as u32 + 1,
            name: field.name.clone(),
            value: restore_leading_space(&field.value, lead_space_supported),
        });
    }

    result
}

/// Recreate the whole header block from scratch, the way sendmail's own
/// milter client recommends when the filter can't be sure its `orig`
/// snapshot still matches sendmail's internal header count (§9). Every
/// surviving header is re-added at the end rather than indexed, sidestepping
/// the whole index-computation problem at the cost of reordering headers.
pub fn diff_sendmail_compat(
    orig: &[HeaderField],
    current: &[HeaderField],
    lead_space_supported: bool,
) -> Vec<ModificationAction> {
    let mut result = Vec::new();
    for (oi, field) in orig.iter().enumerate().rev() {
        result.push(ModificationAction::ChangeHeader {
            index: same_key_index(orig, oi),
            name: field.name.clone(),
            value: String::new(),
        });
    }
    for field in current.iter().filter(|f| !f.deleted) {
        result.push(ModificationAction::AddHeader {
            name: field.name.clone(),
            value: restore_leading_space(&field.value, lead_space_supported),
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list_with(pairs: &[(&str, &str)]) -> HeaderList {
        let mut list = HeaderList::new(512, HeaderOverflowPolicy::Truncate);
        for (k, v) in pairs {
            list.push_from_wire(k, v, true).unwrap();
        }
        list
    }

    #[test]
    fn canonicalizes_hyphenated_names() {
        assert_eq!(canonical_key("x-test"), "X-Test");
        assert_eq!(canonical_key("SUBJECT"), "Subject");
    }

    #[test]
    fn no_changes_produce_an_empty_diff() {
        let list = list_with(&[("Subject", "hi"), ("From", "a@example.com")]);
        let ops = diff(list.fields(), list.fields(), true);
        assert!(ops.is_empty());
    }

    #[test]
    fn appending_one_header_produces_one_offset_insert() {
        let mut list = list_with(&[("Subject", "hi")]);
        let orig = list.fields().to_vec();
        {
            let mut cursor = list.cursor();
            cursor.next();
            cursor.insert_after("X-Test", "1");
        }
        let ops = diff(&orig, list.fields(), true);
        assert_eq!(
            ops,
            vec![ModificationAction::InsertHeader {
                index: orig.len() as u32 + 101,
                name: "X-Test".into(),
                value: "1".into(),
            }]
        );
    }

    /// Scenario C (§8): HEADER_LEAD_SPACE was not negotiated, so the value
    /// sent back over the wire must carry the single leading space the MTA
    /// expects to find there.
    #[test]
    fn appending_a_header_without_lead_space_negotiated_restores_the_space() {
        let mut list = list_with(&[("Subject", "hi")]);
        let orig = list.fields().to_vec();
        {
            let mut cursor = list.cursor();
            cursor.next();
            cursor.insert_after("X-Test", "1");
        }
        let ops = diff(&orig, list.fields(), false);
        assert_eq!(
            ops,
            vec![ModificationAction::InsertHeader {
                index: orig.len() as u32 + 101,
                name: "X-Test".into(),
                value: " 1".into(),
            }]
        );
    }

    #[test]
    fn deleting_a_field_emits_change_with_empty_value() {
        let mut list = list_with(&[("Subject", "hi"), ("X-Spam", "yes")]);
        let orig = list.fields().to_vec();
        {
            let mut cursor = list.cursor();
            cursor.next();
            cursor.next();
            assert_eq!(cursor.key().unwrap(), "X-Spam");
            cursor.delete().unwrap();
        }
        let ops = diff(&orig, list.fields(), true);
        assert_eq!(
            ops,
            vec![ModificationAction::ChangeHeader {
                index: 1,
                name: "X-Spam".into(),
                value: String::new(),
            }]
        );
    }

    /// A deletion's empty value must stay empty even when the space-restore
    /// path is active — it signals "remove this occurrence", not "set it to
    /// a single space".
    #[test]
    fn deleting_a_field_without_lead_space_negotiated_still_emits_empty_value() {
        let mut list = list_with(&[("Subject", "hi"), ("X-Spam", "yes")]);
        let orig = list.fields().to_vec();
        {
            let mut cursor = list.cursor();
            cursor.next();
            cursor.next();
            cursor.delete().unwrap();
        }
        let ops = diff(&orig, list.fields(), false);
        assert_eq!(
            ops,
            vec![ModificationAction::ChangeHeader {
                index: 1,
                name: "X-Spam".into(),
                value: String::new(),
            }]
        );
    }

    #[test]
    fn received_header_strips_one_leading_space_when_not_negotiated() {
        let mut list = HeaderList::new(512, HeaderOverflowPolicy::Truncate);
        list.push_from_wire("X-Test", " 1", false).unwrap();
        assert_eq!(list.get("X-Test"), Some("1"));
    }

    #[test]
    fn received_header_keeps_leading_space_when_negotiated() {
        let mut list = HeaderList::new(512, HeaderOverflowPolicy::Truncate);
        list.push_from_wire("X-Test", " 1", true).unwrap();
        assert_eq!(list.get("X-Test"), Some(" 1"));
    }

    #[test]
    fn same_key_index_counts_per_key_occurrences() {
        let list = list_with(&[("Received", "a"), ("Received", "b"), ("Subject", "hi")]);
        assert_eq!(same_key_index(list.fields(), 0), 1);
        assert_eq!(same_key_index(list.fields(), 1), 2);
        assert_eq!(same_key_index(list.fields(), 2), 1);
    }

    #[test]
    fn cursor_rejects_use_before_next() {
        let mut list = list_with(&[("Subject", "hi")]);
        let mut cursor = list.cursor();
        assert!(matches!(
            cursor.value(),
            Err(Error::Usage(UsageError::CursorNotPositioned))
        ));
    }

    #[test]
    fn header_count_cap_truncates_by_default() {
        let mut list = HeaderList::new(1, HeaderOverflowPolicy::Truncate);
        list.push_from_wire("A", "1", true).unwrap();
        list.push_from_wire("B", "2", true).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get("A"), Some("1"));
    }

    #[test]
    fn set_date_round_trips_through_date() {
        let mut list = list_with(&[("Date", "Tue, 1 Jul 2003 10:52:37 +0200")]);
        let mut cursor = list.cursor();
        cursor.next();
        let parsed = cursor.date().unwrap();
        cursor.set_date(parsed).unwrap();
        assert_eq!(cursor.date().unwrap(), parsed);
    }
}
