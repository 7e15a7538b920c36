//! The macro bag (C2): per-session key/value map of MTA macros with
//! stage-scoped snapshots (§4.2).

use std::collections::HashMap;

use crate::command::Command;

/// The fixed precedence chain macros are looked up through. A macro read at
/// stage `X` sees `X`'s own layer first, then falls back through earlier
/// stages in this order. Only `Connect` and `Helo` survive across messages on
/// the same connection; the rest are cleared whenever a transaction resets
/// (`abort`, or the start of a fresh message).
const STAGE_CHAIN: &[Command] = &[
    Command::Connect,
    Command::Helo,
    Command::Mail,
    Command::Rcpt,
    Command::Data,
    Command::Header,
    Command::EndOfHeaders,
    Command::Body,
    Command::EndOfMessage,
];

/// Stages whose macro layer is reset when a transaction ends; everything not
/// in this list (`Connect`, `Helo`) is connection-scoped.
const TRANSACTION_SCOPED: &[Command] = &[
    Command::Mail,
    Command::Rcpt,
    Command::Data,
    Command::Header,
    Command::EndOfHeaders,
    Command::Body,
    Command::EndOfMessage,
];

/// A process-safe (single-owner; the session owns it exclusively per §5) map
/// of macro name to value, layered by the stage at which the MTA defined it.
#[derive(Debug, Default, Clone)]
pub struct MacroBag {
    layers: HashMap<Command, HashMap<String, String>>,
}

impl MacroBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (replacing any previous values) the macros the MTA sent tagged
    /// with `stage`.
    pub fn set_stage(&mut self, stage: Command, entries: impl IntoIterator<Item = (String, String)>) {
        self.layers
            .entry(stage)
            .or_default()
            .extend(entries);
    }

    /// Look up `key`, preferring the most specific layer at or before
    /// `current_stage` in [`STAGE_CHAIN`].
    pub fn get(&self, key: &str, current_stage: Command) -> Option<&str> {
        let cutoff = STAGE_CHAIN
            .iter()
            .position(|s| *s == current_stage)
            .unwrap_or(STAGE_CHAIN.len() - 1);

        STAGE_CHAIN[..=cutoff]
            .iter()
            .rev()
            .find_map(|stage| self.layers.get(stage).and_then(|m| m.get(key)))
            .map(String::as_str)
    }

    /// Every macro visible at `current_stage`, most-specific wins on key
    /// collisions.
    pub fn snapshot(&self, current_stage: Command) -> HashMap<String, String> {
        let cutoff = STAGE_CHAIN
            .iter()
            .position(|s| *s == current_stage)
            .unwrap_or(STAGE_CHAIN.len() - 1);

        let mut out = HashMap::new();
        for stage in &STAGE_CHAIN[..=cutoff] {
            if let Some(layer) = self.layers.get(stage) {
                for (k, v) in layer {
                    out.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        out
    }

    /// Drop all transaction-scoped layers; called on `abort` and whenever a
    /// new message begins. `Connect`/`Helo` layers survive.
    pub fn reset_transaction(&mut self) {
        for stage in TRANSACTION_SCOPED {
            self.layers.remove(stage);
        }
    }

    /// Drop everything; called when the connection itself closes.
    pub fn clear(&mut self) {
        self.layers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn later_stage_shadows_earlier_stage_for_same_key() {
        let mut bag = MacroBag::new();
        bag.set_stage(Command::Connect, [("j".to_string(), "mta1".to_string())]);
        bag.set_stage(Command::Mail, [("j".to_string(), "mta2".to_string())]);

        assert_eq!(bag.get("j", Command::Mail), Some("mta2"));
        assert_eq!(bag.get("j", Command::Connect), Some("mta1"));
    }

    #[test]
    fn reset_transaction_keeps_connect_and_helo() {
        let mut bag = MacroBag::new();
        bag.set_stage(Command::Connect, [("j".to_string(), "mta1".to_string())]);
        bag.set_stage(Command::Helo, [("h".to_string(), "h1".to_string())]);
        bag.set_stage(Command::Mail, [("i".to_string(), "env1".to_string())]);

        bag.reset_transaction();

        assert_eq!(bag.get("j", Command::EndOfMessage), Some("mta1"));
        assert_eq!(bag.get("h", Command::EndOfMessage), Some("h1"));
        assert_eq!(bag.get("i", Command::EndOfMessage), None);
    }

    #[test]
    fn unset_macro_is_none() {
        let bag = MacroBag::new();
        assert_eq!(bag.get("queue_id", Command::EndOfMessage), None);
    }
}
