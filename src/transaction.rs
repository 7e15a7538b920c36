//! The transaction façade's state (part of C5, §4.5, §6): everything the
//! filter accumulates across one message, plus the decision/diff machinery
//! that runs at end-of-message.
//!
//! Grounded on the teacher's own two-step builder style
//! (`milter_builder.rs`'s `MilterBuilder`/`MilterBuilderWithHandler`) for the
//! companion [`crate::facade`] configuration surface, and on
//! `miltr-common`'s capability-gated modification response
//! (`other_examples/75978518_..._modifications-mod.rs.rs`) for how a
//! façade turns accumulated edits into a single batch of wire actions.

use std::collections::HashMap;

use bytes::Bytes;

use crate::body::BodySpool;
use crate::command::AddressFamily;
use crate::error::{Error, UsageError};
use crate::header::{self, HeaderField, HeaderList};
use crate::message::ModificationAction;
use crate::recipients::{self, RecipientEntry, RecipientSet};

/// `connect` event data, captured once per connection (§4.1).
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    pub hostname: String,
    pub family: AddressFamily,
    pub port: u16,
    pub address: String,
}

/// `helo` event data, captured once per connection (possibly more than once
/// if the MTA re-negotiates TLS and re-sends `HELO`).
#[derive(Debug, Clone, Default)]
pub struct HeloInfo {
    pub name: String,
}

/// The envelope sender, including ESMTP `MAIL FROM` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailFrom {
    pub address: String,
    pub args: Vec<String>,
}

/// How the transaction's decision should be rendered back to the MTA (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    TempFail,
    Discard,
    /// A custom SMTP reply, already formatted by [`crate::reply::format_reply`].
    ReplyCode(String),
}

/// Which header-diff strategy to use at end-of-message (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderDiffMode {
    #[default]
    Incremental,
    SendmailCompat,
}

/// Snapshot handed to an [`crate::facade::RcptToValidator`]: a read-only copy
/// of everything known about the transaction at the moment a `RCPT TO`
/// arrived (§6).
#[derive(Debug, Clone)]
pub struct RcptValidationContext {
    pub macros: HashMap<String, String>,
    pub connect: Option<ConnectInfo>,
    pub helo: Option<HeloInfo>,
    pub mail_from: MailFrom,
    pub rcpt_to: RecipientEntry,
}

/// What an [`crate::facade::RcptToValidator`] decided about one recipient (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcptVerdict {
    Accept,
    RejectRecipient,
    DiscardTransaction,
}

/// Everything accumulated for one message, from `MAIL FROM` through
/// end-of-message. A fresh [`Transaction`] is created for each message on a
/// connection; `connect`/`helo` carry over (§4.3 item 2).
pub struct Transaction {
    pub connect: Option<ConnectInfo>,
    pub helo: Option<HeloInfo>,
    pub mail_from: MailFrom,
    pub rcpts: RecipientSet,
    pub headers: HeaderList,
    pub body: BodySpool,
    pub body_replacement: Option<Bytes>,
    pub quarantine_reason: Option<String>,
    pub queue_id: Option<String>,

    orig_mail_from: MailFrom,
    orig_rcpts: Vec<RecipientEntry>,
    orig_headers: Vec<HeaderField>,
    snapshotted: bool,
    decision: Option<Decision>,
}

impl Transaction {
    pub fn new(
        connect: Option<ConnectInfo>,
        helo: Option<HeloInfo>,
        header_cap: usize,
        header_policy: header::HeaderOverflowPolicy,
        body_max_mem: usize,
        body_max_total: usize,
        body_policy: crate::body::OverflowPolicy,
    ) -> Self {
        Self {
            connect,
            helo,
            mail_from: MailFrom::default(),
            rcpts: RecipientSet::new(),
            headers: HeaderList::new(header_cap, header_policy),
            body: BodySpool::new(body_max_mem, body_max_total, body_policy),
            body_replacement: None,
            quarantine_reason: None,
            queue_id: None,
            orig_mail_from: MailFrom::default(),
            orig_rcpts: Vec::new(),
            orig_headers: Vec::new(),
            snapshotted: false,
            decision: None,
        }
    }

    /// Freeze the "as received" state. Called once, right before the
    /// decision function runs, so later edits can be diffed against it.
    pub fn snapshot(&mut self) {
        if self.snapshotted {
            return;
        }
        self.orig_mail_from = self.mail_from.clone();
        self.orig_rcpts = self.rcpts.rcpts().to_vec();
        self.orig_headers = self.headers.fields().to_vec();
        self.snapshotted = true;
    }

    pub fn has_decision(&self) -> bool {
        self.decision.is_some()
    }

    pub fn set_decision(&mut self, decision: Decision) -> Result<(), Error> {
        if self.decision.is_some() {
            return Err(UsageError::DecisionAlreadyMade.into());
        }
        self.decision = Some(decision);
        Ok(())
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Assemble the full end-of-message modification batch: envelope-sender
    /// change, recipient adds/deletes, header edits, optional full-body
    /// replacement, optional quarantine — in that order (§4.5 scenario C).
    /// `lead_space_supported` is the negotiated `HEADER_LEAD_SPACE` bit
    /// (§2.2, §6): when it wasn't negotiated, header values restore the
    /// single leading space the MTA expects.
    pub fn modifications(
        &self,
        header_mode: HeaderDiffMode,
        lead_space_supported: bool,
    ) -> Vec<ModificationAction> {
        let mut ops = Vec::new();

        if self.mail_from != self.orig_mail_from {
            ops.push(ModificationAction::ChangeFrom {
                address: wrap_addr(&self.mail_from.address),
                args: self.mail_from.args.join(" "),
            });
        }

        ops.extend(recipients::diff(&self.orig_rcpts, self.rcpts.rcpts()));

        ops.extend(match header_mode {
            HeaderDiffMode::Incremental => header::diff(
                &self.orig_headers,
                self.headers.fields(),
                lead_space_supported,
            ),
            HeaderDiffMode::SendmailCompat => header::diff_sendmail_compat(
                &self.orig_headers,
                self.headers.fields(),
                lead_space_supported,
            ),
        });

        if let Some(body) = &self.body_replacement {
            ops.push(ModificationAction::ReplaceBody { chunk: body.clone() });
        }

        if let Some(reason) = &self.quarantine_reason {
            ops.push(ModificationAction::Quarantine {
                reason: reason.clone(),
            });
        }

        ops
    }
}

fn wrap_addr(addr: &str) -> String {
    if addr.starts_with('<') {
        addr.to_string()
    } else {
        format!("<{addr}>")
    }
}
