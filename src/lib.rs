//! rmilter
//! =======
//!
//! **rmilter** implements both sides of the [Milter protocol][milter] — the
//! binary RPC `sendmail`/Postfix use to talk to external mail filters — in
//! pure, safe, async Rust.
//!
//! [milter]: https://man.openbsd.org/milter.3
//!
//! Three layers, from the wire up:
//!
//! - [`codec`]/[`message`]/[`command`]/[`options`] — framing and the typed
//!   request/response/modification-action payloads (§3, §6 of the protocol).
//! - [`session`] — the state machine that drives one MTA↔filter conversation:
//!   negotiation, the event loop, macro bookkeeping, skip/abort/quit, and the
//!   [`session::Modifier`] handle filters use to send modification actions
//!   and progress pings.
//! - [`facade`] — the high-level API most filter authors want: write one
//!   [`facade::Decide::decide`] function against a whole buffered
//!   [`transaction::Transaction`] instead of per-event callbacks, and let the
//!   library compute the header/recipient/envelope-sender diff at
//!   end-of-message.
//!
//! [`server::Server`] ties the session layer to a listening socket: an
//! accept loop, one task per connection, and graceful shutdown.
//!
//! Usage
//! -----
//!
//! ```no_run
//! use rmilter::facade::{Decide, MailFilterBuilder};
//! use rmilter::transaction::{Decision, Transaction};
//! use rmilter::error::Error;
//!
//! #[derive(Clone)]
//! struct RejectSpamSubject;
//!
//! #[async_trait::async_trait]
//! impl Decide for RejectSpamSubject {
//!     async fn decide(&mut self, trx: &mut Transaction) -> Result<Decision, Error> {
//!         if trx.headers.get("Subject").unwrap_or_default().contains("SPAM") {
//!             Ok(Decision::Reject)
//!         } else {
//!             Ok(Decision::Accept)
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut server = MailFilterBuilder::new(RejectSpamSubject)
//!         .serve_tcp("127.0.0.1:31337")
//!         .await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod codec;
pub mod command;
pub mod error;
pub mod facade;
pub mod header;
pub mod macros;
pub mod message;
pub mod options;
pub mod recipients;
pub mod reply;
pub mod server;
pub mod session;
pub mod transaction;
