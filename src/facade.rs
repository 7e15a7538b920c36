//! The transaction façade's public surface (C5, §6): a [`Handler`]
//! implementation that turns per-event wire calls into the higher-level
//! [`Transaction`] API, plus the two-step builder that configures it.
//!
//! Grounded on the teacher's own builder (`milter_builder.rs`'s
//! `MilterBuilder` -> `MilterBuilderWithHandler`), generalized from "wraps
//! one `MessageHandler`" into "wraps one decision function plus an optional
//! recipient validator".

use async_trait::async_trait;

use crate::body::OverflowPolicy;
use crate::command::AddressFamily;
use crate::error::Error;
use crate::header::HeaderOverflowPolicy;
use crate::message::Response;
use crate::options::{OptNeg, Protocol};
use crate::recipients::RecipientEntry;
use crate::session::{Handler, Modifier};
use crate::transaction::{
    ConnectInfo, Decision, HeaderDiffMode, HeloInfo, MailFrom, RcptValidationContext, RcptVerdict,
    Transaction,
};

/// Implemented by the filter author: inspect the accumulated [`Transaction`]
/// and decide what happens to the message (§4.5, §6).
#[async_trait]
pub trait Decide: Send {
    async fn decide(&mut self, trx: &mut Transaction) -> Result<Decision, Error>;
}

/// Implemented by the filter author to approve or reject individual
/// recipients as they arrive, independent of (and earlier than) the main
/// decision (§6).
#[async_trait]
pub trait RcptToValidator: Send {
    async fn validate(&mut self, ctx: &RcptValidationContext) -> Result<RcptVerdict, Error>;
}

/// The default validator: accepts every recipient, used when the filter
/// doesn't configure one of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRcptValidator;

#[async_trait]
impl RcptToValidator for NoRcptValidator {
    async fn validate(&mut self, _ctx: &RcptValidationContext) -> Result<RcptVerdict, Error> {
        Ok(RcptVerdict::Accept)
    }
}

/// Which wire event triggers the decision function (§4.5, §6). Deciding
/// earlier than `EndOfMessage` skips header/body collection for that
/// message but also means no modification actions can be sent, since those
/// only apply alongside the end-of-message reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPoint {
    Connect,
    Helo,
    MailFrom,
    Data,
    EndOfHeaders,
    EndOfMessage,
}

impl Default for DecisionPoint {
    fn default() -> Self {
        DecisionPoint::EndOfMessage
    }
}

impl DecisionPoint {
    /// Protocol "no event" bits for every stage this decision point makes
    /// moot: once the decision is rendered, the library has nothing left to
    /// collect for that message, so it tells the MTA not to bother sending
    /// those events at all (§4.5: "earlier decision points disable the
    /// corresponding later-event protocol bits during negotiation").
    fn skippable_stages(self) -> Protocol {
        use DecisionPoint::*;
        match self {
            Connect => {
                Protocol::NO_HELO
                    | Protocol::NO_MAIL
                    | Protocol::NO_RCPT
                    | Protocol::NO_DATA
                    | Protocol::NO_HEADER
                    | Protocol::NO_EOH
                    | Protocol::NO_BODY
            }
            Helo => {
                Protocol::NO_MAIL
                    | Protocol::NO_RCPT
                    | Protocol::NO_DATA
                    | Protocol::NO_HEADER
                    | Protocol::NO_EOH
                    | Protocol::NO_BODY
            }
            MailFrom => Protocol::NO_DATA | Protocol::NO_HEADER | Protocol::NO_EOH | Protocol::NO_BODY,
            Data => Protocol::NO_HEADER | Protocol::NO_EOH | Protocol::NO_BODY,
            EndOfHeaders => Protocol::NO_BODY,
            EndOfMessage => Protocol::empty(),
        }
    }
}

/// What happens when the decision function or recipient validator returns an
/// error (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Propagate the error, closing the session.
    Propagate,
    Accept,
    TempFail,
    Reject,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::TempFail
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BodyOptions {
    pub max_mem: usize,
    pub max_size: usize,
    pub overflow: OverflowPolicy,
}

/// Default in-memory slice before a body spills to disk: 200 KiB.
pub const DEFAULT_BODY_MAX_MEM: usize = 200 * 1024;
/// Default hard cap on a spooled body: 10 MiB.
pub const DEFAULT_BODY_MAX_SIZE: usize = 10 * 1024 * 1024;
/// Default header count cap (§4.5).
pub const DEFAULT_HEADER_MAX: usize = 512;

#[derive(Debug, Clone)]
pub struct MailFilterOptions {
    pub decision_at: DecisionPoint,
    pub error_handling: ErrorPolicy,
    pub header_diff_mode: HeaderDiffMode,
    pub header_max: usize,
    pub header_overflow: HeaderOverflowPolicy,
    pub body: Option<BodyOptions>,
}

impl Default for MailFilterOptions {
    fn default() -> Self {
        Self {
            decision_at: DecisionPoint::default(),
            error_handling: ErrorPolicy::default(),
            header_diff_mode: HeaderDiffMode::default(),
            header_max: DEFAULT_HEADER_MAX,
            header_overflow: HeaderOverflowPolicy::Truncate,
            body: Some(BodyOptions {
                max_mem: DEFAULT_BODY_MAX_MEM,
                max_size: DEFAULT_BODY_MAX_SIZE,
                overflow: OverflowPolicy::Truncate,
            }),
        }
    }
}

/// Two-step configuration builder, mirroring the teacher's
/// `MilterBuilder`/`MilterBuilderWithHandler` split: start with just a
/// decision function, optionally attach a recipient validator, then turn the
/// whole thing into a per-connection factory or hand it straight to
/// [`crate::server::Server`].
pub struct MailFilterBuilder<D, V = NoRcptValidator> {
    decision: D,
    validator: V,
    options: MailFilterOptions,
}

impl<D> MailFilterBuilder<D, NoRcptValidator>
where
    D: Decide + Clone + Send + 'static,
{
    pub fn new(decision: D) -> Self {
        Self {
            decision,
            validator: NoRcptValidator,
            options: MailFilterOptions::default(),
        }
    }
}

impl<D, V> MailFilterBuilder<D, V> {
    pub fn decision_at(mut self, point: DecisionPoint) -> Self {
        self.options.decision_at = point;
        self
    }

    pub fn error_handling(mut self, policy: ErrorPolicy) -> Self {
        self.options.error_handling = policy;
        self
    }

    pub fn header_diff_mode(mut self, mode: HeaderDiffMode) -> Self {
        self.options.header_diff_mode = mode;
        self
    }

    pub fn without_body(mut self) -> Self {
        self.options.body = None;
        self
    }

    pub fn with_body(mut self, max_mem: usize, max_size: usize, overflow: OverflowPolicy) -> Self {
        self.options.body = Some(BodyOptions {
            max_mem,
            max_size,
            overflow,
        });
        self
    }

    pub fn with_header(mut self, max_headers: usize, overflow: HeaderOverflowPolicy) -> Self {
        self.options.header_max = max_headers;
        self.options.header_overflow = overflow;
        self
    }

    pub fn with_rcpt_to_validator<V2>(self, validator: V2) -> MailFilterBuilder<D, V2>
    where
        V2: RcptToValidator + Clone + Send + 'static,
    {
        MailFilterBuilder {
            decision: self.decision,
            validator,
            options: self.options,
        }
    }
}

impl<D, V> MailFilterBuilder<D, V>
where
    D: Decide + Clone + Send + 'static,
    V: RcptToValidator + Clone + Send + 'static,
{
    /// Turn this configuration into a per-connection factory suitable for
    /// [`crate::server::Server::bind_tcp`]/`bind_unix` (§4.4).
    pub fn into_factory(self) -> impl Fn() -> MailFilterHandler<D, V> + Clone + Send + Sync + 'static {
        let decision = self.decision;
        let validator = self.validator;
        let options = self.options;
        move || MailFilterHandler::new(decision.clone(), validator.clone(), options.clone())
    }

    /// Bind a TCP listener and serve this filter — the `new(network,
    /// address, decision, ...)` entry point from §6, split into its builder
    /// and its network half.
    pub async fn serve_tcp(
        self,
        addr: impl tokio::net::ToSocketAddrs,
    ) -> Result<crate::server::Server, Error> {
        crate::server::Server::bind_tcp(addr, self.into_factory(), OptNeg::default(), None, None).await
    }

    pub async fn serve_unix(
        self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<crate::server::Server, Error> {
        crate::server::Server::bind_unix(path, self.into_factory(), OptNeg::default(), None, None).await
    }
}

fn decision_to_response(decision: &Decision) -> Response {
    match decision {
        Decision::Accept => Response::Accept,
        Decision::Reject => Response::Reject,
        Decision::TempFail => Response::TempFail,
        Decision::Discard => Response::Discard,
        Decision::ReplyCode(text) => Response::ReplyCode { text: text.clone() },
    }
}

/// The [`Handler`] that drives a [`Transaction`] from raw wire events (§4.5,
/// §6). Built by [`MailFilterBuilder`], one fresh instance per connection.
pub struct MailFilterHandler<D, V = NoRcptValidator> {
    decision: D,
    validator: V,
    options: MailFilterOptions,
    connect: Option<ConnectInfo>,
    helo: Option<HeloInfo>,
    trx: Option<Transaction>,
}

impl<D, V> MailFilterHandler<D, V> {
    pub fn new(decision: D, validator: V, options: MailFilterOptions) -> Self {
        Self {
            decision,
            validator,
            options,
            connect: None,
            helo: None,
            trx: None,
        }
    }

    fn fresh_transaction(&self) -> Transaction {
        let (max_mem, max_size, policy) = match &self.options.body {
            Some(b) => (b.max_mem, b.max_size, b.overflow),
            None => (0, 0, OverflowPolicy::Clear),
        };
        Transaction::new(
            self.connect.clone(),
            self.helo.clone(),
            self.options.header_max,
            self.options.header_overflow,
            max_mem,
            max_size,
            policy,
        )
    }
}

impl<D, V> MailFilterHandler<D, V>
where
    D: Decide,
{
    async fn run_decision(&mut self, modifier: &mut Modifier, is_eom: bool) -> Result<Response, Error> {
        let Some(trx) = self.trx.as_mut() else {
            return Ok(Response::Continue);
        };
        trx.snapshot();
        if let Some(id) = modifier.macro_value("i") {
            trx.queue_id = Some(id.to_string());
        }

        // A decision function may run long; ping `progress` on a timer so
        // the MTA doesn't time the session out while it runs (§4.3, §5,
        // scenario F).
        let outcome = modifier
            .run_with_progress_ticker(self.decision.decide(trx))
            .await?;
        let decision = match outcome {
            Ok(d) => d,
            Err(e) => match self.options.error_handling {
                ErrorPolicy::Propagate => return Err(e),
                ErrorPolicy::Accept => Decision::Accept,
                ErrorPolicy::TempFail => Decision::TempFail,
                ErrorPolicy::Reject => Decision::Reject,
            },
        };

        if is_eom {
            let lead_space_supported = modifier.negotiated().header_leading_space_supported();
            for action in trx.modifications(self.options.header_diff_mode, lead_space_supported) {
                modifier.send_action(action).await?;
            }
        }

        let response = decision_to_response(&decision);
        let _ = trx.set_decision(decision);
        Ok(response)
    }
}

#[async_trait]
impl<D, V> Handler for MailFilterHandler<D, V>
where
    D: Decide + 'static,
    V: RcptToValidator + 'static,
{
    async fn negotiate(&mut self, mut negotiated: OptNeg) -> Result<OptNeg, Error> {
        negotiated.protocol |= self.options.decision_at.skippable_stages();
        Ok(negotiated)
    }

    async fn connect(
        &mut self,
        hostname: &str,
        family: AddressFamily,
        port: u16,
        address: &str,
        modifier: &mut Modifier,
    ) -> Result<Response, Error> {
        self.connect = Some(ConnectInfo {
            hostname: hostname.to_string(),
            family,
            port,
            address: address.to_string(),
        });
        self.trx = Some(self.fresh_transaction());
        if self.options.decision_at == DecisionPoint::Connect {
            return self.run_decision(modifier, false).await;
        }
        Ok(Response::Continue)
    }

    async fn helo(&mut self, name: &str, modifier: &mut Modifier) -> Result<Response, Error> {
        let helo = HeloInfo { name: name.to_string() };
        self.helo = Some(helo.clone());
        if let Some(trx) = self.trx.as_mut() {
            trx.helo = Some(helo);
        }
        if self.options.decision_at == DecisionPoint::Helo {
            return self.run_decision(modifier, false).await;
        }
        Ok(Response::Continue)
    }

    async fn mail(
        &mut self,
        address: &str,
        args: &[String],
        modifier: &mut Modifier,
    ) -> Result<Response, Error> {
        self.trx = Some(self.fresh_transaction());
        let trx = self.trx.as_mut().expect("just assigned");
        trx.mail_from = MailFrom {
            address: address.to_string(),
            args: args.to_vec(),
        };
        if self.options.decision_at == DecisionPoint::MailFrom {
            return self.run_decision(modifier, false).await;
        }
        Ok(Response::Continue)
    }

    async fn rcpt(
        &mut self,
        address: &str,
        args: &[String],
        modifier: &mut Modifier,
    ) -> Result<Response, Error> {
        let joined_args = args.join(" ");
        let ctx = RcptValidationContext {
            macros: modifier.macros().clone(),
            connect: self.connect.clone(),
            helo: self.helo.clone(),
            mail_from: self
                .trx
                .as_ref()
                .map(|t| t.mail_from.clone())
                .unwrap_or_default(),
            rcpt_to: RecipientEntry::new(address, joined_args.clone()),
        };

        match self.validator.validate(&ctx).await? {
            RcptVerdict::Accept => {
                if let Some(trx) = self.trx.as_mut() {
                    if !trx.has_decision() {
                        trx.rcpts.add(address, joined_args);
                    }
                }
                Ok(Response::Continue)
            }
            RcptVerdict::RejectRecipient => Ok(Response::Reject),
            RcptVerdict::DiscardTransaction => Ok(Response::Discard),
        }
    }

    async fn data(&mut self, modifier: &mut Modifier) -> Result<Response, Error> {
        if self.options.decision_at == DecisionPoint::Data {
            return self.run_decision(modifier, false).await;
        }
        Ok(Response::Continue)
    }

    async fn header(
        &mut self,
        name: &str,
        value: &str,
        modifier: &mut Modifier,
    ) -> Result<Response, Error> {
        let lead_space_supported = modifier.negotiated().header_leading_space_supported();
        if let Some(trx) = self.trx.as_mut() {
            if !trx.has_decision() {
                trx.headers
                    .push_from_wire(name, value, lead_space_supported)?;
            }
        }
        Ok(Response::Continue)
    }

    async fn end_of_headers(&mut self, modifier: &mut Modifier) -> Result<Response, Error> {
        if self.options.decision_at == DecisionPoint::EndOfHeaders {
            return self.run_decision(modifier, false).await;
        }
        Ok(Response::Continue)
    }

    async fn body(&mut self, chunk: &[u8], _modifier: &mut Modifier) -> Result<Response, Error> {
        if let Some(trx) = self.trx.as_mut() {
            if !trx.has_decision() {
                trx.body.write(chunk)?;
            }
        }
        Ok(Response::Continue)
    }

    async fn end_of_message(&mut self, modifier: &mut Modifier) -> Result<Response, Error> {
        if let Some(trx) = self.trx.as_ref() {
            if trx.has_decision() {
                let response = trx
                    .decision()
                    .map(decision_to_response)
                    .unwrap_or(Response::Accept);
                return Ok(response);
            }
        }
        self.run_decision(modifier, true).await
    }

    async fn unknown(&mut self, _line: &str, _modifier: &mut Modifier) -> Result<Response, Error> {
        Ok(Response::Continue)
    }

    async fn abort(&mut self) {
        self.trx = Some(self.fresh_transaction());
    }

    async fn quit(&mut self) {
        if let Some(trx) = self.trx.as_mut() {
            trx.body.close();
        }
    }

    async fn quit_new_connection(&mut self) {
        self.connect = None;
        self.helo = None;
        self.trx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AddressFamily;
    use crate::options::{Actions, OptNeg};
    use crate::session::Session;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::io::duplex;

    #[derive(Clone)]
    struct RejectIfSubjectSpam {
        seen_subjects: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Decide for RejectIfSubjectSpam {
        async fn decide(&mut self, trx: &mut Transaction) -> Result<Decision, Error> {
            let subject = trx.headers.get("Subject").unwrap_or_default().to_string();
            self.seen_subjects.lock().unwrap().push(subject.clone());
            if subject.contains("SPAM") {
                Ok(Decision::Reject)
            } else {
                Ok(Decision::Accept)
            }
        }
    }

    #[tokio::test]
    async fn accepts_a_clean_message_end_to_end() {
        let (mta_side, filter_side) = duplex(64 * 1024);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let builder = MailFilterBuilder::new(RejectIfSubjectSpam {
            seen_subjects: Arc::clone(&seen),
        });
        let factory = builder.into_factory();
        let handler = factory();

        let mut session = Session::new(filter_side, handler, OptNeg::default());
        let server = tokio::spawn(async move { session.run().await });

        let mut client = crate::session::Client::new(mta_side);
        client
            .negotiate(OptNeg {
                actions: Actions::all(),
                ..OptNeg::default()
            })
            .await
            .unwrap();

        client
            .send_event(&crate::message::Request::Connect {
                hostname: "mail.example.com".into(),
                family: AddressFamily::Inet4,
                port: 25,
                address: "192.0.2.1".into(),
            })
            .await
            .unwrap();
        client.read_packet().await.unwrap();

        client
            .send_event(&crate::message::Request::Mail {
                address: "<a@example.com>".into(),
                args: vec![],
            })
            .await
            .unwrap();
        client.read_packet().await.unwrap();

        client
            .send_event(&crate::message::Request::Header {
                name: "Subject".into(),
                value: "hello".into(),
            })
            .await
            .unwrap();
        client.read_packet().await.unwrap();

        client
            .send_event(&crate::message::Request::EndOfMessage)
            .await
            .unwrap();
        let packet = client.read_packet().await.unwrap();
        assert_eq!(packet.code, crate::command::response_code::ACCEPT);

        client.send_event(&crate::message::Request::Quit).await.unwrap();
        drop(client);
        server.await.unwrap().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn mail_from_decision_point_disables_header_and_body_events() {
        let bits = DecisionPoint::MailFrom.skippable_stages();
        assert!(bits.contains(crate::options::Protocol::NO_HEADER));
        assert!(bits.contains(crate::options::Protocol::NO_BODY));
        assert!(bits.contains(crate::options::Protocol::NO_EOH));
        assert!(!bits.contains(crate::options::Protocol::NO_RCPT));
    }

    #[test]
    fn end_of_message_decision_point_disables_nothing() {
        assert_eq!(DecisionPoint::EndOfMessage.skippable_stages(), crate::options::Protocol::empty());
    }

    #[tokio::test]
    async fn deciding_at_mail_from_skips_header_collection_and_short_circuits_eom() {
        #[derive(Clone)]
        struct AcceptAtMailFrom;
        #[async_trait]
        impl Decide for AcceptAtMailFrom {
            async fn decide(&mut self, _trx: &mut Transaction) -> Result<Decision, Error> {
                Ok(Decision::Accept)
            }
        }

        let (mta_side, filter_side) = duplex(64 * 1024);
        let builder = MailFilterBuilder::new(AcceptAtMailFrom).decision_at(DecisionPoint::MailFrom);
        let factory = builder.into_factory();
        let handler = factory();

        let mut session = Session::new(filter_side, handler, OptNeg::default());
        let server = tokio::spawn(async move { session.run().await });

        let mut client = crate::session::Client::new(mta_side);
        let granted = client
            .negotiate(OptNeg {
                actions: Actions::all(),
                ..OptNeg::default()
            })
            .await
            .unwrap();
        assert!(granted.protocol.contains(crate::options::Protocol::NO_HEADER));
        assert!(granted.protocol.contains(crate::options::Protocol::NO_BODY));

        client
            .send_event(&crate::message::Request::Mail {
                address: "<a@example.com>".into(),
                args: vec![],
            })
            .await
            .unwrap();
        let packet = client.read_packet().await.unwrap();
        assert_eq!(packet.code, crate::command::response_code::ACCEPT);

        // a well-behaved MTA would not send these now that the bits are
        // negotiated, but a terminal eom reply still must be produced if it
        // does send EndOfMessage (the protocol has no "no eom" bit).
        client
            .send_event(&crate::message::Request::EndOfMessage)
            .await
            .unwrap();
        let packet = client.read_packet().await.unwrap();
        assert_eq!(packet.code, crate::command::response_code::ACCEPT);

        client.send_event(&crate::message::Request::Quit).await.unwrap();
        drop(client);
        server.await.unwrap().unwrap();
    }

    /// Scenario F (§8): a 2.5 s decision must produce at least two
    /// `progress` pings on the wire before the terminal response.
    #[tokio::test(start_paused = true)]
    async fn long_decision_sends_progress_pings_before_terminal_response() {
        #[derive(Clone)]
        struct SlowDecision;
        #[async_trait]
        impl Decide for SlowDecision {
            async fn decide(&mut self, _trx: &mut Transaction) -> Result<Decision, Error> {
                tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
                Ok(Decision::Accept)
            }
        }

        let (mta_side, filter_side) = duplex(64 * 1024);
        let builder = MailFilterBuilder::new(SlowDecision).decision_at(DecisionPoint::MailFrom);
        let factory = builder.into_factory();
        let handler = factory();

        let mut session = Session::new(filter_side, handler, OptNeg::default());
        let server = tokio::spawn(async move { session.run().await });

        let mut client = crate::session::Client::new(mta_side);
        client
            .negotiate(OptNeg {
                actions: Actions::all(),
                ..OptNeg::default()
            })
            .await
            .unwrap();

        client
            .send_event(&crate::message::Request::Mail {
                address: "<a@example.com>".into(),
                args: vec![],
            })
            .await
            .unwrap();

        let mut progress_count = 0;
        loop {
            let packet = client.read_packet().await.unwrap();
            if packet.code == crate::command::response_code::PROGRESS {
                progress_count += 1;
                continue;
            }
            assert_eq!(packet.code, crate::command::response_code::ACCEPT);
            break;
        }
        assert!(
            progress_count >= 2,
            "expected at least two progress pings, got {progress_count}"
        );

        client.send_event(&crate::message::Request::Quit).await.unwrap();
        drop(client);
        server.await.unwrap().unwrap();
    }

    /// If the MTA goes away mid-decision, the progress write fails and the
    /// library reports that failure rather than the decision's own result
    /// (§5: "the library then reports the original error").
    #[tokio::test(start_paused = true)]
    async fn mta_disconnect_during_decision_surfaces_the_write_error() {
        #[derive(Clone)]
        struct SlowDecision;
        #[async_trait]
        impl Decide for SlowDecision {
            async fn decide(&mut self, _trx: &mut Transaction) -> Result<Decision, Error> {
                tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
                Ok(Decision::Accept)
            }
        }

        let (mta_side, filter_side) = duplex(64 * 1024);
        let builder = MailFilterBuilder::new(SlowDecision).decision_at(DecisionPoint::MailFrom);
        let factory = builder.into_factory();
        let handler = factory();

        let mut session = Session::new(filter_side, handler, OptNeg::default());
        let server = tokio::spawn(async move { session.run().await });

        let mut client = crate::session::Client::new(mta_side);
        client
            .negotiate(OptNeg {
                actions: Actions::all(),
                ..OptNeg::default()
            })
            .await
            .unwrap();

        client
            .send_event(&crate::message::Request::Mail {
                address: "<a@example.com>".into(),
                args: vec![],
            })
            .await
            .unwrap();

        // Hang up before the decision (and its progress pings) can finish.
        drop(client);

        let result = server.await.unwrap();
        assert!(result.is_err());
    }
}
