//! The apply state machine.
//!
//! Pushes transformed batches into config mode, classifies the reply to
//! every line, retries lines the device reports as busy, and on a failed
//! line climbs back to the top-level prompt and out of config mode before
//! reporting it.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::clock::Clock;
use super::response::strip_echo;
use super::session::Session;
use crate::context::CallerContext;
use crate::error::{ApplyError, Error, Result};
use crate::platform::{Classification, CommitStep, Diagnostic, Slot};
use crate::transform::{ApplyBatch, OutboundLine};
use crate::transport::Transport;

/// Retries of one busy line before it is reported as failed.
pub(super) const MAX_RETRIES: usize = 60;

/// Delay between retries of a busy line.
pub(super) const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Budget requested from the caller when a line first turns out busy.
pub(super) const RETRY_BUDGET: Duration = Duration::from_secs(600);

/// Share of the write timeout after which the caller deadline is renewed.
const REFRESH_FRACTION: f64 = 0.8;

/// What to send for one apply.
pub(super) struct ApplyPlan<'p> {
    /// Commands that enter config mode.
    pub priming: Vec<String>,
    pub batches: Vec<ApplyBatch>,
    /// Runs in config mode after the last batch.
    pub commit: Option<&'p CommitStep>,
}

impl ApplyPlan<'_> {
    /// The whole session as text, without touching the device.
    pub fn render(&self, exit: &str) -> String {
        let mut out = String::new();
        for command in &self.priming {
            out.push_str(command);
            out.push('\n');
        }
        for batch in &self.batches {
            out.push_str(&batch.joined());
        }
        if let Some(step) = self.commit {
            out.push_str(&step.command);
            out.push('\n');
        }
        out.push_str(exit);
        out.push('\n');
        out
    }
}

/// How one line ended.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Done,
    /// The device asked for the line to be sent again later.
    Busy(String),
}

pub(super) struct ApplyMachine<'a, T> {
    session: &'a mut Session<T>,
    clock: &'a dyn Clock,
    context: &'a dyn CallerContext,
    write_timeout: Duration,
    last_refresh: Instant,
}

impl<'a, T: Transport> ApplyMachine<'a, T> {
    pub fn new(
        session: &'a mut Session<T>,
        clock: &'a dyn Clock,
        context: &'a dyn CallerContext,
        write_timeout: Duration,
    ) -> Self {
        let last_refresh = clock.now();
        Self {
            session,
            clock,
            context,
            write_timeout,
            last_refresh,
        }
    }

    /// Enter config mode, push every batch, run the commit step and leave.
    ///
    /// Only a rejected line triggers the unwind. Any other failure marks
    /// the session for recovery before its next command.
    pub async fn run(&mut self, plan: &ApplyPlan<'_>) -> Result<()> {
        let result = self.drive(plan).await;
        if let Err(e) = &result {
            if !matches!(e, Error::Apply(_)) {
                self.session.mark_unsettled();
            }
        }
        result
    }

    async fn drive(&mut self, plan: &ApplyPlan<'_>) -> Result<()> {
        self.session.enter_config(&plan.priming).await?;
        match self.push(plan).await {
            Ok(()) => self.leave().await,
            Err(Error::Apply(e)) => {
                warn!("'{}' rejected: {}", e.command, e.device_text);
                self.unwind().await;
                Err(e.into())
            }
            Err(other) => Err(other),
        }
    }

    async fn push(&mut self, plan: &ApplyPlan<'_>) -> Result<()> {
        let total: usize = plan.batches.iter().map(ApplyBatch::len).sum();
        debug!("applying {} lines in {} batches", total, plan.batches.len());
        for batch in &plan.batches {
            if self.session.policy.dispatch.pipelined {
                self.push_pipelined(batch).await?;
            } else {
                for line in &batch.lines {
                    self.refresh();
                    self.session.engine.send(&line.text).await?;
                    if let LineOutcome::Busy(text) = self.await_line(line).await? {
                        self.retry(line, text).await?;
                    }
                }
            }
        }
        if let Some(step) = plan.commit {
            self.refresh();
            self.commit(step).await?;
        }
        Ok(())
    }

    /// Send a whole batch at once, then match one reply per line.
    ///
    /// Busy lines are retried one by one once every in-flight reply of
    /// the batch has been read.
    async fn push_pipelined(&mut self, batch: &ApplyBatch) -> Result<()> {
        self.refresh();
        self.session.engine.write(&batch.joined()).await?;
        let mut busy = Vec::new();
        for (i, line) in batch.lines.iter().enumerate() {
            self.refresh();
            match self.await_line(line).await {
                Ok(LineOutcome::Done) => {}
                Ok(LineOutcome::Busy(text)) => busy.push((line, text)),
                Err(Error::Apply(e)) => {
                    self.drain(&batch.lines[i + 1..]).await;
                    return Err(e.into());
                }
                Err(other) => return Err(other),
            }
        }
        for (line, text) in busy {
            self.retry(line, text).await?;
        }
        Ok(())
    }

    /// Read the replies to lines already sent, ignoring their outcome.
    async fn drain(&mut self, lines: &[OutboundLine]) {
        for line in lines {
            match self.await_line(line).await {
                Ok(_) | Err(Error::Apply(_)) => {}
                Err(e) => {
                    warn!("stopped draining batch output: {}", e);
                    return;
                }
            }
        }
    }

    /// Resend a busy line until it goes through or the retries run out.
    async fn retry(&mut self, line: &OutboundLine, mut text: String) -> Result<()> {
        for attempt in 1..=MAX_RETRIES {
            if attempt == 1 {
                self.context.extend_timeout(RETRY_BUDGET);
            }
            debug!("'{}' busy ({}), retry {}/{}", line.text, text, attempt, MAX_RETRIES);
            self.clock.sleep(RETRY_BACKOFF).await;
            self.refresh();
            self.session.engine.send(&line.text).await?;
            match self.await_line(line).await? {
                LineOutcome::Done => {
                    info!("'{}' accepted after {} retries", line.text, attempt);
                    return Ok(());
                }
                LineOutcome::Busy(reply) => text = reply,
            }
        }
        Err(self.session.apply_error(&line.text, &text).into())
    }

    /// Wait for the reply to a line that has been sent and classify it.
    async fn await_line(&mut self, line: &OutboundLine) -> Result<LineOutcome> {
        let session = &mut *self.session;
        let policy = session.policy;

        let echoed = match policy.echo_of(line) {
            Some(echo) => {
                session.engine.expect_literal(echo, session.read_timeout).await?;
                true
            }
            None => false,
        };
        let skip = if echoed { 1 } else { line.text.lines().count().max(1) };

        let mut reply = String::new();
        loop {
            let got = session.engine.expect(&session.lines.set, session.read_timeout).await?;
            reply.push_str(&got.before);
            match session.lines.slot(got.index) {
                Slot::Confirm(i) => {
                    if let Some((Classification::Fatal, text)) = scan(session, line, &reply, skip) {
                        return Err(session.apply_error(&line.text, &text).into());
                    }
                    reply.push_str(&got.matched);
                    reply.push('\n');
                    session.answer(i).await?;
                }
                Slot::ErrorLeader => {
                    let leader = got.matched.trim().to_string();
                    reply.push_str(&got.matched);
                    session.resync(&mut reply).await?;
                    return match scan(session, line, &reply, skip) {
                        Some((Classification::Retry, text)) => Ok(LineOutcome::Busy(text)),
                        Some((_, text)) => Err(session.apply_error(&line.text, &text).into()),
                        None if policy.classify_reply(Some(&line.text), &leader)
                            == Classification::Warning =>
                        {
                            debug!("ignoring '{}' after '{}'", leader, line.text);
                            Ok(LineOutcome::Done)
                        }
                        None => Err(session.apply_error(&line.text, &leader).into()),
                    };
                }
                Slot::Prompt(kind) => {
                    session.observe(kind);
                    if policy.strict_config_mode && !kind.in_config() {
                        return Err(session
                            .apply_error(&line.text, "exited from config mode")
                            .into());
                    }
                    return match scan(session, line, &reply, skip) {
                        Some((Classification::Retry, text)) => Ok(LineOutcome::Busy(text)),
                        Some((_, text)) => Err(session.apply_error(&line.text, &text).into()),
                        None => Ok(LineOutcome::Done),
                    };
                }
            }
        }
    }

    /// Send a commit step; on failure, replace the device text with the
    /// diagnostic output unless it only says there is nothing to report.
    async fn commit(&mut self, step: &CommitStep) -> Result<()> {
        let line = OutboundLine::new(step.command.clone());
        self.session.engine.send(&line.text).await?;
        let outcome = match self.await_line(&line).await {
            Ok(LineOutcome::Done) => return Ok(()),
            Ok(LineOutcome::Busy(text)) => self.retry(&line, text).await,
            Err(e) => Err(e),
        };
        match (outcome, &step.diagnostic) {
            (Err(Error::Apply(e)), Some(diagnostic)) => Err(self.diagnose(e, diagnostic).await?.into()),
            (outcome, _) => outcome,
        }
    }

    async fn diagnose(&mut self, error: ApplyError, diagnostic: &Diagnostic) -> Result<ApplyError> {
        let response = self.session.command(&diagnostic.command).await?;
        if response.result.contains(diagnostic.benign.as_str()) {
            return Ok(error);
        }
        Ok(ApplyError {
            device_text: response.result.trim().to_string(),
            ..error
        })
    }

    async fn leave(&mut self) -> Result<()> {
        self.session.move_to_top().await?;
        self.session.exit_config().await
    }

    async fn unwind(&mut self) {
        if let Err(e) = self.leave().await {
            warn!("unwind after rejected line failed: {}", e);
            self.session.mark_unsettled();
        }
    }

    /// Renew the caller deadline once most of the write timeout is spent.
    fn refresh(&mut self) {
        let now = self.clock.now();
        if now.duration_since(self.last_refresh) > self.write_timeout.mul_f64(REFRESH_FRACTION) {
            self.context.extend_timeout(self.write_timeout);
            self.last_refresh = now;
        }
    }
}

/// The first fatal or retryable line of a reply, past the echo.
fn scan<T>(
    session: &Session<T>,
    line: &OutboundLine,
    reply: &str,
    skip: usize,
) -> Option<(Classification, String)> {
    let mut body = reply;
    for _ in 0..skip {
        body = strip_echo(body);
    }
    session.policy.scan_reply(&line.text, body)
}
