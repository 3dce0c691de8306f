//! A connected device CLI session.
//!
//! The session identifies the device family at connect time, then tracks
//! where the CLI is (exec, top-level config, nested config) from every
//! prompt it consumes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

use super::response::{Response, strip_echo};
use crate::channel::{CompiledPattern, ExpectEngine, PatternSet};
use crate::context::CallerContext;
use crate::error::{ApplyError, ConnectError, DriverError, Result};
use crate::platform::{Classification, Family, FamilyPolicy, Slot, WaitSet};
use crate::transport::Transport;

/// Command used to identify the device family.
pub const VERSION_PROBE: &str = "show version";

/// Upper bound on context exits while leaving config mode.
pub(super) const MAX_UNWIND: usize = 32;

/// Reply excerpt kept in identification errors.
const EXCERPT_LEN: usize = 200;

/// Any CLI prompt ending in `#` or `>`, used before the family is known.
const GENERIC_PROMPT: &str = r"(?m)^[^\s#>]*\w[^\s#>]*[#>] ?$";

// login prompt first, then the device prompt
static LOGIN: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::from_patterns(vec![
        CompiledPattern::new(r"(?im)^[^\n]*(?:login|username|password)[ \t]*:[ \t]*$").unwrap(),
        CompiledPattern::new(GENERIC_PROMPT).unwrap(),
    ])
});

// pager first, then the device prompt
static PROBE: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::from_patterns(vec![
        CompiledPattern::new(r"--More--|<--- More --->|Press any key to continue").unwrap(),
        CompiledPattern::new(GENERIC_PROMPT).unwrap(),
    ])
});

/// An identified device session.
pub struct Session<T> {
    pub(super) engine: ExpectEngine<T>,
    pub(super) family: Family,
    pub(super) policy: &'static FamilyPolicy,
    pub(super) prompts: WaitSet,
    pub(super) commands: WaitSet,
    pub(super) lines: WaitSet,
    pub(super) read_timeout: Duration,
    pub(super) in_config: bool,
    pub(super) at_top: bool,
    /// Set when an apply stopped on a transport failure. The next command
    /// first brings the CLI back out of config mode.
    pub(super) unsettled: bool,
}

impl<T: Transport> Session<T> {
    /// Wait for the login to settle, identify the family from the version
    /// probe and run the family's session setup commands.
    pub async fn open(
        transport: T,
        read_timeout: Duration,
        tracer: Option<Arc<dyn CallerContext>>,
    ) -> Result<Self> {
        let mut engine = ExpectEngine::new(transport);
        engine.set_tracer(tracer);

        let first = engine.expect(&LOGIN, read_timeout).await?;
        if first.index == 0 {
            return Err(ConnectError::AuthenticationFailure {
                prompt: first.matched.trim().to_string(),
            }
            .into());
        }

        engine.send(VERSION_PROBE).await?;
        let mut reply = String::new();
        loop {
            let got = engine.expect(&PROBE, read_timeout).await?;
            reply.push_str(&got.before);
            if got.index == 0 {
                engine.write(" ").await?;
                continue;
            }
            break;
        }

        let family = Family::identify(&reply).ok_or_else(|| ConnectError::UnrecognizedDevice {
            excerpt: excerpt(strip_echo(&reply)),
        })?;
        info!("identified {} device", family);

        let policy = family.policy();
        let mut session = Self {
            engine,
            family,
            policy,
            prompts: policy.prompt_set(),
            commands: policy.command_set(),
            lines: policy.line_set(),
            read_timeout,
            in_config: false,
            at_top: true,
            unsettled: false,
        };
        for command in &policy.commands.setup {
            session.command(command).await?;
        }
        Ok(session)
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn policy(&self) -> &'static FamilyPolicy {
        self.policy
    }

    /// Whether the last prompt was a config-mode prompt.
    pub fn in_config(&self) -> bool {
        self.in_config
    }

    /// Whether the last prompt was not a nested config context.
    pub fn at_top(&self) -> bool {
        self.at_top
    }

    /// Whether the CLI state is unknown after a failed apply.
    pub fn needs_recovery(&self) -> bool {
        self.unsettled
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn set_tracer(&mut self, tracer: Option<Arc<dyn CallerContext>>) {
        self.engine.set_tracer(tracer);
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    /// Run an operational command. Refused while in config mode.
    pub async fn exec(&mut self, command: &str) -> Result<Response> {
        self.recover().await?;
        if self.in_config {
            return Err(DriverError::CommandRefused {
                command: command.to_string(),
                reason: "session is in config mode".to_string(),
            }
            .into());
        }
        self.command(command).await
    }

    /// Read the running configuration in normalized form.
    pub async fn show_config(&mut self) -> Result<String> {
        let policy = self.policy;
        let response = self.exec(&policy.commands.dump).await?;
        Ok(policy.transform_inbound(&response.result))
    }

    /// Send one command in whatever mode the session is in and wait for
    /// the next prompt, answering confirmation questions on the way.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let start = Instant::now();
        self.engine.send(command).await?;

        let mut raw = String::new();
        let prompt = loop {
            let got = self.engine.expect(&self.commands.set, self.read_timeout).await?;
            raw.push_str(&got.before);
            match self.commands.slot(got.index) {
                Slot::Prompt(kind) => {
                    self.observe(kind);
                    break got.matched;
                }
                Slot::Confirm(i) => {
                    raw.push_str(&got.matched);
                    self.answer(i).await?;
                }
                Slot::ErrorLeader => raw.push_str(&got.matched),
            }
        };

        let result = strip_echo(&raw).to_string();
        let failure = match self.policy.scan_reply(command, &result) {
            Some((Classification::Fatal, line)) => Some(line),
            _ => None,
        };
        let response = Response::new(command, result, raw, prompt.trim(), start.elapsed());
        Ok(match failure {
            Some(line) => response.with_failure(line),
            None => response,
        })
    }

    /// Close the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.engine.close().await
    }

    /// Send the priming commands that enter config mode.
    ///
    /// A failure here is reported with the device's own reply and nothing
    /// is done to recover from it.
    pub(super) async fn enter_config(&mut self, commands: &[String]) -> Result<()> {
        self.recover().await?;
        let policy = self.policy;
        for command in commands {
            self.engine.send(command).await?;
            let mut reply = String::new();
            loop {
                let got = self.engine.expect(&self.lines.set, self.read_timeout).await?;
                reply.push_str(&got.before);
                match self.lines.slot(got.index) {
                    Slot::Prompt(kind) => {
                        self.observe(kind);
                        break;
                    }
                    Slot::Confirm(i) => {
                        reply.push_str(&got.matched);
                        self.answer(i).await?;
                    }
                    Slot::ErrorLeader => {
                        reply.push_str(&got.matched);
                        self.resync(&mut reply).await?;
                        return Err(self.apply_error(command, strip_echo(&reply).trim()).into());
                    }
                }
            }
            if policy.scan_reply(command, strip_echo(&reply)).is_some() {
                return Err(self.apply_error(command, strip_echo(&reply).trim()).into());
            }
        }
        if !self.in_config {
            let command = commands.last().map(String::as_str).unwrap_or_default();
            return Err(self.apply_error(command, "failed to enter config mode").into());
        }
        debug!("entered config mode");
        Ok(())
    }

    /// Step out of nested contexts until the top-level config prompt.
    pub(super) async fn move_to_top(&mut self) -> Result<()> {
        let policy = self.policy;
        let mut exits = 0;
        while self.in_config && !self.at_top {
            if exits == MAX_UNWIND {
                warn!("still in a nested context after {} exits", exits);
                break;
            }
            self.command(&policy.commands.context_exit).await?;
            exits += 1;
        }
        Ok(())
    }

    /// Leave config mode.
    pub(super) async fn exit_config(&mut self) -> Result<()> {
        let commands = &self.policy.commands;
        if !self.in_config {
            return Ok(());
        }
        if !commands.exit_config_repeat {
            self.command(&commands.exit_config).await?;
        } else {
            let mut exits = 0;
            while self.in_config && exits < MAX_UNWIND {
                self.command(&commands.exit_config).await?;
                exits += 1;
            }
        }
        if self.in_config {
            warn!("still in config mode after '{}'", commands.exit_config);
        }
        Ok(())
    }

    pub(super) fn mark_unsettled(&mut self) {
        self.unsettled = true;
    }

    /// Find the prompt again after an interrupted apply and leave config
    /// mode. Stays unsettled if the device still does not answer.
    pub(super) async fn recover(&mut self) -> Result<()> {
        if !self.unsettled {
            return Ok(());
        }
        warn!("recovering session state after an interrupted apply");
        self.engine.clear();
        self.engine.send("").await?;
        let mut discarded = String::new();
        self.resync(&mut discarded).await?;
        self.move_to_top().await?;
        self.exit_config().await?;
        self.unsettled = false;
        debug!("session recovered, in config mode: {}", self.in_config);
        Ok(())
    }

    /// Consume output up to the next prompt, appending it to `reply`.
    pub(super) async fn resync(&mut self, reply: &mut String) -> Result<()> {
        let got = self.engine.expect(&self.prompts.set, self.read_timeout).await?;
        reply.push_str(&got.before);
        if let Slot::Prompt(kind) = self.prompts.slot(got.index) {
            self.observe(kind);
        }
        Ok(())
    }

    /// Answer confirmation question `index`.
    pub(super) async fn answer(&mut self, index: usize) -> Result<()> {
        let reply = self.policy.confirmations[index].reply();
        debug!("answering confirmation with {:?}", reply);
        self.engine.write(&reply).await
    }

    pub(super) fn observe(&mut self, kind: crate::platform::PromptKind) {
        self.in_config = kind.in_config();
        self.at_top = kind.at_top();
    }

    /// An apply failure carrying the current navigational state.
    pub(super) fn apply_error(&self, command: &str, device_text: &str) -> ApplyError {
        ApplyError::new(command, device_text, self.at_top, self.in_config)
    }
}

fn excerpt(reply: &str) -> String {
    reply.trim().chars().take(EXCERPT_LEN).collect()
}
