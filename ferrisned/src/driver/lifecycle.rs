//! Change lifecycle controller.
//!
//! [`DeviceDriver`] owns an identified session and maps each lifecycle
//! phase onto applies, commit steps and saves, depending on the family
//! and the resolved settings.

use std::sync::Arc;

use log::{debug, info, warn};

use super::apply::{ApplyMachine, ApplyPlan};
use super::clock::{Clock, TokioClock};
use super::session::Session;
use super::{ChangeLifecycle, Phase};
use crate::context::{CallerContext, NoopContext};
use crate::error::{DriverError, Result};
use crate::platform::{CommitStep, Family, FamilyPolicy};
use crate::settings::{FingerprintMethod, NedSettings, PersistOn, SettingsFile};
use crate::store::{ConfigStore, MemoryStore};
use crate::transform::{Pipeline, ShutdownTags};
use crate::transport::Transport;

/// Everything a driver needs besides the transport.
pub struct DriverOptions {
    pub device_id: String,
    pub settings: SettingsFile,
    pub store: Arc<dyn ConfigStore>,
    pub clock: Arc<dyn Clock>,
    pub context: Arc<dyn CallerContext>,
    /// Shutdown tags to use instead of the process-wide set.
    pub shutdown_tags: Option<Arc<ShutdownTags>>,
}

impl DriverOptions {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            settings: SettingsFile::default(),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(TokioClock),
            context: Arc::new(NoopContext),
            shutdown_tags: None,
        }
    }

    pub fn with_settings(mut self, settings: SettingsFile) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn CallerContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_shutdown_tags(mut self, tags: Arc<ShutdownTags>) -> Self {
        self.shutdown_tags = Some(tags);
        self
    }
}

/// Drives one device through the change lifecycle.
pub struct DeviceDriver<T> {
    session: Session<T>,
    device_id: String,
    settings: NedSettings,
    tags: Arc<ShutdownTags>,
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    context: Arc<dyn CallerContext>,
    /// A `commit confirmed` is waiting for its confirming commit.
    pending_confirmation: bool,
}

impl<T: Transport> DeviceDriver<T> {
    /// Identify the device on `transport` and resolve its settings.
    pub async fn open(transport: T, options: DriverOptions) -> Result<Self> {
        let DriverOptions {
            device_id,
            settings: file,
            store,
            clock,
            context,
            shutdown_tags,
        } = options;

        let initial = file.resolve_unidentified(&device_id);
        let tracer = initial.trace.then(|| context.clone());
        let mut session = Session::open(transport, initial.read_timeout, tracer).await?;

        let settings = file.resolve(&device_id, session.family());
        session.set_read_timeout(settings.read_timeout);
        session.set_tracer(settings.trace.then(|| context.clone()));

        let tags = shutdown_tags.unwrap_or_else(|| ShutdownTags::init_global(store.as_ref()));
        info!("{} opened as {}", device_id, session.family());
        debug!("{} settings: {:?}", device_id, settings);

        Ok(Self {
            session,
            device_id,
            settings,
            tags,
            store,
            clock,
            context,
            pending_confirmation: false,
        })
    }

    pub fn family(&self) -> Family {
        self.session.family()
    }

    pub fn settings(&self) -> &NedSettings {
        &self.settings
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    /// Whether a staged change still needs its confirming commit.
    pub fn has_pending_confirmation(&self) -> bool {
        self.pending_confirmation
    }

    /// Read the running configuration in normalized form.
    pub async fn show_config(&mut self) -> Result<String> {
        self.session.show_config().await
    }

    /// The command stream `prepare` would send for `diff`, without
    /// touching the device.
    pub fn render_prepare(&self, diff: &str) -> String {
        let plan = self.plan(diff, self.prepare_step());
        plan.render(&self.policy().commands.exit_config)
    }

    /// Close the session.
    pub async fn close(mut self) -> Result<()> {
        self.session.close().await
    }

    fn policy(&self) -> &'static FamilyPolicy {
        self.session.policy()
    }

    fn plan<'p>(&self, block: &str, commit: Option<&'p CommitStep>) -> ApplyPlan<'p> {
        let commands = &self.policy().commands;
        let mut priming = Vec::new();
        if self.transactional() {
            priming.extend(commands.transactional_enter.iter().cloned());
        }
        priming.extend(commands.enter_config.iter().cloned());

        let batches = Pipeline::new(self.policy(), &self.tags, self.store.as_ref())
            .with_shutdown_before_apply(self.settings.shutdown_before_apply)
            .batches(block);

        ApplyPlan {
            priming,
            batches,
            commit,
        }
    }

    /// Whether edits go through a candidate committed explicitly.
    fn transactional(&self) -> bool {
        self.settings.transactional_config && self.policy().commands.transactional_commit.is_some()
    }

    /// Commit step closing a prepare.
    fn prepare_step(&self) -> Option<&'static CommitStep> {
        let commands = &self.policy().commands;
        if self.transactional() {
            return commands.transactional_commit.as_ref();
        }
        commands.prepare_commit.as_ref()
    }

    /// Commit step closing an abort or revert.
    fn settle_step(&self) -> Option<&'static CommitStep> {
        let commands = &self.policy().commands;
        if self.transactional() {
            return commands.transactional_commit.as_ref();
        }
        commands.settle_commit.as_ref()
    }

    async fn apply(&mut self, block: &str, commit: Option<&CommitStep>) -> Result<()> {
        let plan = self.plan(block, commit);
        let mut machine = ApplyMachine::new(
            &mut self.session,
            self.clock.as_ref(),
            self.context.as_ref(),
            self.settings.write_timeout,
        );
        machine.run(&plan).await
    }

    async fn prepare_change(&mut self, diff: &str) -> Result<()> {
        let step = self.prepare_step();
        self.apply(diff, step).await?;
        let commands = &self.policy().commands;
        if !self.transactional()
            && commands.prepare_commit.is_some()
            && commands.confirming_commit.is_some()
        {
            self.pending_confirmation = true;
        }
        if self.settings.persist_on == PersistOn::Prepare {
            self.confirm_pending().await?;
            self.save().await?;
        }
        Ok(())
    }

    async fn undo(&mut self, inverse: &str) -> Result<()> {
        let step = self.settle_step();
        self.apply(inverse, step).await?;
        self.pending_confirmation = false;
        Ok(())
    }

    async fn persist_change(&mut self) -> Result<()> {
        self.confirm_pending().await?;
        if self.settings.persist_on == PersistOn::Persist {
            self.save().await?;
        }
        Ok(())
    }

    /// Send the confirming commit for a staged `commit confirmed`.
    async fn confirm_pending(&mut self) -> Result<()> {
        if !self.pending_confirmation {
            return Ok(());
        }
        if let Some(command) = &self.policy().commands.confirming_commit {
            let step = CommitStep {
                command: command.clone(),
                diagnostic: None,
            };
            self.apply("", Some(&step)).await?;
        }
        self.pending_confirmation = false;
        Ok(())
    }

    /// Write the running configuration to non-volatile storage.
    async fn save(&mut self) -> Result<()> {
        let commands = &self.policy().commands;
        let Some(step) = &commands.save else {
            return Ok(());
        };
        let response = self.session.exec(&step.command).await?;
        let output = response.result.to_lowercase();
        if let Some(required) = &step.required {
            if !output.contains(required.as_str()) {
                return Err(DriverError::UnexpectedOutput {
                    command: step.command.clone(),
                    output: response.result.trim().to_string(),
                }
                .into());
            }
        }
        if let Some(expected) = &step.expected {
            if !output.contains(expected.as_str()) {
                warn!("'{}' reported: {}", step.command, response.result.trim());
            }
        }

        if self.settings.fingerprint == FingerprintMethod::Checkpoint {
            if let Some(command) = &commands.checkpoint_save {
                let response = self.session.exec(command).await?;
                let saved = step
                    .required
                    .as_ref()
                    .is_none_or(|required| response.result.to_lowercase().contains(required.as_str()));
                if !saved {
                    return Err(DriverError::UnexpectedOutput {
                        command: command.clone(),
                        output: response.result.trim().to_string(),
                    }
                    .into());
                }
            }
        }
        info!("{} configuration saved", self.device_id);
        Ok(())
    }

    async fn compute_fingerprint(&mut self) -> Result<String> {
        let policy = self.policy();
        if self.settings.fingerprint == FingerprintMethod::Checkpoint {
            match &policy.commands.checkpoint {
                Some(query) => {
                    let response = self.session.exec(&query.command).await?;
                    let id = query.extract.apply(&response.result).ok_or_else(|| {
                        DriverError::UnexpectedOutput {
                            command: query.command.clone(),
                            output: response.result.trim().to_string(),
                        }
                    })?;
                    return Ok(digest(&id));
                }
                None => warn!(
                    "{} has no checkpoint query, hashing the configuration",
                    policy.name
                ),
            }
        }

        let mut text = self.session.show_config().await?;
        for command in &policy.commands.aux_dumps {
            let response = self.session.exec(command).await?;
            text.push_str(&policy.transform_inbound(&response.result));
        }
        Ok(digest(&text))
    }

    /// Report a phase result to the caller context.
    fn finish<V>(&self, phase: Phase, result: Result<V>) -> Result<V> {
        match result {
            Ok(value) => {
                info!("{}: {} completed", self.device_id, phase);
                self.context.phase_completed(phase);
                Ok(value)
            }
            Err(e) => {
                let e = e.in_phase(phase);
                warn!("{}: {}", self.device_id, e);
                self.context.phase_failed(phase, &e);
                Err(e)
            }
        }
    }
}

impl<T: Transport> ChangeLifecycle for DeviceDriver<T> {
    async fn prepare(&mut self, diff: &str) -> Result<()> {
        let result = self.prepare_change(diff).await;
        self.finish(Phase::Prepare, result)
    }

    async fn commit(&mut self) -> Result<()> {
        // everything was staged or committed during prepare
        self.finish(Phase::Commit, Ok(()))
    }

    async fn abort(&mut self, inverse: &str) -> Result<()> {
        let result = self.undo(inverse).await;
        self.finish(Phase::Abort, result)
    }

    async fn revert(&mut self, inverse: &str) -> Result<()> {
        let result = self.undo(inverse).await;
        self.finish(Phase::Revert, result)
    }

    async fn persist(&mut self) -> Result<()> {
        let result = self.persist_change().await;
        self.finish(Phase::Persist, result)
    }

    async fn fingerprint(&mut self) -> Result<String> {
        self.compute_fingerprint().await
    }
}

/// Lowercase hex MD5, always 32 characters.
fn digest(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}
