//! Scripted device CLI for driver tests.
//!
//! The simulator echoes every line it receives, prints a scripted or
//! built-in reply, then the prompt for its new mode. Lines whose first
//! word opens a context push it; `exit` pops it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Ios,
    IosXr,
    Alu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Exec,
    Config(Vec<String>),
}

struct Reply {
    text: String,
    rejected: bool,
}

struct SimState {
    style: Style,
    mode: Mode,
    version: String,
    login: Option<String>,
    greeted: bool,
    output: Vec<u8>,
    input: String,
    received: Vec<String>,
    answers: Vec<String>,
    replies: HashMap<String, VecDeque<Reply>>,
    questions: HashMap<String, String>,
    silent: Vec<String>,
    awaiting: Option<String>,
}

impl SimState {
    fn out(&mut self, text: &str) {
        self.output.extend_from_slice(text.as_bytes());
    }

    fn prompt(&self) -> String {
        match (self.style, &self.mode) {
            (Style::Ios, Mode::Exec) => "r1#".into(),
            (Style::Ios, Mode::Config(stack)) => match stack.last() {
                None => "r1(config)#".into(),
                Some(ctx) => format!("r1(config-{ctx})#"),
            },
            (Style::IosXr, Mode::Exec) => "RP/0/RSP0/CPU0:xr1#".into(),
            (Style::IosXr, Mode::Config(stack)) => match stack.last() {
                None => "RP/0/RSP0/CPU0:xr1(config)#".into(),
                Some(ctx) => format!("RP/0/RSP0/CPU0:xr1(config-{ctx})#"),
            },
            (Style::Alu, Mode::Exec) => "A:pe1# ".into(),
            (Style::Alu, Mode::Config(stack)) if stack.is_empty() => "*A:pe1>config# ".into(),
            (Style::Alu, Mode::Config(stack)) => format!("*A:pe1>config>{}# ", stack.join(">")),
        }
    }

    fn enter_command(&self) -> &'static str {
        match self.style {
            Style::Ios => "config t",
            Style::IosXr => "config exclusive",
            Style::Alu => "configure",
        }
    }

    fn opens_context(&self, word: &str) -> bool {
        let openers: &[&str] = match self.style {
            Style::Ios => &["interface", "router", "line", "policy-map", "vlan"],
            Style::IosXr => &["interface", "router", "route-policy", "prefix-set"],
            Style::Alu => &[
                "port", "service", "vpls", "vprn", "sap", "router", "system", "interface",
                "ospf", "area", "card", "mda",
            ],
        };
        openers.contains(&word)
    }

    fn receive(&mut self, data: &str) {
        if let Some(command) = self.awaiting.take() {
            self.answers.push(data.trim_end_matches('\n').to_string());
            self.out("\n");
            self.finish(&command);
            return;
        }
        self.input.push_str(data);
        while let Some(pos) = self.input.find('\n') {
            let line: String = self.input.drain(..=pos).collect();
            self.process(line.trim_end_matches('\n'));
            if self.awaiting.is_some() {
                break;
            }
        }
    }

    fn process(&mut self, line: &str) {
        self.received.push(line.to_string());
        self.out(line);
        self.out("\n");
        if self.silent.iter().any(|s| s == line) {
            return;
        }
        if let Some(question) = self.questions.remove(line) {
            self.out(&question);
            self.awaiting = Some(line.to_string());
            return;
        }
        self.finish(line);
    }

    fn finish(&mut self, line: &str) {
        let scripted = self.replies.get_mut(line).and_then(VecDeque::pop_front);
        let (text, accepted) = match scripted {
            Some(reply) => (reply.text, !reply.rejected),
            None => (self.builtin(line), true),
        };
        if accepted {
            self.transition(line);
        }
        if !text.is_empty() {
            self.out(&text);
            if !text.ends_with('\n') {
                self.out("\n");
            }
        }
        let prompt = self.prompt();
        self.out(&prompt);
    }

    fn builtin(&self, line: &str) -> String {
        match (&self.mode, line) {
            (Mode::Exec, "show version") => self.version.clone(),
            (Mode::Exec, "config t") if self.style == Style::Ios => {
                "Enter configuration commands, one per line.  End with CNTL/Z.".into()
            }
            _ => String::new(),
        }
    }

    fn transition(&mut self, line: &str) {
        let style = self.style;
        let enter = self.enter_command();
        let first = line.split_whitespace().next().unwrap_or_default().to_string();
        let opens = self.opens_context(&first);
        let Mode::Config(stack) = &mut self.mode else {
            if line == enter {
                self.mode = Mode::Config(Vec::new());
            }
            return;
        };
        let leave = match line {
            "end" => style != Style::Alu,
            "exit all" => style == Style::Alu,
            "exit" => stack.pop().is_none(),
            _ => {
                if opens {
                    if style != Style::Alu {
                        stack.clear();
                    }
                    stack.push(first);
                }
                false
            }
        };
        if leave {
            self.mode = Mode::Exec;
        }
    }
}

/// The transport side of the simulator.
pub(crate) struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

/// Test-side access to a simulator that has been moved into a driver.
#[derive(Clone)]
pub(crate) struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new(style: Style) -> Self {
        let version = match style {
            Style::Ios => {
                "Cisco IOS Software, C3900 Software (C3900-UNIVERSALK9-M), Version 15.2(4)M7\n\
                 r1 uptime is 1 week, 2 days"
            }
            Style::IosXr => "Cisco IOS XR Software, Version 6.1.2[Default]\nxr1 uptime is 3 weeks",
            Style::Alu => {
                "TiMOS-C-12.0.R4 cpm/hops64 ALCATEL SR 7750 Copyright (c) 2000-2014 Alcatel-Lucent."
            }
        };
        Self {
            state: Arc::new(Mutex::new(SimState {
                style,
                mode: Mode::Exec,
                version: version.into(),
                login: None,
                greeted: false,
                output: Vec::new(),
                input: String::new(),
                received: Vec::new(),
                answers: Vec::new(),
                replies: HashMap::new(),
                questions: HashMap::new(),
                silent: Vec::new(),
                awaiting: None,
            })),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }
}

impl SimHandle {
    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Reply to the next send of `command`.
    pub fn reply(&self, command: &str, text: &str) {
        self.push(command, text, false);
    }

    /// Reject the next send of `command`; the mode does not change.
    pub fn reject(&self, command: &str, text: &str) {
        self.push(command, text, true);
    }

    fn push(&self, command: &str, text: &str, rejected: bool) {
        self.with(|s| {
            s.replies.entry(command.to_string()).or_default().push_back(Reply {
                text: text.to_string(),
                rejected,
            })
        });
    }

    /// Ask `question` after the next send of `command`.
    pub fn question(&self, command: &str, question: &str) {
        self.with(|s| s.questions.insert(command.to_string(), question.to_string()));
    }

    /// Never answer `command`.
    pub fn silence(&self, command: &str) {
        self.with(|s| s.silent.push(command.to_string()));
    }

    pub fn set_version(&self, version: &str) {
        self.with(|s| s.version = version.to_string());
    }

    /// Greet with a credential prompt instead of the CLI prompt.
    pub fn set_login(&self, prompt: &str) {
        self.with(|s| s.login = Some(prompt.to_string()));
    }

    pub fn received(&self) -> Vec<String> {
        self.with(|s| s.received.clone())
    }

    pub fn count(&self, command: &str) -> usize {
        self.with(|s| s.received.iter().filter(|l| *l == command).count())
    }

    pub fn answers(&self) -> Vec<String> {
        self.with(|s| s.answers.clone())
    }

    pub fn mode(&self) -> Mode {
        self.with(|s| s.mode.clone())
    }

    /// Lines received after the version probe and setup commands.
    pub fn received_after(&self, marker: &str) -> Vec<String> {
        let received = self.received();
        match received.iter().rposition(|l| l == marker) {
            Some(i) => received[i + 1..].to_vec(),
            None => received,
        }
    }
}

impl Transport for SimDevice {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.state.lock().unwrap().receive(&text);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        let chunk = {
            let mut s = self.state.lock().unwrap();
            if !s.greeted {
                s.greeted = true;
                let greeting = match &s.login {
                    Some(login) => login.clone(),
                    None => format!("\r\nAuthorized access only\r\n{}", s.prompt()),
                };
                s.out(&greeting);
            }
            std::mem::take(&mut s.output)
        };
        if chunk.is_empty() {
            std::future::pending::<()>().await;
        }
        Ok(Some(chunk))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
