//! Scripted fake shell sandbox
//!
//! Behaves like a busybox shell seen through a serial console: every typed
//! line is echoed after the current prompt, continuation lines (heredocs,
//! trailing backslashes, loop and if bodies) get a `> ` prompt, and complete
//! commands produce scripted output followed by the working prompt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sketchcc::sandbox::{ConsoleEndpoint, ConsoleStreams};
use sketchcc::{Error, Result, Sandbox, SandboxHandle, SandboxSignal};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

pub const HEX_RECORDS: [&str; 2] = [
    ":100000000C945C000C946E000C946E000C946E00CA",
    ":00000001FF",
];

/// Scripted reply to a command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Print these lines, then the prompt
    Output(Vec<String>),
    /// Print these lines, then never answer again
    Hang(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Responder {
    pub needle: String,
    pub reply: Reply,
    pub uses: Option<usize>,
}

/// Everything the fake shell does during one boot
#[derive(Debug, Clone)]
pub struct ShellScript {
    pub downloads: Vec<(u64, u64)>,
    pub send_ready: bool,
    pub fail_start: bool,
    pub banner: Vec<String>,
    pub home: String,
    pub colored_prompt: bool,
    pub hex_records: Vec<String>,
    pub responders: Vec<Responder>,
    pub echo_rewrites: Vec<(String, String)>,
}

impl ShellScript {
    /// Alpine image: a bootstrap download, the disk image, then the banner
    pub fn alpine() -> Self {
        Self {
            downloads: vec![(4096, 4096), (1_000, 10_000), (5_000, 10_000), (10_000, 10_000)],
            send_ready: true,
            fail_start: false,
            banner: vec![
                "OpenRC 0.44.10 is starting up Linux 4.15.0".to_string(),
                "Welcome to Alpine Linux 3.12".to_string(),
                String::new(),
            ],
            home: "~".to_string(),
            colored_prompt: false,
            hex_records: HEX_RECORDS.iter().map(|s| s.to_string()).collect(),
            responders: Vec::new(),
            echo_rewrites: Vec::new(),
        }
    }

    /// Print `lines` for commands containing `needle`
    pub fn respond(mut self, needle: &str, lines: &[&str]) -> Self {
        self.responders.push(Responder {
            needle: needle.to_string(),
            reply: Reply::Output(to_strings(lines)),
            uses: None,
        });
        self
    }

    /// Like `respond`, for the first matching command only
    pub fn respond_once(mut self, needle: &str, lines: &[&str]) -> Self {
        self.responders.push(Responder {
            needle: needle.to_string(),
            reply: Reply::Output(to_strings(lines)),
            uses: Some(1),
        });
        self
    }

    /// Stop answering after the first command containing `needle`
    pub fn hang_on(mut self, needle: &str, lines: &[&str]) -> Self {
        self.responders.push(Responder {
            needle: needle.to_string(),
            reply: Reply::Hang(to_strings(lines)),
            uses: None,
        });
        self
    }

    /// Echo `to` wherever a typed line contains `from`
    pub fn rewrite_echo(mut self, from: &str, to: &str) -> Self {
        self.echo_rewrites.push((from.to_string(), to.to_string()));
        self
    }

    /// Wrap the directory in the prompt in colour sequences
    pub fn colored(mut self) -> Self {
        self.colored_prompt = true;
        self
    }

    /// Never send the ready signal
    pub fn without_ready(mut self) -> Self {
        self.send_ready = false;
        self
    }

    /// Fail every start
    pub fn failing(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

fn to_strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

/// Observes a fake shell after the sandbox was handed to a compiler
#[derive(Debug, Clone, Default)]
pub struct ShellProbe {
    typed: Arc<Mutex<Vec<String>>>,
    starts: Arc<AtomicUsize>,
}

impl ShellProbe {
    /// Everything typed into the console so far
    pub fn typed(&self) -> String {
        self.typed.lock().unwrap().concat()
    }

    /// Number of `start` calls
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

pub struct FakeShellSandbox {
    script: ShellScript,
    probe: ShellProbe,
}

impl FakeShellSandbox {
    pub fn new(script: ShellScript) -> (Self, ShellProbe) {
        let probe = ShellProbe::default();
        (
            Self {
                script,
                probe: probe.clone(),
            },
            probe,
        )
    }
}

#[async_trait]
impl Sandbox for FakeShellSandbox {
    fn name(&self) -> &str {
        "fake-shell"
    }

    async fn start(&mut self) -> Result<SandboxHandle> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_start {
            return Err(Error::SandboxStartFailed {
                reason: "scripted failure".to_string(),
            });
        }

        let (console, endpoint) = ConsoleStreams::pair();
        let (signal_tx, signals) = unbounded_channel();
        for &(loaded, total) in &self.script.downloads {
            let _ = signal_tx.send(SandboxSignal::DownloadProgress { loaded, total });
        }
        if self.script.send_ready {
            let _ = signal_tx.send(SandboxSignal::Ready);
        }

        let shell = FakeShell::new(self.script.clone(), self.probe.typed.clone());
        tokio::spawn(shell.run(endpoint, signal_tx));

        Ok(SandboxHandle { console, signals })
    }
}

struct FakeShell {
    script: ShellScript,
    typed: Arc<Mutex<Vec<String>>>,
    cwd: String,
    heredoc: Option<String>,
    depth: usize,
    command: Vec<String>,
    hung: bool,
}

impl FakeShell {
    fn new(script: ShellScript, typed: Arc<Mutex<Vec<String>>>) -> Self {
        let cwd = script.home.clone();
        Self {
            script,
            typed,
            cwd,
            heredoc: None,
            depth: 0,
            command: Vec::new(),
            hung: false,
        }
    }

    async fn run(mut self, mut endpoint: ConsoleEndpoint, _signals: UnboundedSender<SandboxSignal>) {
        let mut boot = String::new();
        for line in &self.script.banner {
            boot.push_str(line);
            boot.push_str("\r\n");
        }
        boot.push_str(&self.prompt());
        if endpoint.output_tx.send(boot.into_bytes()).is_err() {
            return;
        }

        let mut pending = String::new();
        while let Some(chunk) = endpoint.input_rx.recv().await {
            let text = String::from_utf8_lossy(&chunk).into_owned();
            self.typed.lock().unwrap().push(text.clone());
            if self.hung {
                continue;
            }

            pending.push_str(&text);
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                let output = self.accept(line.trim_end_matches('\n'));
                if endpoint.output_tx.send(output.into_bytes()).is_err() {
                    return;
                }
                if self.hung {
                    break;
                }
            }
        }
    }

    fn prompt(&self) -> String {
        if self.script.colored_prompt {
            format!("\x1b[1;34m{}\x1b[0m # ", self.cwd)
        } else {
            format!("{} # ", self.cwd)
        }
    }

    fn accept(&mut self, line: &str) -> String {
        let mut echoed = line.to_string();
        for (from, to) in &self.script.echo_rewrites {
            echoed = echoed.replace(from.as_str(), to.as_str());
        }
        let mut out = format!("{}\r\n", echoed);

        self.command.push(line.to_string());
        if self.continues(line) {
            out.push_str("> ");
            return out;
        }

        let command = self.command.join("\n");
        self.command.clear();
        let (lines, hang) = self.execute(&command);
        for reply in lines {
            out.push_str(&reply);
            out.push_str("\r\n");
        }
        if hang {
            self.hung = true;
        } else {
            out.push_str(&self.prompt());
        }
        out
    }

    fn continues(&mut self, line: &str) -> bool {
        if let Some(terminator) = &self.heredoc {
            if line != terminator.as_str() {
                return true;
            }
            self.heredoc = None;
        } else if let Some(start) = line.find("<<") {
            let terminator = line[start + 2..].split_whitespace().next().unwrap_or("");
            if !terminator.is_empty() {
                self.heredoc = Some(terminator.to_string());
                return true;
            }
        }

        let trimmed = line.trim();
        if ["while ", "for ", "if "].iter().any(|kw| trimmed.starts_with(kw)) {
            self.depth += 1;
        }
        if trimmed == "done" || trimmed.starts_with("done ") || trimmed == "fi" {
            self.depth = self.depth.saturating_sub(1);
        }

        self.depth > 0 || line.ends_with('\\')
    }

    fn execute(&mut self, command: &str) -> (Vec<String>, bool) {
        for responder in &mut self.script.responders {
            if !command.contains(responder.needle.as_str()) || responder.uses == Some(0) {
                continue;
            }
            if let Some(uses) = responder.uses.as_mut() {
                *uses -= 1;
            }
            return match &responder.reply {
                Reply::Output(lines) => (lines.clone(), false),
                Reply::Hang(lines) => (lines.clone(), true),
            };
        }

        let first = command.lines().next().unwrap_or_default();
        if let Some(dir) = first.strip_prefix("cd ") {
            self.cwd = dir.trim().to_string();
            return (Vec::new(), false);
        }
        if let Some(text) = first.strip_prefix("echo ") {
            return (vec![text.to_string()], false);
        }
        if first.starts_with("cat ") && first.ends_with(".hex") {
            return (self.script.hex_records.clone(), false);
        }
        (Vec::new(), false)
    }
}
