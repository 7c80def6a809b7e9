//! ssh invocation for interactive and one-shot commands inside a VM.

use std::path::{Path, PathBuf};

/// Disables terminal focus reporting so stray escape codes don't leak into the
/// remote shell.
pub const FOCUS_REPORTING_OFF: &str = r"printf '\e[?1004l'";

/// Program run when the session has no explicit command.
const LOGIN_SHELL: &str = "exec bash -l";

const FALLBACK_TERM: &str = "xterm-256color";
const DEFAULT_COLORTERM: &str = "truecolor";

/// Join arguments into a remote command line.
///
/// Arguments containing a space are wrapped in single quotes, all others are
/// passed verbatim. Embedded quotes and shell metacharacters are NOT escaped.
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg.contains(' ') {
                format!("'{}'", arg)
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map the host TERM to one the guest's terminfo database knows about.
pub fn normalize_term(term: Option<&str>) -> String {
    match term {
        None | Some("") => FALLBACK_TERM.to_string(),
        Some("xterm-ghostty") | Some("ghostty") => FALLBACK_TERM.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Terminal-related variables forwarded into the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEnv {
    pub term: String,
    pub colorterm: String,
    pub lang: Option<String>,
}

impl TerminalEnv {
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("TERM").ok().as_deref(),
            std::env::var("COLORTERM").ok().as_deref(),
            std::env::var("LANG").ok().as_deref(),
        )
    }

    pub fn from_values(term: Option<&str>, colorterm: Option<&str>, lang: Option<&str>) -> Self {
        Self {
            term: normalize_term(term),
            colorterm: colorterm
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_COLORTERM)
                .to_string(),
            lang: lang.filter(|l| !l.is_empty()).map(str::to_string),
        }
    }

    /// `KEY=value` pairs in a stable order.
    pub fn assignments(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("TERM", self.term.clone()),
            ("COLORTERM", self.colorterm.clone()),
        ];
        if let Some(lang) = &self.lang {
            vars.push(("LANG", lang.clone()));
        }
        vars
    }
}

/// Builder for `ssh user@host "<remote command>"`.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    user: String,
    host: String,
    tty: bool,
    workdir: Option<PathBuf>,
    terminal: Option<TerminalEnv>,
    program: Vec<String>,
}

impl RemoteCommand {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            tty: true,
            workdir: None,
            terminal: None,
            program: Vec::new(),
        }
    }

    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn workdir(mut self, dir: Option<&Path>) -> Self {
        self.workdir = dir.map(Path::to_path_buf);
        self
    }

    pub fn terminal(mut self, env: Option<TerminalEnv>) -> Self {
        self.terminal = env;
        self
    }

    pub fn program<S: AsRef<str>>(mut self, argv: &[S]) -> Self {
        self.program = argv.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    /// The string the remote login shell evaluates.
    pub fn remote_command(&self) -> String {
        let mut out = String::new();
        if self.tty {
            out.push_str(FOCUS_REPORTING_OFF);
            out.push_str("; ");
        }
        if let Some(dir) = &self.workdir {
            out.push_str("cd ");
            out.push_str(&join_args(&[dir.to_string_lossy()]));
            out.push_str(" && ");
        }
        if let Some(env) = &self.terminal {
            for (key, value) in env.assignments() {
                out.push_str(&format!("{}={} ", key, value));
            }
        }
        if self.program.is_empty() {
            out.push_str(LOGIN_SHELL);
        } else {
            out.push_str(&join_args(&self.program));
        }
        out
    }

    /// Full argument vector for the `ssh` binary.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = vec!["-A".to_string()];
        if self.tty {
            args.push("-t".to_string());
        }
        args.push("-o".to_string());
        args.push("StrictHostKeyChecking=accept-new".to_string());
        args.push(format!("{}@{}", self.user, self.host));
        args.push(self.remote_command());
        args
    }
}
