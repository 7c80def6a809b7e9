//! In-memory backend for orchestrator tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use super::{Backend, InstanceKind, Session};
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::mount::MountBinding;

#[derive(Debug, Clone, Default)]
struct Instance {
    running: bool,
    /// guest path -> host path
    mounts: BTreeMap<PathBuf, PathBuf>,
    address: Option<String>,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, Instance>,
    calls: Vec<String>,
    failures: HashMap<String, String>,
    /// Scripted outputs per program (`argv[0]`) for `exec`.
    exec_outputs: HashMap<String, VecDeque<std::result::Result<String, String>>>,
    exec_log: Vec<Vec<String>>,
    exec_limits: Vec<Duration>,
    copies: Vec<(PathBuf, PathBuf)>,
    sessions: Vec<Session>,
    /// Binds handed to `attach_with_bind`.
    extra_binds: Vec<MountBinding>,
    fixed_binds: bool,
}

/// Cloning shares state so a test can keep a handle after boxing the backend.
#[derive(Clone)]
pub struct MockBackend {
    kind: InstanceKind,
    state: Rc<RefCell<State>>,
}

impl MockBackend {
    pub fn new(kind: InstanceKind) -> Self {
        Self {
            kind,
            state: Rc::new(RefCell::new(State::default())),
        }
    }

    pub fn vm() -> Self {
        Self::new(InstanceKind::Vm)
    }

    pub fn container() -> Self {
        Self::new(InstanceKind::Container)
    }

    pub fn with_instance(self, name: &str, running: bool) -> Self {
        self.state.borrow_mut().instances.insert(
            name.to_string(),
            Instance {
                running,
                address: Some("192.168.64.10".to_string()),
                ..Instance::default()
            },
        );
        self
    }

    /// Make every call of `op` fail with an external tool error.
    pub fn fail_on(self, op: &str, stderr: &str) -> Self {
        self.state
            .borrow_mut()
            .failures
            .insert(op.to_string(), stderr.to_string());
        self
    }

    /// Queue outputs returned by `exec` for commands starting with `program`.
    /// When the queue runs dry the last entry repeats.
    pub fn script_exec(self, program: &str, outputs: Vec<std::result::Result<&str, &str>>) -> Self {
        let queue = outputs
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        self.state
            .borrow_mut()
            .exec_outputs
            .insert(program.to_string(), queue);
        self
    }

    /// Reject `mount`/`unmount` the way the container backend does.
    pub fn fixed_binds(self) -> Self {
        self.state.borrow_mut().fixed_binds = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state.borrow().calls.iter().filter(|c| *c == op).count()
    }

    pub fn exec_log(&self) -> Vec<Vec<String>> {
        self.state.borrow().exec_log.clone()
    }

    /// Limits passed to `exec_within`, in call order.
    pub fn exec_limits(&self) -> Vec<Duration> {
        self.state.borrow().exec_limits.clone()
    }

    pub fn copies(&self) -> Vec<(PathBuf, PathBuf)> {
        self.state.borrow().copies.clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.state.borrow().sessions.clone()
    }

    pub fn extra_binds(&self) -> Vec<MountBinding> {
        self.state.borrow().extra_binds.clone()
    }

    pub fn mounts(&self, name: &str) -> Vec<(PathBuf, PathBuf)> {
        self.state
            .borrow()
            .instances
            .get(name)
            .map(|i| i.mounts.iter().map(|(g, h)| (h.clone(), g.clone())).collect())
            .unwrap_or_default()
    }

    fn record(&self, op: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(op.to_string());
        match state.failures.get(op) {
            Some(stderr) => Err(Error::ExternalTool {
                program: "mock".to_string(),
                args: op.to_string(),
                status: Some(1),
                stderr: stderr.clone(),
            }),
            None => Ok(()),
        }
    }

    fn not_found(&self, name: &str) -> Error {
        Error::NotFound {
            kind: self.kind,
            name: name.to_string(),
        }
    }

    /// Exec semantics shared by `exec` and `exec_within`.
    fn scripted_exec(&self, name: &str, argv: &[&str]) -> Result<String> {
        self.with_instance_mut(name, |_| ())?;
        let mut state = self.state.borrow_mut();
        state
            .exec_log
            .push(argv.iter().map(|a| a.to_string()).collect());
        let program = argv.first().copied().unwrap_or_default();
        let Some(queue) = state.exec_outputs.get_mut(program) else {
            return Ok(String::new());
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(Ok(out)) => Ok(out),
            Some(Err(stderr)) => Err(Error::ExternalTool {
                program: "mock".to_string(),
                args: argv.join(" "),
                status: Some(1),
                stderr,
            }),
            None => Ok(String::new()),
        }
    }

    fn with_instance_mut<T>(&self, name: &str, f: impl FnOnce(&mut Instance) -> T) -> Result<T> {
        let mut state = self.state.borrow_mut();
        match state.instances.get_mut(name) {
            Some(instance) => Ok(f(instance)),
            None => Err(self.not_found(name)),
        }
    }
}

impl Backend for MockBackend {
    fn kind(&self) -> InstanceKind {
        self.kind
    }

    fn binary(&self) -> &'static str {
        "mock"
    }

    fn guest_home(&self) -> &'static str {
        "/home/mock"
    }

    fn ensure_installed(&self) -> Result<()> {
        self.record("ensure_installed")
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.record("exists")?;
        Ok(self.state.borrow().instances.contains_key(name))
    }

    fn running(&self, name: &str) -> Result<bool> {
        self.record("running")?;
        Ok(self
            .state
            .borrow()
            .instances
            .get(name)
            .is_some_and(|i| i.running))
    }

    fn create(&self, name: &str, _config: &LifecycleConfig) -> Result<()> {
        self.record("create")?;
        self.state.borrow_mut().instances.insert(
            name.to_string(),
            Instance {
                running: true,
                address: Some("192.168.64.10".to_string()),
                ..Instance::default()
            },
        );
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.record("start")?;
        self.with_instance_mut(name, |i| i.running = true)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.record("stop")?;
        self.with_instance_mut(name, |i| i.running = false)
    }

    fn delete(&self, name: &str, _purge: bool) -> Result<()> {
        self.record("delete")?;
        match self.state.borrow_mut().instances.remove(name) {
            Some(_) => Ok(()),
            None => Err(self.not_found(name)),
        }
    }

    fn exec(&self, name: &str, argv: &[&str]) -> Result<String> {
        self.record("exec")?;
        self.scripted_exec(name, argv)
    }

    fn exec_within(&self, name: &str, argv: &[&str], limit: Duration) -> Result<String> {
        self.record("exec_within")?;
        self.state.borrow_mut().exec_limits.push(limit);
        self.scripted_exec(name, argv)
    }

    fn exec_interactive(&self, name: &str, argv: &[&str]) -> Result<()> {
        self.record("exec_interactive")?;
        self.with_instance_mut(name, |_| ())?;
        self.state
            .borrow_mut()
            .exec_log
            .push(argv.iter().map(|a| a.to_string()).collect());
        Ok(())
    }

    fn mount(&self, name: &str, host: &Path, guest: &Path) -> Result<()> {
        self.record("mount")?;
        if self.state.borrow().fixed_binds {
            return Err(Error::Unsupported {
                kind: self.kind,
                op: "mount",
                reason: "binds are fixed at creation".to_string(),
            });
        }
        self.with_instance_mut(name, |i| {
            i.mounts.insert(guest.to_path_buf(), host.to_path_buf());
        })
    }

    fn unmount(&self, name: &str, guest: &Path) -> Result<()> {
        self.record("unmount")?;
        self.with_instance_mut(name, |i| {
            i.mounts.remove(guest);
        })
    }

    fn mounted(&self, name: &str, host: &Path) -> Result<bool> {
        self.record("mounted")?;
        self.with_instance_mut(name, |i| i.mounts.values().any(|h| h == host))
    }

    fn address(&self, name: &str) -> Result<String> {
        self.record("address")?;
        let kind = self.kind;
        self.with_instance_mut(name, |i| i.address.clone())?
            .ok_or_else(|| Error::AddressNotFound {
                kind,
                name: name.to_string(),
            })
    }

    fn attach(&self, name: &str, session: &Session) -> Result<()> {
        self.record("attach")?;
        self.with_instance_mut(name, |_| ())?;
        self.state.borrow_mut().sessions.push(session.clone());
        Ok(())
    }

    fn attach_with_bind(
        &self,
        name: &str,
        session: &Session,
        _config: &LifecycleConfig,
        bind: &MountBinding,
    ) -> Result<()> {
        self.record("attach_with_bind")?;
        self.with_instance_mut(name, |_| ())?;
        let mut state = self.state.borrow_mut();
        state.sessions.push(session.clone());
        state.extra_binds.push(bind.clone());
        Ok(())
    }

    fn copy_in(&self, name: &str, host: &Path, guest: &Path) -> Result<()> {
        self.record("copy_in")?;
        self.with_instance_mut(name, |_| ())?;
        self.state
            .borrow_mut()
            .copies
            .push((host.to_path_buf(), guest.to_path_buf()));
        Ok(())
    }

    fn info(&self, name: &str) -> Result<String> {
        self.record("info")?;
        self.with_instance_mut(name, |i| {
            format!(
                "Name: {}\nState: {}",
                name,
                if i.running { "Running" } else { "Stopped" }
            )
        })
    }

    fn logs(&self, name: &str, lines: usize) -> Result<String> {
        self.record("logs")?;
        self.with_instance_mut(name, |_| format!("last {} lines", lines))
    }

    fn follow_logs(&self, name: &str) -> Result<()> {
        self.record("follow_logs")?;
        self.with_instance_mut(name, |_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InstanceState;

    #[test]
    fn absent_is_never_running() {
        let mock = MockBackend::vm();
        assert!(!mock.exists("ghost").unwrap());
        assert!(!mock.running("ghost").unwrap());
        assert_eq!(mock.state("ghost").unwrap(), InstanceState::Absent);
    }

    #[test]
    fn state_distinguishes_stopped() {
        let mock = MockBackend::vm().with_instance("vm", false);
        assert_eq!(mock.state("vm").unwrap(), InstanceState::Stopped);
        mock.start("vm").unwrap();
        assert_eq!(mock.state("vm").unwrap(), InstanceState::Running);
    }

    #[test]
    fn delete_with_purge_removes_instance() {
        let mock = MockBackend::container().with_instance("box", true);
        mock.delete("box", true).unwrap();
        assert!(!mock.exists("box").unwrap());
    }

    #[test]
    fn injected_failure_carries_stderr() {
        let mock = MockBackend::vm()
            .with_instance("vm", false)
            .fail_on("start", "start failed: boom");
        match mock.start("vm").unwrap_err() {
            Error::ExternalTool { stderr, .. } => assert_eq!(stderr, "start failed: boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scripted_exec_repeats_last_output() {
        let mock = MockBackend::vm()
            .with_instance("vm", true)
            .script_exec("cloud-init", vec![Err("down"), Ok("status: running")]);
        assert!(mock.exec("vm", &["cloud-init", "status"]).is_err());
        assert_eq!(mock.exec("vm", &["cloud-init", "status"]).unwrap(), "status: running");
        assert_eq!(mock.exec("vm", &["cloud-init", "status"]).unwrap(), "status: running");
    }
}
