use tracing::debug;

use crate::backend::{Backend, InstanceKind, InstanceState};
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};

/// Everything a lifecycle verb needs, built once per invocation.
pub struct Context {
    pub backend: Box<dyn Backend>,
    pub name: String,
    pub lifecycle: LifecycleConfig,
}

impl Context {
    pub fn new(backend: Box<dyn Backend>, name: impl Into<String>, lifecycle: LifecycleConfig) -> Self {
        let name = name.into();
        debug!(
            kind = %backend.kind(),
            binary = backend.binary(),
            name = %name,
            "context:created"
        );
        Self {
            backend,
            name,
            lifecycle,
        }
    }

    pub fn kind(&self) -> InstanceKind {
        self.backend.kind()
    }

    /// Fail early with `BackendUnavailable` before any state query.
    pub fn preflight(&self) -> Result<()> {
        self.backend.ensure_installed()
    }

    pub fn state(&self) -> Result<InstanceState> {
        let state = self.backend.state(&self.name)?;
        debug!(name = %self.name, ?state, "context:state");
        Ok(state)
    }

    /// The instance must exist; returns its current state.
    pub fn require_exists(&self) -> Result<InstanceState> {
        match self.state()? {
            InstanceState::Absent => Err(self.not_found()),
            state => Ok(state),
        }
    }

    pub fn require_running(&self) -> Result<()> {
        match self.require_exists()? {
            InstanceState::Running => Ok(()),
            _ => Err(Error::NotRunning {
                kind: self.kind(),
                name: self.name.clone(),
            }),
        }
    }

    pub fn not_found(&self) -> Error {
        Error::NotFound {
            kind: self.kind(),
            name: self.name.clone(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::context;
    use crate::backend::InstanceState;
    use crate::backend::mock::MockBackend;
    use crate::error::Error;

    #[test]
    fn require_exists_on_absent_is_not_found() {
        let mock = MockBackend::vm();
        let err = context(&mock).require_exists().unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn require_running_on_stopped_is_not_running() {
        let mock = MockBackend::vm().with_instance("coding-agent", false);
        let err = context(&mock).require_running().unwrap_err();
        assert!(matches!(err, Error::NotRunning { .. }));
    }

    #[test]
    fn require_running_passes() {
        let mock = MockBackend::container().with_instance("coding-agent", true);
        let ctx = context(&mock);
        ctx.require_running().unwrap();
        assert_eq!(ctx.state().unwrap(), InstanceState::Running);
    }

    #[test]
    fn preflight_checks_installation() {
        let mock = MockBackend::vm().fail_on("ensure_installed", "missing");
        assert!(context(&mock).preflight().is_err());
        assert_eq!(mock.calls(), vec!["ensure_installed"]);
    }
}
