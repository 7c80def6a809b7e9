use std::io;

use tracing::info;

use super::context::Context;
use super::types::DeleteOutcome;
use crate::backend::InstanceState;
use crate::error::{Error, Result};
use crate::output;

/// Delete and purge the instance.
///
/// A missing instance is not an error. Unless `force` is set, `confirm` is
/// asked first and a declined answer leaves everything untouched.
pub fn delete<F>(ctx: &Context, force: bool, confirm: F) -> Result<DeleteOutcome>
where
    F: FnOnce(&str) -> io::Result<bool>,
{
    let state = ctx.state()?;
    if state == InstanceState::Absent {
        output::warn(format!("{} '{}' does not exist", ctx.kind(), ctx.name));
        return Ok(DeleteOutcome::Absent);
    }

    if !force {
        let question = format!(
            "Are you sure you want to delete {} '{}'?",
            ctx.kind(),
            ctx.name
        );
        let accepted = confirm(&question).map_err(|e| Error::Io {
            context: "Failed to read confirmation".to_string(),
            source: e,
        })?;
        if !accepted {
            output::info("Cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
    }

    if state == InstanceState::Running {
        output::info(format!("Stopping {} '{}'...", ctx.kind(), ctx.name));
        ctx.backend.stop(&ctx.name)?;
    }

    output::info(format!("Deleting {} '{}'...", ctx.kind(), ctx.name));
    ctx.backend.delete(&ctx.name, true)?;
    info!(name = %ctx.name, kind = %ctx.kind(), "delete:done");
    Ok(DeleteOutcome::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::backend::mock::MockBackend;
    use crate::workflow::context::testing::context;

    fn never_asked(_: &str) -> io::Result<bool> {
        panic!("confirmation should not be requested");
    }

    #[test]
    fn forced_delete_of_absent_instance_succeeds_without_calls() {
        let mock = MockBackend::vm();
        let outcome = delete(&context(&mock), true, never_asked).unwrap();
        assert_eq!(outcome, DeleteOutcome::Absent);
        assert_eq!(mock.count("delete"), 0);
        assert_eq!(mock.count("stop"), 0);
    }

    #[test]
    fn declined_confirmation_cancels() {
        let mock = MockBackend::vm().with_instance("coding-agent", true);
        let outcome = delete(&context(&mock), false, |_| Ok(false)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(mock.count("stop"), 0);
        assert_eq!(mock.count("delete"), 0);
        assert!(mock.exists("coding-agent").unwrap());
    }

    #[test]
    fn confirmed_delete_stops_then_purges() {
        let mock = MockBackend::container().with_instance("coding-agent", true);
        let mut asked = None;
        let outcome = delete(&context(&mock), false, |q| {
            asked = Some(q.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(
            asked.as_deref(),
            Some("Are you sure you want to delete Container 'coding-agent'?")
        );
        let calls = mock.calls();
        let stop = calls.iter().position(|c| c == "stop").unwrap();
        let del = calls.iter().position(|c| c == "delete").unwrap();
        assert!(stop < del);
        assert!(!mock.exists("coding-agent").unwrap());
    }

    #[test]
    fn stopped_instance_is_not_stopped_again() {
        let mock = MockBackend::vm().with_instance("coding-agent", false);
        delete(&context(&mock), true, never_asked).unwrap();
        assert_eq!(mock.count("stop"), 0);
        assert_eq!(mock.count("delete"), 1);
    }

    #[test]
    fn confirmation_io_error_propagates() {
        let mock = MockBackend::vm().with_instance("coding-agent", false);
        let err = delete(&context(&mock), false, |_| {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(mock.count("delete"), 0);
    }
}
