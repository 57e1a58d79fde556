use scm_types::ScmError;
use tracing::error;

/// What the apply task should do after a write method returns an error
/// (§7 "Propagation policy"). Only `Internal`/`Metadata` are fatal; every
/// other kind becomes a typed reply that still flows back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ReturnToCaller,
    Fatal,
}

pub fn classify(error: &ScmError) -> Disposition {
    if error.is_fatal_on_apply() {
        Disposition::Fatal
    } else {
        Disposition::ReturnToCaller
    }
}

/// Abstraction over "terminate this process", so tests can observe a
/// fatal classification without actually calling `std::process::exit`.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32) -> !;
}

#[derive(Debug, Default)]
pub struct RealProcessExit;

impl ProcessExit for RealProcessExit {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// §7: "the apply thread logs, flushes what it can, and terminates the
/// process so the replica restarts from the log and either catches up or
/// requests a snapshot." The flush itself is the caller's responsibility
/// (the KV store fsyncs on every batch write, so there is nothing left to
/// flush by the time this runs); this function only logs and exits.
pub fn handle_fatal(error: &ScmError, exit: &dyn ProcessExit) -> ! {
    error!(error = %error, "fatal error during apply, terminating process");
    exit.exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingExit {
        code: std::cell::Cell<Option<i32>>,
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) -> ! {
            self.code.set(Some(code));
            panic!("test process-exit stand-in");
        }
    }

    #[test]
    fn internal_and_metadata_errors_classify_as_fatal() {
        assert_eq!(classify(&ScmError::Internal("disk full".into())), Disposition::Fatal);
        assert_eq!(classify(&ScmError::Metadata("bad checksum".into())), Disposition::Fatal);
    }

    #[test]
    fn everything_else_returns_to_the_caller() {
        assert_eq!(classify(&ScmError::NotFound("x".into())), Disposition::ReturnToCaller);
        assert_eq!(
            classify(&ScmError::InsufficientDatanodes { needed: 3, available: 1 }),
            Disposition::ReturnToCaller
        );
    }

    #[test]
    #[should_panic(expected = "test process-exit stand-in")]
    fn handle_fatal_invokes_the_exit_hook() {
        let exit = RecordingExit { code: std::cell::Cell::new(None) };
        handle_fatal(&ScmError::Internal("boom".into()), &exit);
    }
}
