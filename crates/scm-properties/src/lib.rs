//! # scm-properties: ALWAYS/SOMETIMES/NEVER property annotations
//!
//! Antithesis-style property macros for pinning the invariants in §8
//! directly at the call site they hold (or would be violated) in —
//! `always!` in the replicated log's apply path, `never!` in the
//! container FSM, `sometimes!` to document that a code path is expected
//! to be exercised at least once during simulation-style testing.
//!
//! Without the `sim` feature every macro compiles to a plain assertion
//! (`always!`/`never!`) or a no-op (`sometimes!`), so production builds
//! pay nothing beyond the assertion itself. With `sim` enabled, each
//! evaluation also records into a thread-local registry that a test
//! harness (`scm-cluster-dev`) can inspect afterward to confirm a
//! `sometimes!` condition was actually hit at least once across a run —
//! an always-true assertion that is never exercised is a silent gap in
//! coverage, exactly what `sometimes!` exists to catch.

#[cfg(feature = "sim")]
pub mod registry {
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct Counts {
        pub true_count: u64,
        pub false_count: u64,
    }

    thread_local! {
        static REGISTRY: RefCell<HashMap<&'static str, Counts>> = RefCell::new(HashMap::new());
    }

    /// Records one observation of the named property's condition.
    pub fn record(name: &'static str, condition: bool) {
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let counts = registry.entry(name).or_default();
            if condition {
                counts.true_count += 1;
            } else {
                counts.false_count += 1;
            }
        });
    }

    /// Snapshots everything recorded on this thread so far. Used by test
    /// harnesses to assert a `sometimes!` was actually hit (`true_count
    /// > 0`) before the run ends.
    #[must_use]
    pub fn snapshot() -> HashMap<&'static str, Counts> {
        REGISTRY.with(|registry| registry.borrow().clone())
    }

    pub fn clear() {
        REGISTRY.with(|registry| registry.borrow_mut().clear());
    }
}

/// Asserts a condition that must hold on every evaluation — a direct
/// pin of a universally-quantified invariant from §8 (e.g. "for all
/// pipelines P with state OPEN, `|members| = factor`"). Panics
/// immediately on violation, same as `assert!`, but named so the
/// invariant reads as a property rather than an incidental check.
#[macro_export]
macro_rules! always {
    ($cond:expr, $($arg:tt)+) => {{
        let condition = $cond;
        #[cfg(feature = "sim")]
        $crate::registry::record(concat!("always: ", file!(), ":", line!()), condition);
        assert!(condition, $($arg)+);
    }};
    ($cond:expr) => {
        $crate::always!($cond, concat!("ALWAYS violated: ", stringify!($cond)))
    };
}

/// Asserts a condition that must never hold — the mirror image of
/// `always!`, read as "this should never happen" (e.g. "two replicas
/// with the same member-set hash are both OPEN"). Panics if the
/// condition is ever true.
#[macro_export]
macro_rules! never {
    ($cond:expr, $($arg:tt)+) => {{
        let condition = $cond;
        #[cfg(feature = "sim")]
        $crate::registry::record(concat!("never: ", file!(), ":", line!()), !condition);
        assert!(!condition, $($arg)+);
    }};
    ($cond:expr) => {
        $crate::never!($cond, concat!("NEVER violated: ", stringify!($cond)))
    };
}

/// Documents that a code path is expected to be reachable — not a
/// correctness assertion, a coverage marker. A no-op without the `sim`
/// feature; with it, records an observation a test harness can later
/// confirm was hit at least once (e.g. "a pipeline actually went through
/// DORMANT during this simulation run").
#[macro_export]
macro_rules! sometimes {
    ($cond:expr) => {{
        #[cfg(feature = "sim")]
        $crate::registry::record(concat!("sometimes: ", file!(), ":", line!()), $cond);
        #[cfg(not(feature = "sim"))]
        {
            let _ = &$cond;
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn always_true_condition_passes() {
        always!(1 + 1 == 2);
    }

    #[test]
    #[should_panic]
    fn always_false_condition_panics() {
        always!(1 + 1 == 3);
    }

    #[test]
    fn never_false_condition_passes() {
        never!(1 + 1 == 3);
    }

    #[test]
    #[should_panic]
    fn never_true_condition_panics() {
        never!(1 + 1 == 2);
    }

    #[test]
    fn sometimes_is_always_a_no_op_assertion_wise() {
        sometimes!(true);
        sometimes!(false);
    }
}
