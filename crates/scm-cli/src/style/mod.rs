//! CLI styling utilities, narrowed from the teacher's `kimberlite-cli`
//! style module to what an admin query tool needs: semantic colors, a
//! few output helpers, and key-value/list tables. No banner, no spinner —
//! every `scm` invocation is a single request/response round trip, not
//! long enough to need one.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod colors;
pub mod output;
pub mod table;

pub use colors::SemanticStyle;
pub use output::*;
pub use table::*;

static NO_COLOR: AtomicBool = AtomicBool::new(false);

pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}
