use thiserror::Error;

/// §4.1 error taxonomy. `Corruption` is fatal and aborts the process
/// (enforced by the caller, `scm-kernel::classification`, not by this
/// crate); `NotFound`/`IoFailed` are returned to the caller.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found in table {table}")]
    NotFound { table: String },

    #[error("corruption detected in table {table}: {detail}")]
    Corruption { table: String, detail: String },

    #[error("io failure on table {table}: {source}")]
    IoFailed {
        table: String,
        #[source]
        source: std::io::Error,
    },
}

pub type KvResult<T> = std::result::Result<T, KvError>;
