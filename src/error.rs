//! Error carrier for the core runtime
//!
//! Errors are reported as a `(code, file, line)` tuple rather than a plain
//! enum so diagnostics can attribute a failure to its origin call site,
//! mirroring the source's `Error`/`MAKE_ERROR` convention.

use core::fmt;

/// Error kinds the core runtime can report at run time.
/// Boot-time firmware-table validation failures are fatal and never reach
/// this type; they are logged and halt the boot directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The bitmap frame allocator cannot satisfy a request.
    NoEnoughMemory,
    /// `Sleep`/`Wakeup` by ID referenced an unknown task.
    NoSuchTask,
}

impl ErrorCode {
    const fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoEnoughMemory => "NoEnoughMemory",
            ErrorCode::NoSuchTask => "NoSuchTask",
        }
    }
}

/// A reported error, carrying the call site that raised it.
#[derive(Clone, Copy)]
pub struct Error {
    code: ErrorCode,
    file: &'static str,
    line: u32,
}

impl Error {
    /// Construct an `Error`. Call through [`make_error`] so `file`/`line`
    /// are captured at the raising site rather than here.
    pub const fn new(code: ErrorCode, file: &'static str, line: u32) -> Self {
        Self { code, file, line }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.code.name(), self.file, self.line)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Build an [`Error`] capturing the call site of the macro invocation.
#[macro_export]
macro_rules! make_error {
    ($code:expr) => {
        $crate::error::Error::new($code, file!(), line!())
    };
}

pub type KernelResult<T> = Result<T, Error>;
