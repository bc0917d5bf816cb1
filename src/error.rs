//! System-wide error/status codes.
//!
//! Mirrors the single integer namespace shared by the original simulator's
//! "system codes": 0-1 are informational, >=100 are errors that get logged
//! and appended to the in-memory error log (see [`crate::system::ErrorRecord`]).

/// A system status or error code.
///
/// `TryFrom<u16>`/`From<SystemCode> for u16` round-trip the numeric protocol
/// the external shell speaks; the `#[error(...)]` messages below back the
/// `Display`/`std::error::Error` impls that `thiserror` derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SystemCode {
    /// Operation completed successfully.
    #[error("[0] Success")]
    Success,
    /// Operation completed successfully (legacy alias used by a few call sites).
    #[error("[1] Operation completed successfully")]
    Ok,
    /// Unknown error occurred.
    #[error("[100] Unknown error occurred")]
    Unknown,
    /// No program loaded, or an invalid program size.
    #[error("[101] No program loaded or invalid program size")]
    InvalidSize,
    /// Memory allocation error.
    #[error("[102] Memory allocation error")]
    MemoryAlloc,
    /// Invalid instruction or arguments.
    #[error("[103] Invalid instruction or arguments")]
    InvalidArgs,
    /// Division by zero.
    #[error("[104] Division by zero")]
    DivisionByZero,
    /// Invalid memory access.
    #[error("[105] Invalid memory access")]
    InvalidMemoryAccess,
    /// Stack overflow.
    #[error("[106] Stack overflow")]
    StackOverflow,
    /// Stack underflow.
    #[error("[107] Stack underflow")]
    StackUnderflow,
    /// Invalid register.
    #[error("[108] Invalid register")]
    InvalidRegister,
    /// File not found.
    #[error("[109] File not found")]
    FileNotFound,
    /// Out-of-bounds memory access.
    #[error("[110] Out-of-bounds memory access")]
    OutOfBounds,
    /// A requested page is not resident.
    #[error("[111] Page not resident")]
    PageNotResident,
    /// A read did not return the expected number of bytes.
    #[error("[112] Length mismatch")]
    LengthMismatch,
    /// An invalid path was supplied to a command.
    #[error("[113] Invalid path")]
    InvalidPath,
}

impl SystemCode {
    /// The numeric code as used by the external shell protocol (§6/§7 of the spec).
    pub const fn code(self) -> u16 {
        match self {
            SystemCode::Success => 0,
            SystemCode::Ok => 1,
            SystemCode::Unknown => 100,
            SystemCode::InvalidSize => 101,
            SystemCode::MemoryAlloc => 102,
            SystemCode::InvalidArgs => 103,
            SystemCode::DivisionByZero => 104,
            SystemCode::InvalidMemoryAccess => 105,
            SystemCode::StackOverflow => 106,
            SystemCode::StackUnderflow => 107,
            SystemCode::InvalidRegister => 108,
            SystemCode::FileNotFound => 109,
            SystemCode::OutOfBounds => 110,
            SystemCode::PageNotResident => 111,
            SystemCode::LengthMismatch => 112,
            SystemCode::InvalidPath => 113,
        }
    }

    /// Whether this code is purely informational (0 or 1) rather than an error.
    pub const fn is_informational(self) -> bool {
        matches!(self, SystemCode::Success | SystemCode::Ok)
    }
}

impl TryFrom<u16> for SystemCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => SystemCode::Success,
            1 => SystemCode::Ok,
            100 => SystemCode::Unknown,
            101 => SystemCode::InvalidSize,
            102 => SystemCode::MemoryAlloc,
            103 => SystemCode::InvalidArgs,
            104 => SystemCode::DivisionByZero,
            105 => SystemCode::InvalidMemoryAccess,
            106 => SystemCode::StackOverflow,
            107 => SystemCode::StackUnderflow,
            108 => SystemCode::InvalidRegister,
            109 => SystemCode::FileNotFound,
            110 => SystemCode::OutOfBounds,
            111 => SystemCode::PageNotResident,
            112 => SystemCode::LengthMismatch,
            113 => SystemCode::InvalidPath,
            other => return Err(other),
        })
    }
}

impl From<SystemCode> for u16 {
    fn from(value: SystemCode) -> Self {
        value.code()
    }
}

/// Convenience alias for fallible core operations.
pub type SysResult<T> = Result<T, SystemCode>;
