//! Exit code constants for the appforge CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run reached `Done` |
//! | 1 | `INTERNAL` | Internal failure or invariant violation |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `UNACTIONABLE` | Request could not be turned into requirements |
//! | 4 | `NO_PLATFORMS` | No target platform could be determined |
//! | 5 | `PROVIDER_FAILURE` | Remote calls exhausted retries or were rejected |
//! | 6 | `ASSEMBLY_FAILED` | No platform produced a usable tree |
//! | 130 | `CANCELLED` | Run was cancelled (Ctrl-C) |

/// Exit codes matching the documented exit code table.
///
/// Use the named constants, or [`as_i32()`](Self::as_i32) to get the numeric
/// value for `std::process::exit()`.
///
/// ```rust
/// use appforge_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(4), ExitCode::NO_PLATFORMS);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - run completed with at least one usable platform tree
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure or broken state invariant
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// The request contained nothing that could be planned
    pub const UNACTIONABLE: ExitCode = ExitCode(3);

    /// Platform selection produced no platform and no fallback was configured
    pub const NO_PLATFORMS: ExitCode = ExitCode(4);

    /// A remote call exhausted its retries or was rejected
    pub const PROVIDER_FAILURE: ExitCode = ExitCode(5);

    /// Every platform failed assembly
    pub const ASSEMBLY_FAILED: ExitCode = ExitCode(6);

    /// Cancelled by the user
    pub const CANCELLED: ExitCode = ExitCode(130);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
