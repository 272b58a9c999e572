//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | General error (failed import, store, watcher)       |
//! | 2    | Usage error (bad args, missing file, bad settings)  |
//! | 3    | Every import finished, at least one with warnings   |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - an import failed or the store was unusable.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input, unreadable settings.
pub const EXIT_USAGE: u8 = 2;

/// No import failed, but at least one finished as `partial`.
pub const EXIT_PARTIAL: u8 = 3;
