//! Standard exit codes for CLI operations
//!
//! Clap reports invalid arguments with exit code 2, which matches `USER_ERROR`.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// User error - invalid input, or a request that conflicts with the cluster state
pub const USER_ERROR: i32 = 2;

/// No session with the traffic manager
pub const NOT_CONNECTED: i32 = 3;

/// An operation exceeded its configured timeout
pub const TIMEOUT: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// The cluster or the traffic manager could not be reached
pub const COMMUNICATION_ERROR: i32 = 6;

/// Interrupted by Ctrl+C, following the shell's 128 + SIGINT convention
pub const INTERRUPTED: i32 = 130;
