//! Fixed resource ceilings for the Skein machine.
//!
//! Every table in the engine has a compile-time capacity; nothing is
//! allocated at runtime. These constants are the single source of truth
//! for bounds checks across the workspace.

/// Global value slots.
pub const GLOBAL_COUNT: usize = 256;

/// Memory buffer slots.
pub const BUFFER_COUNT: usize = 256;

/// Raw storage bytes per memory buffer.
pub const BUFFER_BYTES: usize = 256;

/// Call frames (maximum nesting depth).
pub const STACK_DEPTH: usize = 32;

/// Parameter/temporary value slots per frame.
pub const STACK_VAR_COUNT: usize = 16;

/// Local value slots per frame.
pub const LOCAL_COUNT: usize = 64;

/// Program memory capacity in bytes.
pub const PROGRAM_CAPACITY: usize = 65_536;

/// String storage per U8 buffer, including the NUL terminator.
pub const STR_CAPACITY: usize = 256;

/// Longest representable string (one byte reserved for the terminator).
pub const STR_MAX: usize = 255;
