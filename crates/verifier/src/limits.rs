//! Limits checking for bodies.
//!
//! Variable counts and scope depths are stored in 16-bit fields of the
//! compiled body.

use crate::error::VerifyError;

/// Maximum variables per body.
pub const MAX_VARIABLES: u32 = u16::MAX as u32;

/// Maximum number of scopes a body may address.
pub const MAX_SCOPE_DEPTH: u32 = u16::MAX as u32;

/// Check a body's declared variable count.
pub fn check_variable_count(body: usize, count: u32) -> Vec<VerifyError> {
    if count > MAX_VARIABLES {
        vec![VerifyError::TooManyVariables { body, count }]
    } else {
        Vec::new()
    }
}

/// Check the number of scopes a body's code addresses.
pub fn check_scope_depth(body: usize, depth: u32) -> Vec<VerifyError> {
    if depth > MAX_SCOPE_DEPTH {
        vec![VerifyError::TooDeep { body, depth }]
    } else {
        Vec::new()
    }
}
