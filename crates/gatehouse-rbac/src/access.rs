//! Access bitmask algebra.
//!
//! Access values are plain integers combined with bitwise OR. A check passes
//! when the required and granted masks share *any* bit: a grant of
//! `READ | UPDATE` satisfies a request for `UPDATE`, and a request for
//! `READ | WRITE` is satisfied by a grant of `READ` alone. Keep it that way;
//! callers rely on the permissive overlap semantics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Read access (`GET`).
pub const ACCESS_READ: i32 = 1;
/// Write access (`POST`).
pub const ACCESS_WRITE: i32 = 2;
/// Update access (`PUT`, `PATCH`).
pub const ACCESS_UPDATE: i32 = 4;
/// Delete access (`DELETE`).
pub const ACCESS_DELETE: i32 = 8;

/// OR-fold any number of access values. Returns 0 for no input.
pub fn combine_access(access: &[i32]) -> i32 {
    access.iter().fold(0, |acc, a| acc | a)
}

/// Any-bit-overlap test: `required & granted > 0`.
pub fn has_access(required: i32, granted: i32) -> bool {
    required & granted > 0
}

/// Map HTTP method names to an access mask, OR-folded.
///
/// Unrecognized methods contribute nothing. Names are matched exactly against
/// the canonical upper-case spelling.
pub fn http_method_to_access_code(methods: &[&str]) -> i32 {
    methods.iter().fold(0, |acc, method| {
        acc | match *method {
            "GET" => ACCESS_READ,
            "POST" => ACCESS_WRITE,
            "DELETE" => ACCESS_DELETE,
            "PUT" | "PATCH" => ACCESS_UPDATE,
            _ => 0,
        }
    })
}

/// Typed wrapper over an access mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Access(i32);

impl Access {
    pub const NONE: Access = Access(0);
    pub const READ: Access = Access(ACCESS_READ);
    pub const WRITE: Access = Access(ACCESS_WRITE);
    pub const UPDATE: Access = Access(ACCESS_UPDATE);
    pub const DELETE: Access = Access(ACCESS_DELETE);
    pub const ALL: Access = Access(ACCESS_READ | ACCESS_WRITE | ACCESS_UPDATE | ACCESS_DELETE);

    /// Wrap a raw mask.
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// The raw mask.
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// True if no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Any-bit-overlap with `granted`, same as [`has_access`].
    pub fn overlaps(self, granted: Access) -> bool {
        has_access(self.0, granted.0)
    }

    /// Access derived from HTTP method names.
    pub fn from_methods(methods: &[&str]) -> Self {
        Self(http_method_to_access_code(methods))
    }
}

impl From<i32> for Access {
    fn from(bits: i32) -> Self {
        Self(bits)
    }
}

impl From<Access> for i32 {
    fn from(access: Access) -> Self {
        access.0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Self) -> Self::Output {
        Access(self.0 | rhs.0)
    }
}

impl BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = [
            (ACCESS_READ, "read"),
            (ACCESS_WRITE, "write"),
            (ACCESS_UPDATE, "update"),
            (ACCESS_DELETE, "delete"),
        ]
        .iter()
        .filter(|(bit, _)| self.0 & bit != 0)
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "{:#x}", self.0)
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
