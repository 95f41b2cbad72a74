//! Parse flags.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Flags changing how strictly an image is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParseFlags(u32);

impl ParseFlags {
    /// Strict parsing.
    pub const NONE: Self = Self(0);
    /// Do not fail on header or data checksum mismatches.
    pub const IGNORE_CHECKSUM: Self = Self(1 << 0);
    /// Only accept a container at the exact offset, never scan for one.
    pub const NO_SEARCH: Self = Self(1 << 1);
    /// Use the lower resource limits meant for fuzzing harnesses.
    pub const FUZZING: Self = Self(1 << 2);

    /// Check if all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ParseFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParseFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ParseFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::IGNORE_CHECKSUM, "ignore-checksum"),
            (Self::NO_SEARCH, "no-search"),
            (Self::FUZZING, "fuzzing"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_and_display() {
        let mut flags = ParseFlags::IGNORE_CHECKSUM;
        flags |= ParseFlags::FUZZING;
        assert!(flags.contains(ParseFlags::IGNORE_CHECKSUM));
        assert!(!flags.contains(ParseFlags::NO_SEARCH));
        assert_eq!(flags.to_string(), "ignore-checksum,fuzzing");
        assert_eq!(ParseFlags::NONE.to_string(), "none");
        assert!(ParseFlags::NONE.contains(ParseFlags::NONE));
    }
}
