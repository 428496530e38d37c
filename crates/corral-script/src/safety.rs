//! Safety guarantees declared by operations and required by contexts.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of resource-safety guarantees.
///
/// Operations declare the guarantees they provide. An execution context
/// requires a set, and an operation is permitted when the context's required
/// set is contained in the operation's declared set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Safety(u8);

impl Safety {
    /// No guarantees at all.
    pub const NOT_SAFE: Self = Self(0);
    /// Every unit of computation is charged to the step budget.
    pub const CPU: Self = Self(1);
    /// Every allocation is charged to the allocation budget.
    pub const MEM: Self = Self(1 << 1);
    /// The operation observes cancellation and deadlines promptly.
    pub const TIME: Self = Self(1 << 2);
    /// File system access is confined and accounted.
    pub const IO: Self = Self(1 << 3);
    /// Every guarantee this crate knows about.
    pub const ALL: Self = Self(Self::CPU.0 | Self::MEM.0 | Self::TIME.0 | Self::IO.0);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::CPU, "cpu"),
        (Self::MEM, "mem"),
        (Self::TIME, "time"),
        (Self::IO, "io"),
    ];

    /// Returns the union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` when every guarantee in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the guarantees in `self` that are absent from `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` for [`Safety::NOT_SAFE`].
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when an operation declaring `self` may run in a context
    /// requiring `required`.
    #[must_use]
    pub const fn permits(self, required: Self) -> bool {
        self.contains(required)
    }
}

impl BitOr for Safety {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Safety {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for Safety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
