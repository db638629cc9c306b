//! Type-Resolution Budget (C3) — bounds the cost of semantic lookups.
//!
//! A per-file token counter caps the quadratic worst case of whole-program
//! semantic resolution while preserving precision for the high-value cases
//!.

use std::sync::atomic::{AtomicU32, Ordering};

pub const DEFAULT_CAP: u32 = 50;
pub const HARD_MAX: u32 = 200;
pub const MIN_NAME_LEN_FOR_SEMANTIC: usize = 3;

/// Scales the default cap upward with file size and cyclomatic complexity,
/// capped at [`HARD_MAX`].
pub fn scaled_cap(default_cap: u32, file_size_bytes: u64, complexity: u32) -> u32 {
    let size_bonus = (file_size_bytes / 2_000).min(100) as u32;
    let complexity_bonus = complexity.min(50);
    (default_cap + size_bonus + complexity_bonus).min(HARD_MAX)
}

/// Context passed to [`TypeResolutionBudget::should_use`].
pub struct LookupContext<'a> {
    pub name: &'a str,
    pub crosses_file_boundary: bool,
    pub is_ambiguous: bool,
}

/// Per-file budget gate for expensive semantic lookups.
pub struct TypeResolutionBudget {
    remaining: AtomicU32,
}

impl TypeResolutionBudget {
    pub fn new(cap: u32) -> Self {
        Self {
            remaining: AtomicU32::new(cap),
        }
    }

    pub fn with_default_cap() -> Self {
        Self::new(DEFAULT_CAP)
    }

    /// Consume one token; returns true iff tokens remained.
    pub fn take(&self) -> bool {
        loop {
            let current = self.remaining.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .remaining
                .compare_exchange(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Gate policy: only consider spending budget when the lookup crosses a
    /// file boundary, the name is ambiguous under the name index, or the
    /// name is long enough to be a high-value target.
    pub fn should_use(&self, ctx: &LookupContext<'_>) -> bool {
        if self.remaining() == 0 {
            return false;
        }
        if ctx.name.len() < MIN_NAME_LEN_FOR_SEMANTIC {
            return false;
        }
        ctx.crosses_file_boundary || ctx.is_ambiguous
    }

    /// Combined gate + spend, the call site's usual entry point.
    pub fn try_use(&self, ctx: &LookupContext<'_>) -> bool {
        self.should_use(ctx) && self.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_cap_tokens() {
        let budget = TypeResolutionBudget::new(2);
        assert!(budget.take());
        assert!(budget.take());
        assert!(!budget.take());
    }

    #[test]
    fn short_names_never_spend_budget() {
        let budget = TypeResolutionBudget::new(10);
        let ctx = LookupContext {
            name: "ab",
            crosses_file_boundary: true,
            is_ambiguous: true,
        };
        assert!(!budget.should_use(&ctx));
        assert_eq!(budget.remaining(), 10);
    }

    #[test]
    fn local_unambiguous_names_are_not_gated_in() {
        let budget = TypeResolutionBudget::new(10);
        let ctx = LookupContext {
            name: "LongLocalName",
            crosses_file_boundary: false,
            is_ambiguous: false,
        };
        assert!(!budget.should_use(&ctx));
    }

    #[test]
    fn scaled_cap_respects_hard_max() {
        assert_eq!(scaled_cap(50, 10_000_000, 1_000), HARD_MAX);
    }
}
