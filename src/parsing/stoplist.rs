//! Ambient stop-list for call-site/name-reference filtering.
//!
//! Names here are never emitted as CALLS/REFERENCES targets: test-framework
//! globals, language built-ins, and identifiers shorter than the
//! configured minimum.

use std::collections::HashSet;
use std::sync::LazyLock;

pub const DEFAULT_MIN_IDENTIFIER_LEN: usize = 2;

static BUILTIN_STOPLIST: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // test-framework globals
        "describe", "it", "test", "expect", "beforeEach", "afterEach", "beforeAll", "afterAll",
        "jest", "vi", "suite",
        // language / runtime built-ins
        "console", "require", "module", "exports", "Object", "Array", "String", "Number",
        "Boolean", "Promise", "Map", "Set", "Symbol", "JSON", "Math", "Error", "Date",
        "undefined", "null", "this", "super", "Infinity", "NaN",
    ]
    .into_iter()
    .collect()
});

pub struct StopList {
    min_identifier_len: usize,
    extra: HashSet<String>,
}

impl Default for StopList {
    fn default() -> Self {
        Self {
            min_identifier_len: DEFAULT_MIN_IDENTIFIER_LEN,
            extra: HashSet::new(),
        }
    }
}

impl StopList {
    pub fn new(min_identifier_len: usize, extra: impl IntoIterator<Item = String>) -> Self {
        Self {
            min_identifier_len,
            extra: extra.into_iter().collect(),
        }
    }

    pub fn is_filtered(&self, name: &str) -> bool {
        name.len() < self.min_identifier_len
            || BUILTIN_STOPLIST.contains(name)
            || self.extra.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_test_globals_and_short_names() {
        let stoplist = StopList::default();
        assert!(stoplist.is_filtered("describe"));
        assert!(stoplist.is_filtered("a"));
        assert!(!stoplist.is_filtered("computeChecksum"));
    }
}
