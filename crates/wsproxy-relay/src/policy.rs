//! Which received close codes count as a clean peer shutdown

use crate::endpoint::GOING_AWAY;

/// Close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// The set of close codes treated as a clean shutdown when received from a
/// message endpoint. Any other code is logged and reported as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePolicy {
    clean_codes: Vec<u16>,
}

impl ClosePolicy {
    /// Accept exactly the given codes as clean
    pub fn new(clean_codes: impl IntoIterator<Item = u16>) -> Self {
        let mut clean_codes: Vec<u16> = clean_codes.into_iter().collect();
        clean_codes.sort_unstable();
        clean_codes.dedup();
        Self { clean_codes }
    }

    /// Only "going away" is clean
    pub fn strict() -> Self {
        Self::new([GOING_AWAY])
    }

    pub fn with_clean_code(mut self, code: u16) -> Self {
        if let Err(pos) = self.clean_codes.binary_search(&code) {
            self.clean_codes.insert(pos, code);
        }
        self
    }

    pub fn is_clean(&self, code: u16) -> bool {
        self.clean_codes.binary_search(&code).is_ok()
    }

    pub fn clean_codes(&self) -> &[u16] {
        &self.clean_codes
    }
}

impl Default for ClosePolicy {
    /// "Going away" plus "normal closure", the code a compliant peer uses
    /// when it echoes or initiates a plain close.
    fn default() -> Self {
        Self::new([NORMAL_CLOSURE, GOING_AWAY])
    }
}
