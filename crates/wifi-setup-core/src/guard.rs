//! Anti-forgery tokens for the setup form.
//!
//! Every rendering of the form issues a fresh random 32-bit token and embeds
//! it as a hidden field. A submission is only accepted when it carries the
//! most recently issued token, which a page not served by the device cannot
//! know.

use std::fmt;

use rand::RngCore;
use subtle::ConstantTimeEq;

/// A 32-bit anti-forgery token, rendered as 8 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CsrfToken(u32);

impl CsrfToken {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Parse a token from its hex form as submitted by the form.
    ///
    /// Surrounding whitespace is ignored; anything that is not 1-8 hex
    /// digits yields `None`. Sign prefixes are not digits.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text.len() > 8 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(text, 16).ok().map(Self)
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Issues and verifies the single currently valid anti-forgery token.
#[derive(Debug, Default)]
pub struct AntiForgeryGuard {
    current: Option<CsrfToken>,
}

impl AntiForgeryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token, invalidating any previous one.
    pub fn issue(&mut self) -> CsrfToken {
        let token = CsrfToken(rand::thread_rng().next_u32());
        self.current = Some(token);
        token
    }

    /// Check a submitted token against the current one.
    ///
    /// Verification does not consume the token; only a new `issue` does.
    /// Before the first `issue` nothing verifies.
    pub fn verify(&self, token: CsrfToken) -> bool {
        match self.current {
            Some(current) => current.0.ct_eq(&token.0).into(),
            None => false,
        }
    }

    /// The currently valid token, if one has been issued.
    pub fn current(&self) -> Option<CsrfToken> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let mut guard = AntiForgeryGuard::new();
        let token = guard.issue();
        assert!(guard.verify(token));
        // Not consumed by verification.
        assert!(guard.verify(token));
        assert!(!guard.verify(CsrfToken::new(token.value().wrapping_add(1))));
    }

    #[test]
    fn test_reissue_invalidates_previous() {
        let mut guard = AntiForgeryGuard::new();
        let first = guard.issue();
        let mut second = guard.issue();
        // Two consecutive random draws can collide; draw until they differ.
        while second == first {
            second = guard.issue();
        }
        assert!(!guard.verify(first));
        assert!(guard.verify(second));
        assert_eq!(guard.current(), Some(second));
    }

    #[test]
    fn test_nothing_verifies_before_issue() {
        let guard = AntiForgeryGuard::new();
        assert!(!guard.verify(CsrfToken::new(0)));
    }

    #[test]
    fn test_token_hex_format() {
        let token = CsrfToken::new(0x00ab_12cd);
        assert_eq!(token.to_string(), "00ab12cd");
        assert_eq!(CsrfToken::parse("00ab12cd"), Some(token));
        assert_eq!(CsrfToken::parse("AB12CD"), Some(token));
        assert_eq!(CsrfToken::parse(""), None);
        assert_eq!(CsrfToken::parse("xyz"), None);
        assert_eq!(CsrfToken::parse("123456789"), None);
    }

    #[test]
    fn test_parse_rejects_sign_prefix() {
        assert_eq!(CsrfToken::parse("+abc"), None);
        assert_eq!(CsrfToken::parse("+0000abc"), None);
        assert_eq!(CsrfToken::parse("-1"), None);
        assert_eq!(CsrfToken::parse("00000abc"), Some(CsrfToken::new(0xabc)));
    }
}
