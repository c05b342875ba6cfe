// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session state bitmask.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// The state of a session, as a set of independent bits.
///
/// `RECEIVED` and `S2S` are fixed at construction and never change.
/// `SECURE` and `AUTHN` are monotonic: once set they stay set.
/// `INPUT_CLOSED` and `OUTPUT_CLOSED` are terminal for their half-stream.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionState(u8);

impl SessionState {
    /// The stream runs over an encrypted transport.
    pub const SECURE: SessionState = SessionState(1);

    /// The stream is authenticated.
    pub const AUTHN: SessionState = SessionState(1 << 1);

    /// Negotiation is complete; stanzas may flow.
    pub const READY: SessionState = SessionState(1 << 2);

    /// We are the responder of this stream, not the initiator.
    pub const RECEIVED: SessionState = SessionState(1 << 3);

    /// This is a server-to-server stream.
    pub const S2S: SessionState = SessionState(1 << 4);

    /// The input half-stream is closed for good.
    pub const INPUT_CLOSED: SessionState = SessionState(1 << 5);

    /// The output half-stream is closed for good.
    pub const OUTPUT_CLOSED: SessionState = SessionState(1 << 6);

    /// No bits set.
    pub fn empty() -> SessionState {
        SessionState(0)
    }

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(self, other: SessionState) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set in `self`.
    pub fn intersects(self, other: SessionState) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set all bits of `other`.
    pub fn insert(&mut self, other: SessionState) {
        self.0 |= other.0;
    }
}

impl BitOr for SessionState {
    type Output = SessionState;

    fn bitor(self, rhs: SessionState) -> SessionState {
        SessionState(self.0 | rhs.0)
    }
}

impl BitOrAssign for SessionState {
    fn bitor_assign(&mut self, rhs: SessionState) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (SessionState::SECURE, "Secure"),
            (SessionState::AUTHN, "Authn"),
            (SessionState::READY, "Ready"),
            (SessionState::RECEIVED, "Received"),
            (SessionState::S2S, "S2S"),
            (SessionState::INPUT_CLOSED, "InputClosed"),
            (SessionState::OUTPUT_CLOSED, "OutputClosed"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(empty)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_and_intersects() {
        let state = SessionState::SECURE | SessionState::AUTHN;
        assert!(state.contains(SessionState::SECURE));
        assert!(state.contains(SessionState::SECURE | SessionState::AUTHN));
        assert!(!state.contains(SessionState::READY));
        assert!(state.intersects(SessionState::AUTHN | SessionState::READY));
        assert!(!state.intersects(SessionState::READY));
    }

    #[test]
    fn insert_is_monotonic() {
        let mut state = SessionState::empty();
        state.insert(SessionState::SECURE);
        state.insert(SessionState::AUTHN);
        assert!(state.contains(SessionState::SECURE | SessionState::AUTHN));
    }

    #[test]
    fn debug_lists_bits() {
        let state = SessionState::SECURE | SessionState::READY;
        assert_eq!(format!("{:?}", state), "Secure|Ready");
        assert_eq!(format!("{:?}", SessionState::empty()), "(empty)");
    }
}
