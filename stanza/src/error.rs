// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type returned by the `TryFrom<Element>` conversions in this crate.

use core::fmt;
use std::error::Error as StdError;

/// Reason an [`Element`][`minidom::Element`] could not be converted into a
/// typed value.
#[derive(Debug)]
pub enum Error {
    /// The element's name or namespace does not match the type at all.
    ///
    /// Conversions fail with this variant before inspecting anything else,
    /// so callers can probe an element against several types.
    TypeMismatch,

    /// The element matches the type but its content is invalid.
    ParseError(&'static str),

    /// An attribute or text value failed to parse.
    TextParseError(Box<dyn StdError + Send + Sync + 'static>),

    /// A base64-encoded payload failed to decode.
    Base64Error(base64::DecodeError),
}

impl Error {
    /// Wrap a value parse failure.
    pub fn text_parse_error<E: StdError + Send + Sync + 'static>(e: E) -> Error {
        Error::TextParseError(Box::new(e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TypeMismatch => write!(f, "element does not match the expected type"),
            Error::ParseError(s) => write!(f, "{}", s),
            Error::TextParseError(e) => write!(f, "text parse error: {}", e),
            Error::Base64Error(e) => write!(f, "base64 error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::TextParseError(e) => Some(&**e),
            Error::Base64Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Error {
        Error::Base64Error(e)
    }
}
