// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Discovery and dialing of XMPP servers.

mod dns;
mod tls;

pub use self::dns::{Dialer, DnsConfig};
pub use self::tls::tls_connector;
