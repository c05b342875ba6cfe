// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Log in, deliver one chat message, and leave.

use std::env::args;
use std::process::exit;

use xmpp_addr::Addr;
use xmpp_session::{Mux, Session};
use xmpp_stanza::message::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = args().collect();
    if args.len() != 5 {
        println!("Usage: {} <jid> <password> <recipient> <text>", args[0]);
        exit(1);
    }
    let addr: Addr = args[1].parse()?;
    let recipient: Addr = args[3].parse()?;

    let session = Session::login(addr, &args[2], Mux::builder().build()).await?;
    session.send(Message::chat(recipient, args[4].clone())).await?;
    session.close().await?;
    Ok(())
}
