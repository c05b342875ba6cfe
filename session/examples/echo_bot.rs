// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A minimal echo bot: logs in, sends its presence, and echoes every
//! chat message back to its sender.

use std::env::args;
use std::process::exit;

use sasl::common::Credentials;
use xmpp_addr::Addr;
use xmpp_session::negotiate::{Bind, FeatureSet, Sasl, StartTls};
use xmpp_session::{connect, HandlerError, Mux, Session, SessionConfig};
use xmpp_stanza::message::{Message, MessageType};
use xmpp_stanza::presence::Presence;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = args().collect();
    if args.len() != 3 {
        println!("Usage: {} <jid> <password>", args[0]);
        exit(1);
    }
    let addr: Addr = args[1].parse()?;
    let password = args[2].clone();
    let username = addr.local().ok_or("the account address needs a localpart")?;

    let conn = connect::Dialer::client().dial(addr.domain()).await?;
    let connector = connect::tls_connector()?;
    let credentials = Credentials::default()
        .with_username(username)
        .with_password(password);
    let features = FeatureSet::new()
        .with(StartTls::client(connector))
        .with(Sasl::client(credentials))
        .with(Bind::client(None));

    let mux = Mux::builder()
        .message(
            Some(MessageType::Chat),
            None,
            |session: Session, message: Message| async move {
                let (Some(from), Some(body)) =
                    (message.from.clone(), message.body().map(str::to_owned))
                else {
                    return Ok(());
                };
                println!("{}: {}", from, body);
                session
                    .send(Message::chat(from, body))
                    .await
                    .map_err(|e| HandlerError::Other(Box::new(e)))
            },
        )
        .build();

    let server: Addr = addr.domain().parse()?;
    let session = Session::negotiate_client(
        conn,
        addr,
        server,
        &features,
        mux,
        SessionConfig::default(),
    )
    .await?;
    println!("online as {}", session.local());

    session.send(Presence::available()).await?;
    session.serve().await?;
    Ok(())
}
