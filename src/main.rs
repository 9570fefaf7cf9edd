//! Command line client sending one command to a bus agent.
//!
//! Parses CLI arguments, issues the command through a [`CommandClient`] and
//! prints the reply body to standard output.

mod cli;

use std::{process::ExitCode, time::Duration};

use agentlink::{CommandClient, ConnectOptions, Message};
use clap::Parser;
use cli::{Cli, Command, RequestArgs};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let Cli { command } = Cli::parse();
    match command {
        Command::Request(args) => request(args).await,
    }
}

async fn request(args: RequestArgs) -> ExitCode {
    let mut options = ConnectOptions::default();
    if let Some(username) = args.username {
        options = options.credentials(username, args.password.unwrap_or_default());
    }
    let client = CommandClient::builder(args.addr, args.command_address)
        .response_address(args.response_address)
        .connect_options(options)
        .build();

    let mut message = Message::new(args.body);
    if let Some(subject) = args.subject {
        message = message.with_subject(subject);
    }
    for (key, value) in args.properties {
        message = message.with_property(key, value);
    }

    client.start();
    let result = client
        .request_with_timeout(message, Duration::from_millis(args.timeout_ms))
        .await;
    client.stop().await;

    match result {
        Ok(reply) => {
            println!("{}", String::from_utf8_lossy(&reply.body));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "request failed");
            ExitCode::FAILURE
        }
    }
}
