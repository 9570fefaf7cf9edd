//! Command line interface for the `agentlink` binary.
//!
//! Shared with the build script, which renders the manual page from it, so
//! this module depends on `clap` and `std` only.

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `agentlink` binary.
#[derive(Debug, Parser)]
#[command(
    name = "agentlink",
    version,
    about = "Send commands to agents on a message bus"
)]
pub struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one command and print the reply body.
    Request(RequestArgs),
}

/// Arguments of `agentlink request`.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Bus URI, for example `amqp://broker:5672`.
    #[arg(long, env = "AGENTLINK_ADDR")]
    pub addr: String,
    /// Address commands are sent to.
    #[arg(long)]
    pub command_address: String,
    /// Source address for the dynamic reply link.
    #[arg(long, default_value = "")]
    pub response_address: String,
    /// Subject set on the command.
    #[arg(long)]
    pub subject: Option<String>,
    /// Application property `key=value`; may be repeated.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
    /// How long to wait for the reply, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
    /// User name presented to the bus.
    #[arg(long, env = "AGENTLINK_USERNAME")]
    pub username: Option<String>,
    /// Password presented to the bus.
    #[arg(long, env = "AGENTLINK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Command body.
    pub body: String,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use rstest::rstest;

    use super::{Cli, Command, parse_property};

    #[test]
    fn command_definition_is_consistent() { Cli::command().debug_assert(); }

    #[test]
    fn request_subcommand_is_exposed() {
        let cmd = Cli::command();
        let names: Vec<_> = cmd.get_subcommands().map(clap::Command::get_name).collect();
        assert_eq!(names, ["request"]);
    }

    #[test]
    fn parses_request_arguments() {
        let cli = Cli::parse_from([
            "agentlink",
            "request",
            "--addr",
            "amqp://bus:5672",
            "--command-address",
            "$management",
            "--subject",
            "getStatus",
            "--property",
            "node=7",
            "--property",
            "mode=fast",
            "--timeout-ms",
            "250",
            "--username",
            "admin",
            "--password",
            "secret",
            "ping",
        ]);
        let Command::Request(args) = cli.command;
        assert_eq!(args.addr, "amqp://bus:5672");
        assert_eq!(args.command_address, "$management");
        assert_eq!(args.response_address, "");
        assert_eq!(args.subject.as_deref(), Some("getStatus"));
        assert_eq!(
            args.properties,
            vec![
                ("node".to_owned(), "7".to_owned()),
                ("mode".to_owned(), "fast".to_owned()),
            ]
        );
        assert_eq!(args.timeout_ms, 250);
        assert_eq!(args.username.as_deref(), Some("admin"));
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert_eq!(args.body, "ping");
    }

    #[rstest]
    #[case("k=v", Some(("k", "v")))]
    #[case("k=a=b", Some(("k", "a=b")))]
    #[case("k=", Some(("k", "")))]
    #[case("=v", None)]
    #[case("novalue", None)]
    fn property_parsing(#[case] raw: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_property(raw).ok();
        assert_eq!(
            parsed.as_ref().map(|(k, v)| (k.as_str(), v.as_str())),
            expected
        );
    }

    #[test]
    fn missing_command_address_is_rejected() {
        let result = Cli::try_parse_from(["agentlink", "request", "--addr", "bus", "body"]);
        assert!(result.is_err());
    }
}
