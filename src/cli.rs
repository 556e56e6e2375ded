//! Command line interface for the `ddpwire` binary.
//!
//! The binary connects to a DDP server, optionally subscribes and calls a
//! method, and prints what arrives. The same definition drives man page
//! generation in the build script.

use clap::Parser;

/// Command line arguments for the `ddpwire` binary.
#[derive(Debug, Parser)]
#[command(name = "ddpwire", version, about = "Inspect a DDP server from the terminal")]
pub struct Cli {
    /// Server URL, such as `ws://localhost:3000/websocket`.
    pub url: String,
    /// Publication to subscribe to. May be repeated.
    #[arg(short, long = "subscribe", value_name = "NAME")]
    pub subscriptions: Vec<String>,
    /// Collection to print once subscriptions are ready. May be repeated.
    /// Defaults to the subscribed publication names.
    #[arg(short, long = "collection", value_name = "NAME")]
    pub collections: Vec<String>,
    /// Method to call after connecting.
    #[arg(long, value_name = "METHOD")]
    pub call: Option<String>,
    /// JSON argument for `--call`. May be repeated.
    #[arg(long = "arg", value_name = "JSON", requires = "call")]
    pub args: Vec<String>,
    /// Protocol version to offer, most preferred first. May be repeated.
    #[arg(long = "protocol", value_name = "VERSION")]
    pub protocols: Vec<String>,
    /// Connect timeout in seconds.
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u64,
    /// Resume token to log in with.
    #[arg(long, value_name = "TOKEN")]
    pub resume_token: Option<String>,
    /// Keep running and print collection changes until interrupted.
    #[arg(short, long)]
    pub watch: bool,
}
