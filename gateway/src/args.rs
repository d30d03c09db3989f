//! CLI argument definitions. All other runtime configuration lives in
//! environment variables read by [`server::config::Config`]; the handful of
//! flags here let an operator override the log filter and listen port
//! without touching the environment.

use clap::Parser;

#[derive(Parser)]
#[command(name = "gateway", version, about = "Anthropic-to-OpenAI translation gateway")]
pub struct Args {
    /// Log filter, e.g. "info" or "server=debug,bridge=trace".
    #[arg(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,

    /// Overrides the `PORT` environment variable when set.
    #[arg(long)]
    pub port: Option<u16>,
}
