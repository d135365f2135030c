use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "cacheproxy", about = "Forward HTTP proxy with an on-disk response cache")]
pub struct Cli {
    /// Path to the configuration file (defaults to ./cacheproxy.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the proxy listener to; overrides the configured host.
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to bind the proxy listener to; overrides the configured port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
