use clap::Parser;
use clio::Input;

#[derive(Debug, Parser)]
#[command(name = "session-gate", about = "Login session gate service")]
pub struct Opt {
    /// Config file path, `-` reads it from stdin
    #[arg(short, long, value_parser, default_value = "config.toml")]
    pub config: Input,
}
