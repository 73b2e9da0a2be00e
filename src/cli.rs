// ABOUTME: Command-line arguments for relaybot
// ABOUTME: Without --room the bot runs; with --room it sends one message and exits

use clap::Parser;
use relaybot_core::handler::FormatFlags;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "relaybot",
    version,
    about = "Matrix bot that relays room messages to handler scripts"
)]
pub struct Cli {
    /// Verbose logging (also enabled by setting DEBUG).
    #[arg(short, long)]
    pub debug: bool,

    /// Send a single message to this room and exit.
    #[arg(short, long, value_name = "ROOM_ID")]
    pub room: Option<String>,

    /// Message to send; read from stdin when omitted. Requires --room.
    #[arg(short, long, value_name = "TEXT", requires = "room")]
    pub message: Option<String>,

    /// Send output as HTML.
    #[arg(short = 'w', long)]
    pub html: bool,

    /// Send output as a code block.
    #[arg(short, long)]
    pub code: bool,

    /// Config file (default: ./config.toml, then ~/.config/relaybot/config.toml).
    #[arg(long, env = "RELAYBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory.
    #[arg(long, env = "RELAYBOT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn format_flags(&self) -> FormatFlags {
        FormatFlags {
            code: self.code,
            html: self.html,
        }
    }

    /// --debug, or DEBUG present in the environment
    pub fn debug_enabled(&self) -> bool {
        self.debug || std::env::var_os("DEBUG").is_some()
    }
}
