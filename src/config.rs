use std::sync::LazyLock;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "lite-mux")]
#[command(about = "Replay a recorded media file into a live or file sink")]
pub struct RelayConfig {
    /// Recorded media file to read samples from
    pub input: String,

    /// Sink locator: rtmp:// URL, http:// DASH endpoint or file path
    pub destination: String,

    /// Output format, chosen from the destination when omitted
    #[arg(short, long)]
    pub format: Option<String>,

    /// Pace samples at their timestamps instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Number of passes over the input
    #[arg(short = 'n', long, default_value = "1")]
    pub loop_count: u32,

    /// Log level for the relay and muxer modules
    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}

impl RelayConfig {
    pub fn format(&self) -> &str {
        match &self.format {
            Some(format) => format,
            None => ffmpeg_mux::options::format_for_destination(&self.destination),
        }
    }
}

pub fn config() -> &'static RelayConfig {
    static CONFIG: LazyLock<RelayConfig> = LazyLock::new(RelayConfig::parse);
    &CONFIG
}
