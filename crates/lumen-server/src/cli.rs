use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lumen-server", about = "Lumen live streaming and messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/lumen.toml")]
    pub config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}
