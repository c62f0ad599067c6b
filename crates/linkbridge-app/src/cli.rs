use std::path::PathBuf;

use clap::Parser;

/// Network-to-serial bridge: a transparent TCP-to-serial pipe and an
/// RFB/VNC-to-USB-HID front-end, multiplexed over one UART via TLV framing.
#[derive(Parser, Debug)]
#[command(name = "linkbridge", version, about)]
pub struct Cli {
    /// Serial device node the UART is attached to (e.g. /dev/ttyUSB0).
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Baud rate for the serial device.
    #[arg(long)]
    pub baud: Option<u32>,

    /// TCP port for the transparent serial bridge.
    #[arg(long)]
    pub serial_port: Option<u16>,

    /// TCP port for the RFB/VNC front-end.
    #[arg(long)]
    pub vnc_port: Option<u16>,

    /// Path to a TOML config file; missing/invalid falls back to defaults
    /// unless this flag was given explicitly.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured VNC shared password.
    #[arg(long)]
    pub vnc_password: Option<String>,

    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
