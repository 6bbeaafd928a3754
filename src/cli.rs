use std::path::PathBuf;

use clap::{Parser, Subcommand};
use expopass::models::Role;

/// ExpoPass: QR badges and booth visit tracking for exhibitions
#[derive(Parser)]
#[command(name = "expopass", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (defaults to EXPOPASS_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep everything in process memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },

    /// Issue, check and render badge tokens
    Qr {
        #[command(subcommand)]
        command: QrCommands,
    },

    /// Organizer reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum QrCommands {
    /// Issue a fresh token, revoking the previous one
    Issue {
        /// attendee | booth
        #[arg(long)]
        role: Role,
        #[arg(long)]
        id: String,
    },
    /// Check a scanned value
    Verify {
        token: String,
    },
    /// Write a badge PNG for a token value
    Render {
        token: String,
        #[arg(long)]
        size: Option<u32>,
        #[arg(short, long, default_value = "badge.png")]
        out: PathBuf,
    },
    /// Write a ZIP of badge PNGs for every attendee or booth of an event
    Export {
        #[arg(long)]
        event_id: String,
        /// attendee | booth
        #[arg(long)]
        role: Role,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Totals and engagement for one event
    Summary {
        #[arg(long)]
        event_id: String,
    },
}
