use clap::{Parser, Subcommand};
use vigil_core::ScanStatus;

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Malware scanning pipeline for uploaded files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Consume upload events, scan the files and publish results
    ScanWorker {
        /// Parallel consumer loops (defaults to CONSUMER_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Consume scan results and update persisted file status
    IngestWorker {
        /// Parallel consumer loops (defaults to CONSUMER_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run the scan worker and the result ingester in one process
    Run {
        /// Parallel consumer loops per worker (defaults to CONSUMER_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Republish dead-lettered upload events whose file is still in ERROR
    ReplayDlt,
    /// Queue a file in ERROR for another scan
    Rescan {
        /// Object key of the file
        #[arg(long)]
        key: String,
    },
    /// List file records with the given status
    List {
        /// PENDING_SCAN, CLEAN, INFECTED or ERROR
        #[arg(long)]
        status: ScanStatus,
    },
    /// Show file counts per scan status
    Stats,
    /// Delete every file record with the given status
    Purge {
        /// PENDING_SCAN, CLEAN, INFECTED or ERROR
        #[arg(long)]
        status: ScanStatus,
    },
}
