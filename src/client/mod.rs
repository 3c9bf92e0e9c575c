//! Download client abstraction
//!
//! The pipeline never speaks a download-client protocol itself. It hands each drained
//! torrent to a [`DownloadClient`], which wraps whatever backend the application uses
//! (qBittorrent, Transmission, aria2, ...).
//!
//! - [`DownloadClient`]: the submission interface
//! - [`DryRunClient`]: accepts everything and only logs, for dry runs and wiring tests

mod dry_run;
mod traits;

pub use dry_run::DryRunClient;
pub use traits::DownloadClient;
