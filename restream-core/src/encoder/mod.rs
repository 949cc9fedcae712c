//! Everything that touches the external encoder binary: argument
//! construction, diagnostic parsing and process launching.

pub mod command;
pub mod launcher;
pub mod lines;
pub mod progress;

use std::process::Stdio;

pub use command::{CommandBuilder, StreamSettings, resolution_preset};
pub use launcher::{CommandLauncher, EncoderLauncher, ExitReport, LaunchedEncoder, ProcessControl};
pub use lines::DiagnosticLineCodec;
pub use progress::{Progress, parse_progress};

/// Runs `<program> -version` and reports whether it exited cleanly.
pub async fn check_encoder(program: &str) -> bool {
    let status = tokio::process::Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) => status.success(),
        Err(e) => {
            log::debug!("Encoder: {} not usable: {}", program, e);
            false
        }
    }
}
