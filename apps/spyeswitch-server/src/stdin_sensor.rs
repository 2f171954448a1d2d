//! Sensor simulator reading levels from standard input.
//!
//! Each line sets the simulated line level: `1`, `on` or `high` for motion,
//! `0`, `off` or `low` for none.

use spyeswitch_core::LevelSender;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parses one line of simulator input.
pub fn parse_level(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "high" => Some(true),
        "0" | "off" | "low" => Some(false),
        _ => None,
    }
}

/// Spawns the stdin reader. Stops on EOF or cancellation.
pub fn spawn_stdin_sensor(line: LevelSender, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        log::info!("[Simulator] Reading sensor levels from stdin (1/on, 0/off)");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(text)) => match parse_level(&text) {
                    Some(level) => {
                        if !line.set(level).await {
                            break;
                        }
                    }
                    None if text.trim().is_empty() => {}
                    None => log::warn!("[Simulator] Ignoring {:?}, expected 1/0/on/off", text),
                },
                Ok(None) => {
                    log::info!("[Simulator] stdin closed");
                    break;
                }
                Err(e) => {
                    log::warn!("[Simulator] stdin read failed: {}", e);
                    break;
                }
            }
        }
    })
}
