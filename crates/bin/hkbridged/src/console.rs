//! Command console: one switch service call per input line.
//!
//! ```text
//! turn_on switch.desk_outlet
//! toggle switch.aqara_hub_pairing_mode
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The console stops at
//! the end of its input.

use std::io::BufRead;

use tokio::sync::mpsc;

use hkbridge_app::ports::{AccessoryTransport, EventPublisher};
use hkbridge_app::services::switch_service::SwitchService;

/// A parsed console line.
#[derive(Debug, PartialEq, Eq)]
struct Command<'a> {
    service: &'a str,
    entity_id: &'a str,
}

impl<'a> Command<'a> {
    /// `Ok(None)` for lines carrying no command.
    fn parse(line: &'a str) -> Result<Option<Self>, &'a str> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some(service), Some(entity_id), None) => Ok(Some(Self { service, entity_id })),
            _ => Err(line),
        }
    }
}

/// Lines of standard input, read on a detached thread: a blocking read of
/// stdin cannot be cancelled and must not hold up runtime shutdown.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(%err, "console input failed");
                    break;
                }
            };
            if sender.blocking_send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

/// Read commands from `lines` until it ends, forwarding each to `switches`.
///
/// A failing command is logged and never stops the console.
pub async fn run<T, P>(switches: SwitchService<T, P>, mut lines: mpsc::Receiver<String>)
where
    T: AccessoryTransport + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    while let Some(line) = lines.recv().await {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(line) => {
                tracing::warn!(line, "expected `<service> <entity_id>`");
                continue;
            }
        };
        match switches
            .handle_service_call(command.entity_id, command.service)
            .await
        {
            Ok(entity) => tracing::info!(
                entity_id = %entity.entity_id,
                state = ?entity.state,
                "service call handled"
            ),
            Err(err) => tracing::warn!(
                entity_id = command.entity_id,
                service = command.service,
                %err,
                "service call failed"
            ),
        }
    }
    tracing::debug!("console input closed");
}
