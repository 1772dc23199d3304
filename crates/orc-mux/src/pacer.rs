//! Paste-safe multiline keystroke delivery (SPEC_FULL.md §4.3).
//!
//! Agent terminal UIs treat a burst of keystrokes arriving faster than a human
//! could type as a paste, and react by bracketing or mangling it. The pacer
//! breaks a payload into lines and drip-feeds them with a size-scaled delay.

use std::time::Duration;

use orc_core::Error;
use tokio::time::sleep;

use crate::tmux::{NamedKey, Tmux};

const KB: usize = 1024;

fn delay_for_size(byte_len: usize) -> Duration {
    if byte_len > 3 * KB {
        Duration::from_millis(20)
    } else if byte_len > KB {
        Duration::from_millis(15)
    } else {
        Duration::from_millis(10)
    }
}

/// Delivers `text` to `pane`, line by line, at a pace that stays below the
/// target UI's paste-detection threshold. Submits with the default submit key
/// unless `submit` is false.
pub async fn send_paced(tmux: &Tmux, pane: &str, text: &str, submit: bool) -> Result<(), Error> {
    let delay = delay_for_size(text.len());
    let lines: Vec<&str> = text.split('\n').collect();

    tracing::info!(
        pane,
        chars = text.len(),
        lines = lines.len(),
        delay_ms = delay.as_millis() as u64,
        "pacing multiline send"
    );

    for (i, line) in lines.iter().enumerate() {
        if !line.is_empty() {
            tmux.send_line(pane, line, false).await?;
            sleep(delay).await;
        }
        if i + 1 < lines.len() {
            tmux.send_named_key(pane, NamedKey::NewlineNoSubmit).await?;
            sleep(delay).await;
        }
    }

    if submit {
        sleep(Duration::from_millis(50)).await;
        tmux.send_named_key(pane, NamedKey::Submit).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_scales_with_payload_size() {
        assert_eq!(delay_for_size(500), Duration::from_millis(10));
        assert_eq!(delay_for_size(2 * KB), Duration::from_millis(15));
        assert_eq!(delay_for_size(4 * KB), Duration::from_millis(20));
    }

    #[test]
    fn delay_boundary_is_exclusive() {
        assert_eq!(delay_for_size(KB), Duration::from_millis(10));
        assert_eq!(delay_for_size(3 * KB), Duration::from_millis(15));
    }
}
