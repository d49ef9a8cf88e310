//! Terminal rendering and the terminal [`Platform`].

use std::{
    collections::HashSet,
    io::{self, Write},
    time::Duration,
};

use epistle_app::{ConversationView, ConvoNotification, Platform, UserSettings};
use epistle_core::{DecodedMessage, MessageId};

/// Platform backed by the terminal: vibration rings the bell.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPlatform {
    /// Suppress the bell.
    pub silenced: bool,
}

impl Platform for TerminalPlatform {
    fn settings(&self) -> UserSettings {
        UserSettings { notifications_enabled: false, vibration_enabled: true }
    }

    fn is_app_sleeping(&self) -> bool {
        false
    }

    fn is_silenced(&self) -> bool {
        self.silenced
    }

    fn vibrate(&self, _duration: Duration) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }

    fn notify(&self, convo_id: &str, title: &str, count: usize) {
        tracing::info!(convo_id, title, count, "new messages");
    }
}

/// Prints each message of successive views exactly once.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashSet<MessageId>,
}

impl Transcript {
    /// Write messages of `view` that were not printed before.
    ///
    /// # Errors
    ///
    /// If writing to `out` fails.
    pub fn render(&mut self, view: &ConversationView, out: &mut impl Write) -> io::Result<()> {
        for message in &view.messages {
            if self.printed.insert(message.id) {
                writeln!(out, "{}", format_message(message))?;
            }
        }
        out.flush()
    }
}

/// One transcript line.
pub fn format_message(message: &DecodedMessage) -> String {
    let who = if message.is_from_server {
        "*".to_string()
    } else if message.is_own {
        format!("{} (you)", message.sender_name)
    } else {
        message.sender_name.clone()
    };
    let time = message.timestamp().map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
    let body = match (message.display_text(), message.attachment()) {
        (Some(text), _) => text.to_string(),
        (None, Some((name, bytes))) => format!("[file {name}, {} bytes]", bytes.len()),
        (None, None) => String::new(),
    };
    format!("[{time}] {who}: {body}")
}

/// One line for notifications worth showing, `None` for the rest.
pub fn format_notification(notification: &ConvoNotification) -> Option<String> {
    match notification {
        ConvoNotification::MetadataChanged { metadata, .. } => {
            Some(format!("-- convo is now \"{}\": {}", metadata.name, metadata.description))
        },
        ConvoNotification::SendFailed { reason, .. } => Some(format!("-- send failed: {reason}")),
        ConvoNotification::NewMessages { .. } | ConvoNotification::SendCompleted { .. } => None,
    }
}
