use pbx_core::LINE_TERMINATOR;

/// The seven state notifications plus the in-call chat message, exactly as sent
/// to a client socket. Every TU operation emits exactly one of these to the
/// commanding client, and (for two-party transitions) exactly one to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OnHook { ext: u32 },
    Ringing,
    DialTone,
    RingBack,
    BusySignal,
    Connected { peer_ext: u32 },
    Error,
    Chat { text: String },
}

impl Notification {
    /// Renders the notification as a `\r\n`-terminated line, ready to write to
    /// the socket.
    pub fn to_line(&self) -> String {
        let body = match self {
            Notification::OnHook { ext } => format!("ON HOOK {}", ext),
            Notification::Ringing => "RINGING".to_string(),
            Notification::DialTone => "DIAL TONE".to_string(),
            Notification::RingBack => "RING BACK".to_string(),
            Notification::BusySignal => "BUSY SIGNAL".to_string(),
            Notification::Connected { peer_ext } => format!("CONNECTED {}", peer_ext),
            Notification::Error => "ERROR".to_string(),
            Notification::Chat { text } => format!("CHAT {}", text),
        };
        format!("{}{}", body, LINE_TERMINATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_state_lines() {
        assert_eq!(Notification::OnHook { ext: 4 }.to_line(), "ON HOOK 4\r\n");
        assert_eq!(Notification::Ringing.to_line(), "RINGING\r\n");
        assert_eq!(Notification::DialTone.to_line(), "DIAL TONE\r\n");
        assert_eq!(Notification::RingBack.to_line(), "RING BACK\r\n");
        assert_eq!(Notification::BusySignal.to_line(), "BUSY SIGNAL\r\n");
        assert_eq!(Notification::Connected { peer_ext: 5 }.to_line(), "CONNECTED 5\r\n");
        assert_eq!(Notification::Error.to_line(), "ERROR\r\n");
    }

    #[test]
    fn renders_chat_with_arbitrary_text() {
        assert_eq!(Notification::Chat { text: "hi there".into() }.to_line(), "CHAT hi there\r\n");
    }
}
