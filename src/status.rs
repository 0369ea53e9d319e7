//! Connection status line and the two user-facing affordances (send, enable
//! audio).

/// Close code for a normal, deliberate closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// The status element's CSS-like class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Connected,
    Disconnected,
    Connecting,
    Error,
}

impl StatusClass {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusClass::Connected => "connected",
            StatusClass::Disconnected => "disconnected",
            StatusClass::Connecting => "connecting",
            StatusClass::Error => "error",
        }
    }
}

/// Text plus class, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    label: String,
    class: StatusClass,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self {
            label: "Disconnected".to_string(),
            class: StatusClass::Disconnected,
        }
    }
}

impl StatusIndicator {
    pub fn text(&self) -> String {
        format!("Connection status: {}", self.label)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn class(&self) -> StatusClass {
        self.class
    }

    pub fn connecting(&mut self) {
        self.set("Connecting...", StatusClass::Connecting);
    }

    pub fn connected(&mut self) {
        self.set("Connected", StatusClass::Connected);
    }

    /// Any close other than a normal one is shown as an error.
    pub fn disconnected(&mut self, code: u16) {
        let class = if code == NORMAL_CLOSURE {
            StatusClass::Disconnected
        } else {
            StatusClass::Error
        };
        self.set("Disconnected", class);
    }

    pub fn error(&mut self) {
        self.set("Error", StatusClass::Error);
    }

    fn set(&mut self, label: &str, class: StatusClass) {
        self.label = label.to_string();
        self.class = class;
    }
}

/// Enabled/disabled state of the interactive controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub send_enabled: bool,
    pub audio_enabled: bool,
}

impl Default for Affordances {
    fn default() -> Self {
        Self {
            send_enabled: false,
            audio_enabled: true,
        }
    }
}
