use strum_macros::{Display, EnumIter};

/// How an event should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
    Detail,
}

/// Receives the user-visible record of a session.
pub trait EventSink {
    fn log(&mut self, text: &str, tone: Tone);
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    pub events: Vec<(Tone, String)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tone(&self, tone: Tone) -> impl Iterator<Item = &str> {
        self.events
            .iter()
            .filter(move |(t, _)| *t == tone)
            .map(|(_, text)| text.as_str())
    }
}

impl EventSink for EventLog {
    fn log(&mut self, text: &str, tone: Tone) {
        self.events.push((tone, text.to_string()));
    }
}
