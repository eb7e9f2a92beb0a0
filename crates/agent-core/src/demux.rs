//! Stream Demultiplexing
//!
//! Splits a raw model token stream into semantic events. Providers that
//! frame their output as `<thinking>...</thinking><message>...</message>`
//! get a [`TaggedDemux`]; everything else gets [`Passthrough`]. The loop
//! picks one per generation through [`consumer_for`] and never branches on
//! the provider itself.

use crate::config::Framing;
use crate::event::EventKind;

const THINKING_OPEN: &str = "<thinking>";
const THINKING_CLOSE: &str = "</thinking>";
const MESSAGE_OPEN: &str = "<message>";
const MESSAGE_CLOSE: &str = "</message>";

const TAGS: [&str; 4] = [THINKING_OPEN, THINKING_CLOSE, MESSAGE_OPEN, MESSAGE_CLOSE];

/// Turns raw chunks of one generation into events.
///
/// Not shared: one consumer per generation, driven by a single task.
pub trait StreamConsumer: Send {
    /// Feed the next raw chunk; returns the events it completes, in order
    fn consume(&mut self, chunk: &str) -> Vec<EventKind>;

    /// Whether message content has started streaming
    fn has_started(&self) -> bool;

    /// Everything consumed so far, unmodified
    fn raw(&self) -> &str;
}

/// Consumer for a provider's stream framing
pub fn consumer_for(framing: Framing) -> Box<dyn StreamConsumer> {
    match framing {
        Framing::Tagged => Box::new(TaggedDemux::default()),
        Framing::Plain => Box::new(Passthrough::default()),
    }
}

/// Every chunk is message content
#[derive(Debug, Default)]
pub struct Passthrough {
    raw: String,
    started: bool,
}

impl StreamConsumer for Passthrough {
    fn consume(&mut self, chunk: &str) -> Vec<EventKind> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.raw.push_str(chunk);

        let mut events = Vec::with_capacity(2);
        if !self.started {
            self.started = true;
            events.push(EventKind::StreamStart);
        }
        events.push(EventKind::message_chunk(chunk, false));
        events
    }

    fn has_started(&self) -> bool {
        self.started
    }

    fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Section {
    #[default]
    Outside,
    Thinking,
    Message,
}

/// Tag-driven demultiplexer.
///
/// Works on the accumulated text rather than on chunk boundaries, so tags
/// split across chunks are handled. A trailing partial tag, and trailing
/// whitespace, are held back until the next chunk settles them. Each block
/// opens at most once per generation.
#[derive(Debug, Default)]
pub struct TaggedDemux {
    raw: String,
    section: Section,
    /// Byte offset in `raw` where the open section's text begins
    section_start: usize,
    /// Bytes of the open section's visible text already emitted
    emitted: usize,
    /// Byte offset in `raw` from which to look for the next opening tag
    scan_from: usize,
    thinking_seen: bool,
    message_seen: bool,
}

impl TaggedDemux {
    fn open_next(&mut self, events: &mut Vec<EventKind>) -> bool {
        let rest = &self.raw[self.scan_from..];
        let thinking = (!self.thinking_seen)
            .then(|| rest.find(THINKING_OPEN))
            .flatten();
        let message = (!self.message_seen)
            .then(|| rest.find(MESSAGE_OPEN))
            .flatten();

        let (section, at, tag) = match (thinking, message) {
            (Some(t), Some(m)) if m < t => (Section::Message, m, MESSAGE_OPEN),
            (Some(t), _) => (Section::Thinking, t, THINKING_OPEN),
            (None, Some(m)) => (Section::Message, m, MESSAGE_OPEN),
            (None, None) => return false,
        };

        self.section = section;
        self.section_start = self.scan_from + at + tag.len();
        self.emitted = 0;
        match section {
            Section::Thinking => {
                self.thinking_seen = true;
                events.push(EventKind::ThinkingStart);
            }
            Section::Message => {
                self.message_seen = true;
                events.push(EventKind::StreamStart);
            }
            Section::Outside => {}
        }
        true
    }

    /// Advance the open section; returns true when it closed
    fn advance(&mut self, events: &mut Vec<EventKind>) -> bool {
        let (close, is_thinking) = match self.section {
            Section::Thinking => (THINKING_CLOSE, true),
            Section::Message => (MESSAGE_CLOSE, false),
            Section::Outside => return false,
        };
        let body = &self.raw[self.section_start..];

        let Some(end) = body.find(close) else {
            let visible = section_text(settled(body), is_thinking);
            if let Some(delta) = visible.get(self.emitted..).filter(|d| !d.is_empty()) {
                self.emitted = visible.len();
                events.push(chunk_event(is_thinking, delta, false));
            }
            return false;
        };

        let full = section_text(&body[..end], is_thinking);
        if let Some(rest) = full.get(self.emitted..).filter(|r| !r.is_empty()) {
            events.push(chunk_event(is_thinking, rest, true));
        }
        if is_thinking {
            events.push(EventKind::ThinkingEnd { content: full });
        }

        self.scan_from = self.section_start + end + close.len();
        self.section = Section::Outside;
        true
    }
}

impl StreamConsumer for TaggedDemux {
    fn consume(&mut self, chunk: &str) -> Vec<EventKind> {
        self.raw.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let progressed = match self.section {
                Section::Outside => self.open_next(&mut events),
                Section::Thinking | Section::Message => self.advance(&mut events),
            };
            if !progressed {
                break;
            }
        }

        events
    }

    fn has_started(&self) -> bool {
        self.message_seen
    }

    fn raw(&self) -> &str {
        &self.raw
    }
}

fn chunk_event(is_thinking: bool, text: &str, is_final: bool) -> EventKind {
    if is_thinking {
        EventKind::thinking_chunk(text, is_final)
    } else {
        EventKind::message_chunk(text, is_final)
    }
}

fn section_text(body: &str, is_thinking: bool) -> String {
    if is_thinking {
        body.trim().to_string()
    } else {
        strip_thinking(body).trim().to_string()
    }
}

/// `text` minus a trailing fragment that could still grow into a tag
fn settled(text: &str) -> &str {
    match text.rfind('<') {
        Some(at) => {
            let tail = &text[at..];
            let partial = TAGS
                .iter()
                .any(|tag| tag.len() > tail.len() && tag.starts_with(tail));
            if partial { &text[..at] } else { text }
        }
        None => text,
    }
}

/// Message text with thinking blocks and stray framing tags removed.
/// An unclosed thinking block hides everything after it.
fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find(THINKING_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + THINKING_OPEN.len()..];
        match after.find(THINKING_CLOSE) {
            Some(close) => rest = &after[close + THINKING_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    out.replace(THINKING_CLOSE, "").replace(MESSAGE_OPEN, "")
}

/// The user-facing answer in a finished generation's raw text
pub fn visible_answer(framing: Framing, raw: &str) -> String {
    match framing {
        Framing::Plain => raw.to_string(),
        Framing::Tagged => {
            let body = match raw.find(MESSAGE_OPEN) {
                Some(at) => {
                    let inner = &raw[at + MESSAGE_OPEN.len()..];
                    inner.find(MESSAGE_CLOSE).map_or(inner, |end| &inner[..end])
                }
                None => raw,
            };
            strip_thinking(body).replace(MESSAGE_CLOSE, "").trim().to_string()
        }
    }
}
