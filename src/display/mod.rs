//! Display sink for the conversation view
//!
//! The coordinator only ever pushes to the display; rendering lives behind
//! [`DisplaySink`]. [`ConsoleDisplay`] is the headless implementation used on
//! devices without a screen: it keeps the view model and logs every change.

use crate::messages::SenderKind;
use tracing::{debug, info};

/// Pixels scrolled per button press
pub const DEFAULT_SCROLL_AMOUNT: i32 = 100;

#[derive(Clone, Debug)]
pub struct DisplayConfig {
    pub scroll_amount: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            scroll_amount: DEFAULT_SCROLL_AMOUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Produce-only view of the conversation
pub trait DisplaySink: Send {
    fn append_message(&mut self, text: &str, sender: SenderKind);

    /// Replace the provisional line; empty text clears it
    fn update_partial(&mut self, text: &str);

    fn scroll(&mut self, direction: ScrollDirection, amount: i32);

    fn clear_history(&mut self);
}

/// Headless display that keeps the view model and logs changes
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    lines: Vec<(SenderKind, String)>,
    partial: String,
    scroll_offset: i32,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[(SenderKind, String)] {
        &self.lines
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Distance scrolled up from the newest message
    pub fn scroll_offset(&self) -> i32 {
        self.scroll_offset
    }
}

impl DisplaySink for ConsoleDisplay {
    fn append_message(&mut self, text: &str, sender: SenderKind) {
        info!("[{}] {}", sender.as_wire(), text);
        self.lines.push((sender, text.to_string()));
        // New messages stick to the bottom
        self.scroll_offset = 0;
    }

    fn update_partial(&mut self, text: &str) {
        if text != self.partial {
            debug!("partial: {:?}", text);
            self.partial = text.to_string();
        }
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: i32) {
        let delta = match direction {
            ScrollDirection::Up => amount,
            ScrollDirection::Down => -amount,
        };
        self.scroll_offset = (self.scroll_offset + delta).max(0);
        debug!("scroll offset {}", self.scroll_offset);
    }

    fn clear_history(&mut self) {
        self.lines.clear();
        self.scroll_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_display_view_model() {
        let mut display = ConsoleDisplay::new();
        display.append_message("hi", SenderKind::Peer);
        display.update_partial("hel");
        display.scroll(ScrollDirection::Up, DEFAULT_SCROLL_AMOUNT);
        assert_eq!(display.scroll_offset(), 100);

        display.append_message("hello", SenderKind::User);
        assert_eq!(display.scroll_offset(), 0);
        assert_eq!(display.lines().len(), 2);
        assert_eq!(display.partial(), "hel");

        display.scroll(ScrollDirection::Down, 50);
        assert_eq!(display.scroll_offset(), 0);

        display.clear_history();
        assert!(display.lines().is_empty());
    }
}
