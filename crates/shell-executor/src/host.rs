//! Hooks into the host application's UI
//!
//! The engine never draws anything itself. Progress bars, color markup and
//! input prompts belong to the host, which plugs them in through these traits.

use regex::{Captures, Regex};

use crate::event::RequestId;

/// Receives progress updates for requests launched with `with_progress`
pub trait ProgressSink {
    /// Show or update progress for a request.
    ///
    /// `fraction` is in `0.0..1.0`. Return true if the user asked to cancel;
    /// the answer is only honored when `cancelable` is true.
    fn report(
        &self,
        request: RequestId,
        title: &str,
        message: &str,
        fraction: f32,
        cancelable: bool,
    ) -> bool;

    /// The request finished; drop its progress entry
    fn remove(&self, request: RequestId);

    /// Clear the modal progress bar, if the host shows one
    fn clear(&self) {}
}

/// Rewrites a log line before it reaches the diagnostic log
pub trait ColorTranslator {
    /// Translate one line
    fn translate(&self, text: &str) -> String;
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl ColorTranslator for PlainText {
    fn translate(&self, text: &str) -> String {
        text.to_string()
    }
}

const SGR_PATTERN: &str = r"\x1b\[(\d+;)?(\d+;)?(\d+)m";

const FOREGROUND: [&str; 8] = [
    "#000000", // black
    "#FF0000", // red
    "#00FF00", // green
    "#FFFF00", // yellow
    "#0000FF", // blue
    "#FF00FF", // magenta
    "#00FFFF", // cyan
    "#FFFFFF", // white
];

/// Turns ANSI foreground colors into `<color=#RRGGBB>` markup
///
/// Codes 30 to 37 open a color, 0 and 39 close it. Any other escape sequence
/// is left as it is.
#[derive(Debug, Clone)]
pub struct AnsiColorMarkup {
    pattern: Regex,
}

impl AnsiColorMarkup {
    /// Create the translator
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(SGR_PATTERN).expect("SGR pattern is valid"),
        }
    }
}

impl Default for AnsiColorMarkup {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorTranslator for AnsiColorMarkup {
    fn translate(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                match caps[3].parse::<usize>() {
                    Ok(0) | Ok(39) => "</color>".to_string(),
                    Ok(code @ 30..=37) => format!("<color={}>", FOREGROUND[code - 30]),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// A modal single-line prompt
pub trait Prompt {
    /// Ask the user for a line of text, calling `on_submit` with the answer
    fn show(&self, prompt: &str, on_submit: Box<dyn FnOnce(String)>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_identity() {
        assert_eq!(PlainText.translate("\x1b[31mred\x1b[0m"), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn test_ansi_colors_become_markup() {
        let markup = AnsiColorMarkup::new();
        assert_eq!(
            markup.translate("\x1b[31merror\x1b[0m ok"),
            "<color=#FF0000>error</color> ok"
        );
        assert_eq!(markup.translate("\x1b[1;32mbold green\x1b[39m"), "<color=#00FF00>bold green</color>");
    }

    #[test]
    fn test_unknown_codes_are_kept() {
        let markup = AnsiColorMarkup::new();
        assert_eq!(markup.translate("\x1b[4munder"), "\x1b[4munder");
    }
}
