//! Routing of free-form messages once commands and pending follow-ups have
//! had their turn.

use crate::handlers::menu::MenuAction;

pub const DRAW_KEYWORDS: [&str; 3] = ["нарисуй", "изобрази", "сгенерируй"];
pub const REDRAW_KEYWORDS: [&str; 3] = ["перерисуй", "в стиле", "сделай как"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Menu(MenuAction),
    Draw,
    Redraw,
    Dialogue,
    PhotoWithoutTask,
}

impl Intent {
    /// Handler name used in timing logs.
    pub fn label(self) -> &'static str {
        match self {
            Intent::Menu(_) => "menu",
            Intent::Draw => "draw",
            Intent::Redraw => "redraw",
            Intent::Dialogue => "dialogue",
            Intent::PhotoWithoutTask => "photo_hint",
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|keyword| lowered.contains(keyword))
}

/// `text` is the message text, or the caption when the message is a photo.
/// Menu labels must match exactly once surrounding whitespace is trimmed;
/// keywords match anywhere, ignoring case.
pub fn classify(text: &str, has_photo: bool) -> Intent {
    let text = text.trim();
    if has_photo {
        return if contains_any(text, &REDRAW_KEYWORDS) {
            Intent::Redraw
        } else {
            Intent::PhotoWithoutTask
        };
    }

    if let Some(action) = MenuAction::from_label(text) {
        return Intent::Menu(action);
    }
    if contains_any(text, &DRAW_KEYWORDS) {
        return Intent::Draw;
    }
    Intent::Dialogue
}
