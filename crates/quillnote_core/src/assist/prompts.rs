//! Prompt catalog for assist actions.
//!
//! Pure lookup: action key in, `(prompt, system_message)` out.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Assist actions offered in the context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Elaborate,
    Concise,
    Polish,
    Grammar,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Elaborate,
        ActionKind::Concise,
        ActionKind::Polish,
        ActionKind::Grammar,
    ];

    /// Stable wire key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Elaborate => "explain",
            Self::Concise => "concise",
            Self::Polish => "improve",
            Self::Grammar => "grammar",
        }
    }

    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Elaborate => "Elaborate",
            Self::Concise => "Make Concise",
            Self::Polish => "Polish Writing",
            Self::Grammar => "Check Grammar",
        }
    }

    /// Accepts wire keys plus the `elaborate`/`summarize`/`polish` aliases.
    pub fn parse(key: &str) -> Result<Self, UnknownActionError> {
        match key.trim().to_ascii_lowercase().as_str() {
            "explain" | "elaborate" => Ok(Self::Elaborate),
            "concise" | "summarize" => Ok(Self::Concise),
            "improve" | "polish" => Ok(Self::Polish),
            "grammar" => Ok(Self::Grammar),
            _ => Err(UnknownActionError(key.to_string())),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown assist action `{0}`")]
pub struct UnknownActionError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub prompt: String,
    pub system_message: String,
}

const SYSTEM_BASE: &str = "You are a writing assistant inside a note-taking app. \
Reply with the rewritten text only, formatted as Markdown, without preamble.";

/// Builds the prompt pair for `kind`.
pub fn build(kind: ActionKind, source_text: &str) -> Prompt {
    let (instruction, focus) = match kind {
        ActionKind::Elaborate => (
            "Please elaborate on the following text with more details and examples:",
            "Expand the ideas while keeping the author's voice.",
        ),
        ActionKind::Concise => (
            "Please make the following text more concise while maintaining its key points:",
            "Remove redundancy; never add new facts.",
        ),
        ActionKind::Polish => (
            "Please improve and polish the following text to make it more professional and engaging:",
            "Improve flow and word choice; keep the meaning unchanged.",
        ),
        ActionKind::Grammar => (
            "Please correct the grammar, spelling and punctuation of the following text:",
            "Fix errors only; do not restructure sentences that are already correct.",
        ),
    };
    Prompt {
        prompt: format!("{instruction}\n{source_text}"),
        system_message: format!("{SYSTEM_BASE} {focus}"),
    }
}

/// Builds a prompt from a raw action key.
pub fn build_for_key(key: &str, source_text: &str) -> Result<Prompt, UnknownActionError> {
    ActionKind::parse(key).map(|kind| build(kind, source_text))
}

#[cfg(test)]
mod tests {
    use super::{build, build_for_key, ActionKind, UnknownActionError};

    #[test]
    fn every_action_round_trips_through_its_key() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.key()), Ok(kind));
        }
        assert_eq!("summarize".parse::<ActionKind>(), Ok(ActionKind::Concise));
    }

    #[test]
    fn prompt_embeds_source_text() {
        let prompt = build(ActionKind::Concise, "it was good");
        assert!(prompt.prompt.ends_with("\nit was good"));
        assert!(prompt.system_message.contains("Markdown"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert_eq!(
            build_for_key("search", "x"),
            Err(UnknownActionError("search".to_string()))
        );
    }
}
