//! Rule-table data model.
//!
//! A grammar is a set of named lexer states, each a list of rules tried in
//! order. A rule either includes another state or matches a pattern and
//! yields a token, optionally switching state. Patterns are uninterpreted
//! strings; whatever dialect the host lexer engine speaks passes through
//! unchanged.

use serde::{Deserialize, Serialize};

/// Whether a matched token opens or closes a bracket pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bracket {
    Open,
    Close,
}

/// One entry in a lexer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenRule {
    /// Splice in all rules of another state
    Include { include: String },
    /// Match a pattern and emit a token
    Match {
        pattern: String,
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bracket: Option<Bracket>,
    },
}

impl TokenRule {
    pub fn include(state: impl Into<String>) -> Self {
        TokenRule::Include {
            include: state.into(),
        }
    }

    pub fn token(pattern: impl Into<String>, token: impl Into<String>) -> Self {
        TokenRule::Match {
            pattern: pattern.into(),
            token: token.into(),
            next: None,
            bracket: None,
        }
    }

    pub fn push(
        pattern: impl Into<String>,
        token: impl Into<String>,
        next: impl Into<String>,
    ) -> Self {
        TokenRule::Match {
            pattern: pattern.into(),
            token: token.into(),
            next: Some(next.into()),
            bracket: None,
        }
    }
}

/// A named lexer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarState {
    pub name: String,
    pub rules: Vec<TokenRule>,
}

/// A complete declarative grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Token emitted when no rule matches
    pub default_token: String,
    /// Suffix appended to every emitted token name
    pub token_postfix: String,
    pub ignore_case: bool,
    /// The first state is the root state
    pub states: Vec<GrammarState>,
}

impl Grammar {
    /// Looks up a state by name.
    pub fn state(&self, name: &str) -> Option<&GrammarState> {
        self.states.iter().find(|state| state.name == name)
    }
}

/// Line/block comment delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommentRule {
    pub line: Option<String>,
    pub block: Option<(String, String)>,
}

/// An auto-closing pair with the token contexts it is suppressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoClosingPair {
    pub open: String,
    pub close: String,
    #[serde(default)]
    pub not_in: Vec<String>,
}

/// Rich-edit behavior for a language: brackets, pairs, comments, words.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LanguageConfiguration {
    pub comments: CommentRule,
    pub brackets: Vec<(String, String)>,
    pub auto_closing_pairs: Vec<AutoClosingPair>,
    pub word_pattern: Option<String>,
}

/// Everything a language contributes once actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePack {
    pub grammar: Grammar,
    pub configuration: LanguageConfiguration,
}
