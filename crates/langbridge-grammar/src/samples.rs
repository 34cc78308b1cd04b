//! Built-in sample grammar packs.

use crate::tables::{
    AutoClosingPair, Bracket, CommentRule, Grammar, GrammarState, LanguageConfiguration,
    LanguagePack, TokenRule,
};

/// A compact XML grammar: tags, attributes, CDATA, comments, entities.
pub fn xml_pack() -> LanguagePack {
    let root = GrammarState {
        name: "root".to_string(),
        rules: vec![
            TokenRule::token(r"[^<&]+", ""),
            TokenRule::include("@whitespace"),
            TokenRule::Match {
                pattern: r"(<)([\w\.\-:]+)".to_string(),
                token: "tag".to_string(),
                next: Some("@tag".to_string()),
                bracket: Some(Bracket::Open),
            },
            TokenRule::Match {
                pattern: r"(</)([\w\.\-:]+)(\s*)(>)".to_string(),
                token: "tag".to_string(),
                next: None,
                bracket: Some(Bracket::Close),
            },
            TokenRule::push(r"<!\[CDATA\[", "delimiter.cdata", "@cdata"),
            TokenRule::token(r"&\w+;", "string.escape"),
        ],
    };

    let cdata = GrammarState {
        name: "cdata".to_string(),
        rules: vec![
            TokenRule::token(r"[^\]]+", ""),
            TokenRule::Match {
                pattern: r"\]\]>".to_string(),
                token: "delimiter.cdata".to_string(),
                next: Some("@pop".to_string()),
                bracket: Some(Bracket::Close),
            },
            TokenRule::token(r"\]", ""),
        ],
    };

    let tag = GrammarState {
        name: "tag".to_string(),
        rules: vec![
            TokenRule::token(r"[ \t\r\n]+", ""),
            TokenRule::token(
                r#"([\w\.\-:]+)(\s*=\s*)("[^"]*"|'[^']*')"#,
                "attribute.value",
            ),
            TokenRule::token(r"[\w\.\-:]+", "attribute.name"),
            TokenRule::push(r"/?>", "delimiter.start", "@pop"),
        ],
    };

    let whitespace = GrammarState {
        name: "whitespace".to_string(),
        rules: vec![
            TokenRule::token(r"[ \t\r\n]+", ""),
            TokenRule::push(r"<!--", "comment", "@comment"),
        ],
    };

    let comment = GrammarState {
        name: "comment".to_string(),
        rules: vec![
            TokenRule::token(r"[^<\-]+", "comment.content"),
            TokenRule::push(r"-->", "comment", "@pop"),
            TokenRule::token(r"[<\-]", "comment.content"),
        ],
    };

    LanguagePack {
        grammar: Grammar {
            default_token: String::new(),
            token_postfix: ".xml".to_string(),
            ignore_case: true,
            states: vec![root, cdata, tag, whitespace, comment],
        },
        configuration: LanguageConfiguration {
            comments: CommentRule {
                line: None,
                block: Some(("<!--".to_string(), "-->".to_string())),
            },
            brackets: vec![
                ("{".to_string(), "}".to_string()),
                ("[".to_string(), "]".to_string()),
                ("(".to_string(), ")".to_string()),
                ("<".to_string(), ">".to_string()),
            ],
            auto_closing_pairs: vec![
                AutoClosingPair {
                    open: "'".to_string(),
                    close: "'".to_string(),
                    not_in: vec!["string".to_string(), "comment".to_string()],
                },
                AutoClosingPair {
                    open: "\"".to_string(),
                    close: "\"".to_string(),
                    not_in: vec!["string".to_string(), "comment".to_string()],
                },
            ],
            word_pattern: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_pack_is_well_formed() {
        let pack = xml_pack();
        assert_eq!(pack.grammar.states[0].name, "root");
        assert!(pack.grammar.state("comment").is_some());

        // Every state transition target exists (or is the pop marker).
        for state in &pack.grammar.states {
            for rule in &state.rules {
                if let TokenRule::Match {
                    next: Some(next), ..
                } = rule
                {
                    if next != "@pop" {
                        let name = next.trim_start_matches('@');
                        assert!(pack.grammar.state(name).is_some(), "missing state {next}");
                    }
                }
            }
        }
    }
}
