//! The reference analysis engine.
//!
//! A deliberately small, dependency-free analyzer: it indexes identifiers
//! across every source it can see (mirrored documents plus extra sources)
//! and answers all feature requests from that index with plain string
//! scans. Real language analyzers plug in behind [`crate::AnalysisWorker`];
//! this one exists to exercise the orchestration layer end to end.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use langbridge_host::{
    ColorInformation, CompletionItem, DocumentHighlight, DocumentLink, DocumentSymbol,
    DocumentUri, FoldingRange, Hover, MarkerSeverity, SelectionRange, TextEdit,
};

use crate::proxy::{Diagnostic, DiagnosticClass, ResourceState, StructuralOptions, WorkerInit};

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte ranges of every identifier in `text`, in document order.
fn identifier_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if !is_ident_start(c) {
            chars.next();
            continue;
        }
        let mut end = start + c.len_utf8();
        chars.next();
        while let Some(&(i, d)) = chars.peek() {
            if !is_ident_char(d) {
                break;
            }
            end = i + d.len_utf8();
            chars.next();
        }
        ranges.push((start, end));
    }
    ranges
}

fn clamp_to_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// The word whose range contains or ends at `offset`.
fn word_at(text: &str, offset: usize) -> Option<(usize, usize)> {
    let offset = clamp_to_char_boundary(text, offset);
    identifier_ranges(text)
        .into_iter()
        .find(|&(start, end)| start <= offset && offset <= end)
}

/// Word-index analysis over a set of sources.
pub struct WordIndexEngine {
    options: StructuralOptions,
    extra_sources: BTreeMap<String, String>,
    resources: HashMap<DocumentUri, ResourceState>,
}

impl WordIndexEngine {
    pub fn new(init: WorkerInit) -> Self {
        Self {
            options: init.structural,
            extra_sources: init.extra_sources,
            resources: HashMap::new(),
        }
    }

    /// Replaces mirrored document states.
    pub fn sync(&mut self, resources: Vec<ResourceState>) {
        for resource in resources {
            self.resources.insert(resource.uri.clone(), resource);
        }
    }

    /// Drops mirrored documents; their identifiers stop contributing.
    pub fn remove(&mut self, uris: &[DocumentUri]) {
        for uri in uris {
            self.resources.remove(uri);
        }
    }

    fn text_of(&self, uri: &DocumentUri) -> Option<&str> {
        self.resources.get(uri).map(|resource| resource.text.as_str())
    }

    /// All visible sources: extra sources first, then mirrored documents.
    fn sources(&self) -> impl Iterator<Item = &str> {
        self.extra_sources
            .values()
            .map(String::as_str)
            .chain(self.resources.values().map(|resource| resource.text.as_str()))
    }

    fn words_match(&self, a: &str, b: &str) -> bool {
        if self.options.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    fn matches_prefix(&self, word: &str, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        if self.options.case_sensitive {
            word.starts_with(prefix)
        } else {
            word.to_ascii_lowercase()
                .starts_with(&prefix.to_ascii_lowercase())
        }
    }

    /// Occurrences of `word` within `text`, by whole-identifier comparison.
    fn occurrences_in(&self, text: &str, word: &str) -> Vec<(usize, usize)> {
        identifier_ranges(text)
            .into_iter()
            .filter(|&(start, end)| self.words_match(&text[start..end], word))
            .collect()
    }

    /// Declarations in `text`: identifier following a declaration keyword.
    fn declarations_in<'t>(&self, text: &'t str) -> Vec<(&'t str, usize, usize)> {
        let keywords = &self.options.declaration_keywords;
        let mut declarations = Vec::new();
        let mut line_start = 0;
        for line in text.split_inclusive('\n') {
            let words = identifier_ranges(line);
            let mut is_declaration_line = false;
            for (i, &(start, end)) in words.iter().enumerate() {
                let word = &line[start..end];
                let is_keyword = keywords.iter().any(|k| self.words_match(k, word));
                if i == 0 {
                    is_declaration_line = is_keyword;
                    continue;
                }
                if is_declaration_line && !is_keyword {
                    declarations.push((
                        &text[line_start + start..line_start + end],
                        line_start + start,
                        line_start + end,
                    ));
                    break;
                }
            }
            line_start += line.len();
        }
        declarations
    }

    pub fn completions(&self, uri: &DocumentUri, offset: usize) -> Vec<CompletionItem> {
        let prefix = self
            .text_of(uri)
            .and_then(|text| {
                word_at(text, offset).map(|(start, _)| {
                    let offset = clamp_to_char_boundary(text, offset);
                    text[start..offset.max(start)].to_string()
                })
            })
            .unwrap_or_default();

        let mut labels = BTreeSet::new();
        for text in self.sources() {
            for (start, end) in identifier_ranges(text) {
                let word = &text[start..end];
                if word.chars().count() < self.options.min_identifier_len {
                    continue;
                }
                if self.matches_prefix(word, &prefix) {
                    labels.insert(word.to_string());
                }
            }
        }

        labels
            .into_iter()
            .map(|label| CompletionItem {
                label,
                detail: Some("identifier".to_string()),
            })
            .collect()
    }

    pub fn hover(&self, uri: &DocumentUri, offset: usize) -> Option<Hover> {
        let text = self.text_of(uri)?;
        let (start, end) = word_at(text, offset)?;
        let word = &text[start..end];

        let count: usize = self
            .sources()
            .map(|source| self.occurrences_in(source, word).len())
            .sum();

        Some(Hover {
            contents: format!("`{word}`: {count} occurrence(s)"),
            start,
            end,
        })
    }

    pub fn document_highlights(&self, uri: &DocumentUri, offset: usize) -> Vec<DocumentHighlight> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let Some((start, end)) = word_at(text, offset) else {
            return Vec::new();
        };
        let word = text[start..end].to_string();
        self.occurrences_in(text, &word)
            .into_iter()
            .map(|(start, end)| DocumentHighlight { start, end })
            .collect()
    }

    pub fn links(&self, uri: &DocumentUri) -> Vec<DocumentLink> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let mut links = Vec::new();
        for (index, _) in text.match_indices("http") {
            let rest = &text[index..];
            if !rest.starts_with("http://") && !rest.starts_with("https://") {
                continue;
            }
            let len = rest
                .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | ')' | '`'))
                .unwrap_or(rest.len());
            links.push(DocumentLink {
                start: index,
                end: index + len,
                target: rest[..len].to_string(),
            });
        }
        links
    }

    pub fn document_symbols(&self, uri: &DocumentUri) -> Vec<DocumentSymbol> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        self.declarations_in(text)
            .into_iter()
            .map(|(name, start, end)| DocumentSymbol {
                name: name.to_string(),
                start,
                end,
            })
            .collect()
    }

    pub fn rename_edits(&self, uri: &DocumentUri, offset: usize, new_name: &str) -> Vec<TextEdit> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let Some((start, end)) = word_at(text, offset) else {
            return Vec::new();
        };
        let word = text[start..end].to_string();
        self.occurrences_in(text, &word)
            .into_iter()
            .map(|(start, end)| TextEdit {
                start,
                end,
                new_text: new_name.to_string(),
            })
            .collect()
    }

    pub fn folding_ranges(&self, uri: &DocumentUri) -> Vec<FoldingRange> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let mut ranges = Vec::new();
        let mut stack = Vec::new();
        let mut line = 0usize;
        for c in text.chars() {
            match c {
                '\n' => line += 1,
                '{' => stack.push(line),
                '}' => {
                    if let Some(start_line) = stack.pop() {
                        if line > start_line {
                            ranges.push(FoldingRange {
                                start_line,
                                end_line: line,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        ranges.sort_by_key(|range| range.start_line);
        ranges
    }

    pub fn selection_ranges(&self, uri: &DocumentUri, offsets: &[usize]) -> Vec<SelectionRange> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        offsets
            .iter()
            .map(|&offset| {
                let offset = clamp_to_char_boundary(text, offset);
                let mut ranges = Vec::new();
                if let Some(word) = word_at(text, offset) {
                    ranges.push(word);
                }

                let line_start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
                let line_end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);
                ranges.push((line_start, line_end));
                ranges.push((0, text.len()));
                ranges.dedup();
                SelectionRange { ranges }
            })
            .collect()
    }

    pub fn formatting_edits(&self, uri: &DocumentUri) -> Vec<TextEdit> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let mut edits = Vec::new();
        let mut line_start = 0;
        for line in text.split_inclusive('\n') {
            let content = line.strip_suffix('\n').unwrap_or(line);
            let content = content.strip_suffix('\r').unwrap_or(content);
            let trimmed_len = content.trim_end().len();
            if trimmed_len < content.len() {
                edits.push(TextEdit {
                    start: line_start + trimmed_len,
                    end: line_start + content.len(),
                    new_text: String::new(),
                });
            }
            line_start += line.len();
        }
        if !text.is_empty() && !text.ends_with('\n') {
            edits.push(TextEdit {
                start: text.len(),
                end: text.len(),
                new_text: "\n".to_string(),
            });
        }
        edits
    }

    pub fn colors(&self, uri: &DocumentUri) -> Vec<ColorInformation> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let mut colors = Vec::new();
        for (index, _) in text.match_indices('#') {
            let hex = &text.as_bytes()[index + 1..];
            if hex.len() < 6 || !hex[..6].iter().all(u8::is_ascii_hexdigit) {
                continue;
            }
            // Longer hex runs are not a 6-digit color literal.
            if hex.len() > 6 && hex[6].is_ascii_hexdigit() {
                continue;
            }
            let channel = |i: usize| {
                u8::from_str_radix(&text[index + 1 + i..index + 3 + i], 16).unwrap_or(0)
            };
            colors.push(ColorInformation {
                start: index,
                end: index + 7,
                red: channel(0),
                green: channel(2),
                blue: channel(4),
            });
        }
        colors
    }

    pub fn diagnostics(&self, uri: &DocumentUri) -> Vec<Diagnostic> {
        let Some(text) = self.text_of(uri) else {
            return Vec::new();
        };
        let mut diagnostics = self.syntax_diagnostics(text);
        diagnostics.extend(self.semantic_diagnostics(text));
        diagnostics.truncate(self.options.max_diagnostics);
        diagnostics
    }

    /// Unbalanced bracket detection.
    fn syntax_diagnostics(&self, text: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut stack: Vec<(usize, char)> = Vec::new();
        for (index, c) in text.char_indices() {
            match c {
                '(' | '[' | '{' => stack.push((index, c)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.last() {
                        Some(&(_, open)) if open == expected => {
                            stack.pop();
                        }
                        // A non-matching opener stays on the stack and is
                        // reported as unclosed at the end.
                        _ => diagnostics.push(Diagnostic {
                            class: DiagnosticClass::Syntax,
                            severity: MarkerSeverity::Error,
                            message: format!("Unmatched '{c}'"),
                            start: index,
                            end: index + c.len_utf8(),
                        }),
                    }
                }
                _ => {}
            }
        }
        for (index, open) in stack {
            diagnostics.push(Diagnostic {
                class: DiagnosticClass::Syntax,
                severity: MarkerSeverity::Error,
                message: format!("Unclosed '{open}'"),
                start: index,
                end: index + open.len_utf8(),
            });
        }
        diagnostics
    }

    /// Duplicate-declaration detection.
    fn semantic_diagnostics(&self, text: &str) -> Vec<Diagnostic> {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for (name, start, end) in self.declarations_in(text) {
            let key = if self.options.case_sensitive {
                name.to_string()
            } else {
                name.to_ascii_lowercase()
            };
            let count = seen.entry(key).or_insert(0);
            *count += 1;
            if *count > 1 {
                diagnostics.push(Diagnostic {
                    class: DiagnosticClass::Semantic,
                    severity: MarkerSeverity::Warning,
                    message: format!("Duplicate declaration of `{name}`"),
                    start,
                    end,
                });
            }
        }
        diagnostics
    }
}
