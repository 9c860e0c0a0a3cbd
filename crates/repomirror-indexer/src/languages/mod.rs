//! Lexical import/function/class extraction, one extractor per language.
//!
//! These are line-oriented regex scans. They are approximate by nature and only
//! feed search ranking; nothing downstream relies on them being complete.

pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod ruby;
pub mod rust;

use regex::Regex;

/// Names pulled out of one source file, deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols {
    pub imports: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
}

/// Extractor selected by detected language. Unknown languages get [`Extractor::Noop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    Ruby,
    Noop,
}

impl Extractor {
    pub fn for_language(language: Option<&str>) -> Self {
        match language {
            Some("python") => Self::Python,
            Some("javascript") => Self::JavaScript,
            Some("typescript") => Self::TypeScript,
            Some("rust") => Self::Rust,
            Some("go") => Self::Go,
            Some("java") => Self::Java,
            Some("ruby") => Self::Ruby,
            _ => Self::Noop,
        }
    }

    /// Extract at most `max_items` names of each kind.
    pub fn extract(self, source: &str, max_items: usize) -> Symbols {
        let mut out = SymbolCollector::new(max_items);
        match self {
            Self::Python => python::extract(source, &mut out),
            Self::JavaScript => javascript::extract(source, false, &mut out),
            Self::TypeScript => javascript::extract(source, true, &mut out),
            Self::Rust => rust::extract(source, &mut out),
            Self::Go => go::extract(source, &mut out),
            Self::Java => java::extract(source, &mut out),
            Self::Ruby => ruby::extract(source, &mut out),
            Self::Noop => {}
        }
        out.finish()
    }
}

/// Capped, deduplicating accumulator shared by the language modules.
pub struct SymbolCollector {
    max_items: usize,
    symbols: Symbols,
}

impl SymbolCollector {
    fn new(max_items: usize) -> Self {
        Self {
            max_items,
            symbols: Symbols::default(),
        }
    }

    pub fn import(&mut self, name: &str) {
        push_capped(&mut self.symbols.imports, name, self.max_items);
    }

    pub fn function(&mut self, name: &str) {
        push_capped(&mut self.symbols.functions, name, self.max_items);
    }

    pub fn class(&mut self, name: &str) {
        push_capped(&mut self.symbols.classes, name, self.max_items);
    }

    fn finish(self) -> Symbols {
        self.symbols
    }
}

fn push_capped(items: &mut Vec<String>, name: &str, max_items: usize) {
    let name = name.trim();
    if name.is_empty() || items.len() >= max_items || items.iter().any(|item| item == name) {
        return;
    }
    items.push(name.to_string());
}

/// Feed capture group 1 of every match of `re` to `sink`.
pub(crate) fn each_capture(re: &Regex, source: &str, mut sink: impl FnMut(&str)) {
    for caps in re.captures_iter(source) {
        if let Some(name) = caps.get(1) {
            sink(name.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_extracts_nothing() {
        let symbols = Extractor::for_language(Some("markdown")).extract("def x(): pass", 10);
        assert_eq!(symbols, Symbols::default());
        assert_eq!(Extractor::for_language(None), Extractor::Noop);
    }

    #[test]
    fn collector_dedupes_and_caps() {
        let mut out = SymbolCollector::new(2);
        out.function("a");
        out.function("a");
        out.function("b");
        out.function("c");
        out.import("  ");
        let symbols = out.finish();
        assert_eq!(symbols.functions, vec!["a", "b"]);
        assert!(symbols.imports.is_empty());
    }
}
