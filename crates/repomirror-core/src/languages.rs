/// Languages with a dedicated lexical extractor in the indexer.
pub const EXTRACTABLE_LANGUAGES: [&str; 7] = [
    "python",
    "javascript",
    "typescript",
    "rust",
    "go",
    "java",
    "ruby",
];

/// Returns true if the indexer can pull imports/functions/classes out of this language.
pub fn is_extractable_language(language: &str) -> bool {
    EXTRACTABLE_LANGUAGES.contains(&language)
}

/// Detect language from file extension (without the leading dot) and return
/// the canonical language label.
pub fn detect_language_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "py" | "pyi" => Some("python"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "ts" | "tsx" | "mts" | "cts" => Some("typescript"),
        "rs" => Some("rust"),
        "go" => Some("go"),
        "java" => Some("java"),
        "kt" | "kts" => Some("kotlin"),
        "scala" => Some("scala"),
        "rb" => Some("ruby"),
        "php" => Some("php"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Some("cpp"),
        "cs" => Some("csharp"),
        "swift" => Some("swift"),
        "m" | "mm" => Some("objective-c"),
        "sh" | "bash" | "zsh" => Some("shell"),
        "sql" => Some("sql"),
        "html" | "htm" => Some("html"),
        "css" | "scss" | "sass" | "less" => Some("css"),
        "vue" => Some("vue"),
        "svelte" => Some("svelte"),
        "lua" => Some("lua"),
        "ex" | "exs" => Some("elixir"),
        "erl" => Some("erlang"),
        "hs" => Some("haskell"),
        "dart" => Some("dart"),
        "r" => Some("r"),
        "pl" | "pm" => Some("perl"),
        "proto" => Some("protobuf"),
        "md" | "markdown" | "rst" => Some("markdown"),
        "json" => Some("json"),
        "yaml" | "yml" => Some("yaml"),
        "toml" => Some("toml"),
        "xml" => Some("xml"),
        "ini" | "cfg" | "conf" => Some("config"),
        "txt" => Some("text"),
        _ => None,
    }
}

/// Detect the language for a repository-relative path, handling well-known
/// extensionless filenames before falling back to the extension.
pub fn detect_language_for_path(path: &str) -> Option<&'static str> {
    let filename = path.rsplit('/').next().unwrap_or(path);
    match filename {
        "Dockerfile" | "Containerfile" => return Some("dockerfile"),
        "Makefile" | "GNUmakefile" | "makefile" => return Some("makefile"),
        "Rakefile" | "Gemfile" => return Some("ruby"),
        "Jenkinsfile" => return Some("groovy"),
        "Procfile" | "CODEOWNERS" | "LICENSE" => return Some("text"),
        _ => {}
    }
    let (_, ext) = filename.rsplit_once('.')?;
    detect_language_from_extension(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_source_extensions() {
        assert_eq!(detect_language_from_extension("py"), Some("python"));
        assert_eq!(detect_language_from_extension("TSX"), Some("typescript"));
        assert_eq!(detect_language_from_extension("rs"), Some("rust"));
        assert_eq!(detect_language_from_extension("exe"), None);
    }

    #[test]
    fn detects_extensionless_well_known_files() {
        assert_eq!(detect_language_for_path("Dockerfile"), Some("dockerfile"));
        assert_eq!(detect_language_for_path("build/Makefile"), Some("makefile"));
        assert_eq!(detect_language_for_path("src/app/main.go"), Some("go"));
        assert_eq!(detect_language_for_path("README"), None);
    }

    #[test]
    fn extractable_set_is_a_subset_of_detected_languages() {
        for language in EXTRACTABLE_LANGUAGES {
            assert!(is_extractable_language(language));
        }
        assert!(!is_extractable_language("markdown"));
    }
}
