use globset::{Glob, GlobSet, GlobSetBuilder};
use std::sync::OnceLock;

/// Directory names whose contents are never indexed, at any depth.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "jspm_packages",
    "vendor",
    "third_party",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".tox",
    ".venv",
    "venv",
    ".eggs",
    "target",
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    ".next",
    ".nuxt",
    ".svelte-kit",
    ".gradle",
    ".idea",
    ".vscode",
    "coverage",
    ".nyc_output",
    ".terraform",
    ".cache",
];

/// Binary, media, archive and compiled-artifact extensions.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "o", "a", "lib", "obj", "wasm", "pyc", "pyo", "class", "jar",
    "war", "ear", "bin", "dat", "db", "sqlite", "sqlite3", "png", "jpg", "jpeg", "gif", "bmp",
    "ico", "icns", "svg", "webp", "tiff", "psd", "mp3", "mp4", "wav", "ogg", "flac", "avi",
    "mov", "mkv", "webm", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "tar", "gz",
    "tgz", "bz2", "xz", "7z", "rar", "zst", "woff", "woff2", "ttf", "otf", "eot", "map", "lock",
    "pem", "key", "p12", "keystore",
];

const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "Gemfile.lock",
    "poetry.lock",
    "Pipfile.lock",
    "composer.lock",
    "go.sum",
    "mix.lock",
    "pubspec.lock",
    "flake.lock",
];

/// Generated or minified files, matched against the full path.
const EXCLUDED_PATTERNS: &[&str] = &[
    "**/*.min.js",
    "**/*.min.css",
    "**/*.bundle.js",
    "**/*.chunk.js",
    "**/*.generated.*",
    "**/*_generated.rs",
    "**/*.pb.go",
    "**/*_pb2.py",
    "**/*_pb2_grpc.py",
    "**/*.snap",
];

/// Extensionless or dot-named files worth indexing.
const ALLOWED_FILENAMES: &[&str] = &[
    "Dockerfile",
    "Containerfile",
    "Makefile",
    "GNUmakefile",
    "makefile",
    "Rakefile",
    "Gemfile",
    "Procfile",
    "Jenkinsfile",
    "Vagrantfile",
    "Brewfile",
    "Justfile",
    "justfile",
    "CODEOWNERS",
    "LICENSE",
    "README",
    ".gitignore",
    ".gitattributes",
    ".dockerignore",
    ".editorconfig",
    ".env.example",
];

/// Source, config and documentation extensions that are indexed.
const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "rs", "go", "java", "kt",
    "kts", "scala", "groovy", "gradle", "rb", "php", "c", "h", "cc", "cpp", "cxx", "hpp", "hh",
    "cs", "fs", "swift", "m", "mm", "sh", "bash", "zsh", "ps1", "sql", "html", "htm", "css",
    "scss", "sass", "less", "vue", "svelte", "lua", "ex", "exs", "erl", "hrl", "hs", "clj",
    "dart", "r", "jl", "pl", "pm", "proto", "graphql", "tf", "hcl", "nix", "md", "markdown",
    "rst", "txt", "json", "yaml", "yml", "toml", "xml", "ini", "cfg", "conf", "properties",
    "cmake", "mk", "dockerfile",
];

/// Whether a repository-relative path qualifies for indexing.
pub fn should_index(path: &str) -> bool {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return false;
    }
    let mut segments = path.split('/').collect::<Vec<_>>();
    let Some(filename) = segments.pop() else {
        return false;
    };
    if segments.iter().any(|dir| EXCLUDED_DIRS.contains(dir)) {
        return false;
    }
    if LOCKFILES.contains(&filename) || excluded_globset().is_match(path) {
        return false;
    }
    if ALLOWED_FILENAMES.contains(&filename) {
        return true;
    }

    let Some((stem, extension)) = filename.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() {
        return false;
    }
    let extension = extension.to_ascii_lowercase();
    if EXCLUDED_EXTENSIONS.contains(&extension.as_str()) {
        return false;
    }
    SOURCE_EXTENSIONS.contains(&extension.as_str())
}

fn excluded_globset() -> &'static GlobSet {
    static SET: OnceLock<GlobSet> = OnceLock::new();
    SET.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for pattern in EXCLUDED_PATTERNS {
            builder.add(Glob::new(pattern).expect("excluded glob pattern must be valid"));
        }
        builder
            .build()
            .expect("excluded glob set must build successfully")
    })
}
