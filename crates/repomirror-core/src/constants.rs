/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".repomirror";

/// Global config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// SQLite database file name.
pub const STATE_DB_FILE: &str = "state.db";

/// Mirror root directory name inside the data directory.
pub const MIRRORS_DIR: &str = "mirrors";

/// Suffix appended to every mirror directory.
pub const MIRROR_DIR_SUFFIX: &str = ".git";

/// Current schema version for SQLite tables.
pub const SCHEMA_VERSION: u32 = 2;

/// Maximum file size to index (1MB).
pub const MAX_FILE_SIZE: u64 = 1_048_576;

/// Maximum number of extracted names kept per kind (imports, functions, classes).
pub const MAX_ITEMS_PER_KIND: usize = 50;

/// Maximum length of the per-file search text blob, in characters.
pub const MAX_SEARCH_TEXT_CHARS: usize = 4_000;

/// Default result limit for queries.
pub const DEFAULT_LIMIT: usize = 50;

/// Hard upper bound on results a single query may request.
pub const MAX_LIMIT: usize = 500;

/// Default page size for commit file listings.
pub const DEFAULT_COMMIT_FILES_LIMIT: usize = 100;

/// Remote name used by mirrors created with `git clone --mirror`.
pub const MIRROR_REMOTE: &str = "origin";

/// Branch names preferred when several candidates exist.
pub const PREFERRED_BRANCHES: [&str; 2] = ["main", "master"];

/// Username paired with the access token in the `Authorization: Basic` header.
pub const TOKEN_USERNAME: &str = "x-access-token";

/// Replacement text for masked credentials.
pub const REDACTED: &str = "***";
