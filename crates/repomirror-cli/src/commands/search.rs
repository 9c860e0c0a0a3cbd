use super::{open_state, print_json};
use anyhow::{Result, anyhow};
use repomirror_core::config::Config;
use repomirror_query::search::{SearchMode, SearchRequest, search};
use repomirror_vcs::MirrorStore;

pub struct SearchArgs<'a> {
    pub name: &'a str,
    pub query: &'a str,
    pub mode: &'a str,
    pub glob: Option<&'a str>,
    pub lang: Option<&'a str>,
    pub case_sensitive: bool,
    pub reference: Option<&'a str>,
    pub limit: Option<usize>,
}

pub fn run(config: &Config, args: SearchArgs<'_>) -> Result<()> {
    let mode = SearchMode::parse(args.mode).ok_or_else(|| {
        anyhow!(
            "Unknown search mode '{}': expected content, filename, function or class",
            args.mode
        )
    })?;
    let conn = open_state(config)?;
    let store = MirrorStore::from_config(config);
    let request = SearchRequest {
        repo: args.name,
        query: args.query,
        mode,
        file_glob: args.glob,
        language: args.lang,
        case_sensitive: args.case_sensitive,
        reference: args.reference,
        limit: args.limit,
    };
    let response = search(&conn, &store, &config.search, &request)?;
    if response.truncated {
        eprintln!(
            "Showing the first {} results; raise --limit for more",
            response.results.len()
        );
    }
    print_json(&response)
}
