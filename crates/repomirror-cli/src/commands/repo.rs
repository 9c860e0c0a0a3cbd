use super::{open_state, print_json};
use anyhow::Result;
use repomirror_core::config::Config;
use repomirror_query::commit::last_commit_info;
use repomirror_query::stats::get_repo_stats;
use repomirror_state::repositories;
use repomirror_vcs::MirrorStore;

pub fn log(
    config: &Config,
    name: &str,
    reference: Option<&str>,
    offset: usize,
    limit: Option<usize>,
) -> Result<()> {
    let conn = open_state(config)?;
    let store = MirrorStore::from_config(config);
    let info = last_commit_info(
        &conn,
        &store,
        name,
        reference,
        offset,
        limit,
        config.search.max_limit,
    )?;
    print_json(&info)
}

pub fn stats(config: &Config, name: &str) -> Result<()> {
    let conn = open_state(config)?;
    let store = MirrorStore::from_config(config);
    print_json(&get_repo_stats(&conn, &store, name)?)
}

pub fn list(config: &Config) -> Result<()> {
    let conn = open_state(config)?;
    print_json(&repositories::list_repositories(&conn)?)
}
