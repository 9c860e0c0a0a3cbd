use super::{open_state, print_json};
use anyhow::{Context, Result};
use repomirror_core::config::Config;
use repomirror_indexer::IndexLimits;
use repomirror_indexer::import::initial_import;
use repomirror_indexer::sync_incremental::{DeltaOutcome, delta_sync};
use repomirror_vcs::MirrorStore;
use repomirror_vcs::validate::{validate_ref, validate_repo_name, validate_url};
use std::time::Instant;

pub fn run_import(config: &Config, name: &str, url: &str) -> Result<()> {
    validate_repo_name(name)?;
    validate_url(url)?;
    let mut conn = open_state(config)?;
    let store = MirrorStore::from_config(config);
    let limits = IndexLimits::from(&config.index);

    eprintln!("Importing {} ...", name);
    let start = Instant::now();
    let outcome = initial_import(&mut conn, &store, &limits, url, name)
        .with_context(|| format!("Import of '{}' failed", name))?;
    eprintln!(
        "Imported {} at {} in {:.1}s: {} indexed, {} skipped, {} errors",
        name,
        outcome.commit,
        start.elapsed().as_secs_f64(),
        outcome.stats.files_indexed,
        outcome.stats.files_skipped,
        outcome.stats.errors,
    );
    print_json(&outcome)
}

pub fn run_sync(config: &Config, name: &str, rev: &str, old_rev: Option<&str>) -> Result<()> {
    validate_repo_name(name)?;
    validate_ref(rev)?;
    if let Some(old) = old_rev {
        validate_ref(old)?;
    }
    let mut conn = open_state(config)?;
    let store = MirrorStore::from_config(config);
    let limits = IndexLimits::from(&config.index);

    let outcome = delta_sync(&mut conn, &store, &limits, name, rev, old_rev)
        .with_context(|| format!("Sync of '{}' failed", name))?;
    match &outcome {
        DeltaOutcome::UpToDate { commit, .. } => {
            eprintln!("{} is up to date at {}", name, commit);
        }
        DeltaOutcome::Synced {
            old_rev,
            new_rev,
            stats,
            ..
        } => {
            eprintln!(
                "Synced {} {}..{}: {} indexed, {} removed, {} renamed, {} skipped",
                name,
                old_rev,
                new_rev,
                stats.files_indexed,
                stats.files_removed,
                stats.files_renamed,
                stats.files_skipped,
            );
        }
    }
    print_json(&outcome)
}
