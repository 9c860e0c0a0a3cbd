//! Default-branch and revision resolution as ordered chains of resolvers.

use crate::store::Mirror;
use repomirror_core::constants::{MIRROR_REMOTE, PREFERRED_BRANCHES};
use repomirror_core::error::VcsError;
use tracing::debug;

/// Read-only ref queries a resolver needs. Implemented by [`Mirror`]; tests
/// substitute an in-memory table.
pub trait RefLookup {
    /// Target of the symbolic `HEAD`, e.g. `refs/heads/main`.
    fn symbolic_head(&self) -> Result<Option<String>, VcsError>;

    /// Target of a symbolic ref other than HEAD, e.g. `refs/remotes/origin/HEAD`.
    fn symbolic_ref(&self, name: &str) -> Result<Option<String>, VcsError>;

    /// Full ref names under `prefix`, sorted.
    fn ref_names(&self, prefix: &str) -> Result<Vec<String>, VcsError>;

    /// Commit id `rev` points at, if it resolves.
    fn resolve_commit(&self, rev: &str) -> Result<Option<String>, VcsError>;
}

/// One step in a fallback chain.
pub trait RefResolver {
    fn name(&self) -> &'static str;
    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError>;
}

/// Run `chain` in order and return the first answer.
pub fn first_resolved(
    chain: &[Box<dyn RefResolver>],
    refs: &dyn RefLookup,
) -> Result<Option<String>, VcsError> {
    for resolver in chain {
        if let Some(found) = resolver.resolve(refs)? {
            debug!(resolver = resolver.name(), resolved = %found, "Ref resolved");
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Branch the mirror's symbolic HEAD points at, if that branch exists.
pub struct SymbolicHead;

/// Branch named by `refs/remotes/origin/HEAD`, if it exists.
pub struct RemoteHead;

/// First remote-tracking branch, preferring `main` then `master`.
pub struct RemoteTrackingBranch;

/// First local branch, preferring `main` then `master`.
pub struct LocalBranch;

impl RefResolver for SymbolicHead {
    fn name(&self) -> &'static str {
        "symbolic_head"
    }

    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
        let Some(target) = refs.symbolic_head()? else {
            return Ok(None);
        };
        verified_branch(refs, &target, "refs/heads/")
    }
}

impl RefResolver for RemoteHead {
    fn name(&self) -> &'static str {
        "remote_head"
    }

    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
        let Some(target) = refs.symbolic_ref(&format!("refs/remotes/{MIRROR_REMOTE}/HEAD"))? else {
            return Ok(None);
        };
        verified_branch(refs, &target, &format!("refs/remotes/{MIRROR_REMOTE}/"))
    }
}

impl RefResolver for RemoteTrackingBranch {
    fn name(&self) -> &'static str {
        "remote_tracking_branch"
    }

    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
        let prefix = format!("refs/remotes/{MIRROR_REMOTE}/");
        let branches = refs
            .ref_names(&prefix)?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
            .filter(|name| name != "HEAD")
            .collect::<Vec<_>>();
        pick_verified(refs, &branches, &prefix)
    }
}

impl RefResolver for LocalBranch {
    fn name(&self) -> &'static str {
        "local_branch"
    }

    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
        let branches = refs
            .ref_names("refs/heads/")?
            .into_iter()
            .filter_map(|name| name.strip_prefix("refs/heads/").map(str::to_string))
            .collect::<Vec<_>>();
        pick_verified(refs, &branches, "refs/heads/")
    }
}

fn verified_branch(
    refs: &dyn RefLookup,
    target: &str,
    prefix: &str,
) -> Result<Option<String>, VcsError> {
    let Some(branch) = target.strip_prefix(prefix) else {
        return Ok(None);
    };
    if branch.is_empty() || refs.resolve_commit(target)?.is_none() {
        return Ok(None);
    }
    Ok(Some(branch.to_string()))
}

fn pick_verified(
    refs: &dyn RefLookup,
    branches: &[String],
    prefix: &str,
) -> Result<Option<String>, VcsError> {
    let mut ordered: Vec<&str> = PREFERRED_BRANCHES
        .iter()
        .copied()
        .filter(|wanted| branches.iter().any(|branch| branch == wanted))
        .collect();
    ordered.extend(
        branches
            .iter()
            .map(String::as_str)
            .filter(|branch| !PREFERRED_BRANCHES.contains(branch)),
    );
    for branch in ordered {
        if refs.resolve_commit(&format!("{prefix}{branch}"))?.is_some() {
            return Ok(Some(branch.to_string()));
        }
    }
    Ok(None)
}

/// Resolves one candidate spelling of a branch to a commit id.
pub struct RevisionCandidate {
    label: &'static str,
    rev: String,
}

impl RefResolver for RevisionCandidate {
    fn name(&self) -> &'static str {
        self.label
    }

    fn resolve(&self, refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
        refs.resolve_commit(&self.rev)
    }
}

pub fn default_branch_chain() -> Vec<Box<dyn RefResolver>> {
    vec![
        Box::new(SymbolicHead),
        Box::new(RemoteHead),
        Box::new(RemoteTrackingBranch),
        Box::new(LocalBranch),
    ]
}

/// Local branch ref, bare ref, remote-tracking ref, the name verbatim, then `HEAD`.
pub fn revision_chain(branch: &str) -> Vec<Box<dyn RefResolver>> {
    let candidate = |label: &'static str, rev: String| -> Box<dyn RefResolver> {
        Box::new(RevisionCandidate { label, rev })
    };
    vec![
        candidate("local_branch_ref", format!("refs/heads/{branch}")),
        candidate("bare_ref", format!("heads/{branch}")),
        candidate(
            "remote_tracking_ref",
            format!("refs/remotes/{MIRROR_REMOTE}/{branch}"),
        ),
        candidate("verbatim", branch.to_string()),
        candidate("head", "HEAD".to_string()),
    ]
}

pub fn resolve_default_branch(refs: &dyn RefLookup) -> Result<Option<String>, VcsError> {
    first_resolved(&default_branch_chain(), refs)
}

/// Concrete commit id for `branch`. Never returns a symbolic name.
pub fn resolve_revision(refs: &dyn RefLookup, branch: &str) -> Result<Option<String>, VcsError> {
    if branch.is_empty() || branch.starts_with('-') || branch.contains(char::is_whitespace) {
        return refs.resolve_commit("HEAD").map(only_object_ids);
    }
    first_resolved(&revision_chain(branch), refs).map(only_object_ids)
}

fn only_object_ids(found: Option<String>) -> Option<String> {
    found.filter(|id| is_object_id(id))
}

/// Full-length hex object id (SHA-1 or SHA-256).
pub fn is_object_id(value: &str) -> bool {
    matches!(value.len(), 40 | 64) && value.bytes().all(|b| b.is_ascii_hexdigit())
}

impl RefLookup for Mirror {
    fn symbolic_head(&self) -> Result<Option<String>, VcsError> {
        self.symbolic_ref("HEAD")
    }

    fn symbolic_ref(&self, name: &str) -> Result<Option<String>, VcsError> {
        let output = self.git_unchecked(&["symbolic-ref", "--quiet", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        let target = output.stdout_lossy().trim().to_string();
        Ok((!target.is_empty()).then_some(target))
    }

    fn ref_names(&self, prefix: &str) -> Result<Vec<String>, VcsError> {
        let output = self.git(&["for-each-ref", "--format=%(refname)", "--sort=refname", prefix])?;
        Ok(output
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn resolve_commit(&self, rev: &str) -> Result<Option<String>, VcsError> {
        if rev.is_empty() || rev.starts_with('-') {
            return Ok(None);
        }
        let spec = format!("{rev}^{{commit}}");
        let output = self.git_unchecked(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        let id = output.stdout_lossy().trim().to_string();
        Ok(is_object_id(&id).then_some(id))
    }
}

impl Mirror {
    pub fn default_branch(&self) -> Result<Option<String>, VcsError> {
        resolve_default_branch(self)
    }

    pub fn resolve_revision(&self, branch: &str) -> Result<Option<String>, VcsError> {
        resolve_revision(self, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeRefs {
        head: Option<String>,
        symbolic: BTreeMap<String, String>,
        refs: BTreeMap<String, String>,
    }

    impl FakeRefs {
        fn with_ref(mut self, name: &str, id: char) -> Self {
            self.refs.insert(name.to_string(), id.to_string().repeat(40));
            self
        }
    }

    impl RefLookup for FakeRefs {
        fn symbolic_head(&self) -> Result<Option<String>, VcsError> {
            Ok(self.head.clone())
        }

        fn symbolic_ref(&self, name: &str) -> Result<Option<String>, VcsError> {
            Ok(self.symbolic.get(name).cloned())
        }

        fn ref_names(&self, prefix: &str) -> Result<Vec<String>, VcsError> {
            Ok(self
                .refs
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        }

        fn resolve_commit(&self, rev: &str) -> Result<Option<String>, VcsError> {
            if rev == "HEAD" {
                return Ok(self
                    .head
                    .as_ref()
                    .and_then(|target| self.refs.get(target).cloned()));
            }
            Ok(self.refs.get(rev).cloned())
        }
    }

    #[test]
    fn symbolic_head_wins_when_it_resolves() {
        let refs = FakeRefs {
            head: Some("refs/heads/trunk".into()),
            ..FakeRefs::default()
        }
        .with_ref("refs/heads/trunk", 'a')
        .with_ref("refs/heads/main", 'b');
        assert_eq!(resolve_default_branch(&refs).unwrap().as_deref(), Some("trunk"));
    }

    #[test]
    fn stale_symbolic_head_falls_through_to_preferred_branch() {
        let refs = FakeRefs {
            head: Some("refs/heads/deleted".into()),
            ..FakeRefs::default()
        }
        .with_ref("refs/heads/alpha", 'a')
        .with_ref("refs/heads/master", 'b');
        assert_eq!(resolve_default_branch(&refs).unwrap().as_deref(), Some("master"));
    }

    #[test]
    fn remote_head_and_tracking_branches_are_consulted_in_order() {
        let mut refs = FakeRefs::default()
            .with_ref("refs/remotes/origin/dev", 'a')
            .with_ref("refs/remotes/origin/main", 'b');
        refs.symbolic.insert(
            "refs/remotes/origin/HEAD".into(),
            "refs/remotes/origin/dev".into(),
        );
        assert_eq!(resolve_default_branch(&refs).unwrap().as_deref(), Some("dev"));

        refs.symbolic.clear();
        assert_eq!(resolve_default_branch(&refs).unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn no_branches_resolves_to_none() {
        assert_eq!(resolve_default_branch(&FakeRefs::default()).unwrap(), None);
    }

    #[test]
    fn revision_chain_prefers_local_branch_then_falls_back_to_head() {
        let refs = FakeRefs {
            head: Some("refs/heads/main".into()),
            ..FakeRefs::default()
        }
        .with_ref("refs/heads/main", 'a')
        .with_ref("refs/remotes/origin/feature", 'c');

        assert_eq!(resolve_revision(&refs, "main").unwrap(), Some("a".repeat(40)));
        assert_eq!(resolve_revision(&refs, "feature").unwrap(), Some("c".repeat(40)));
        assert_eq!(resolve_revision(&refs, "missing").unwrap(), Some("a".repeat(40)));
        assert_eq!(resolve_revision(&refs, "").unwrap(), Some("a".repeat(40)));
    }

    #[test]
    fn symbolic_tokens_are_never_returned_as_revisions() {
        let mut refs = FakeRefs::default();
        refs.refs.insert("refs/heads/main".into(), "HEAD".into());
        assert_eq!(resolve_revision(&refs, "main").unwrap(), None);
    }

    #[test]
    fn object_id_shape() {
        assert!(is_object_id(&"a".repeat(40)));
        assert!(is_object_id(&"0".repeat(64)));
        assert!(!is_object_id("HEAD"));
        assert!(!is_object_id(&"g".repeat(40)));
        assert!(!is_object_id("abc123"));
    }
}
