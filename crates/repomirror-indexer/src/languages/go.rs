use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static SINGLE_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import[ \t]+(?:[\w.]+[ \t]+)?"([^"\n]+)""#)
        .expect("go import regex must compile")
});
static IMPORT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*import[ \t]*\((.*?)\)").expect("go import block regex must compile")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]+)""#).expect("go quoted path regex must compile"));
static FUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^func[ \t]+(?:\([^)\n]*\)[ \t]*)?([A-Za-z_]\w*)")
        .expect("go func regex must compile")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*type[ \t]+([A-Za-z_]\w*)(?:\[[^\]\n]*\])?[ \t]+(?:struct|interface)\b")
        .expect("go type regex must compile")
});

pub(crate) fn extract(source: &str, out: &mut SymbolCollector) {
    each_capture(&SINGLE_IMPORT_RE, source, |path| out.import(path));
    each_capture(&IMPORT_BLOCK_RE, source, |block| {
        each_capture(&QUOTED_RE, block, |path| out.import(path));
    });
    each_capture(&FUNC_RE, source, |name| out.function(name));
    each_capture(&TYPE_RE, source, |name| out.class(name));
}
