use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+(?:static[ \t]+)?([\w.]+(?:\.\*)?)[ \t]*;")
        .expect("java import regex must compile")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:(?:public|protected|private|abstract|final|static|sealed|non-sealed)[ \t]+)*(?:class|interface|enum|record|@interface)[ \t]+([A-Za-z_]\w*)")
        .expect("java type regex must compile")
});
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:@\w+[ \t]+)*(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)[ \t]+)+(?:<[^>\n]+>[ \t]+)?[\w<>\[\],.?]+[ \t]+([A-Za-z_]\w*)[ \t]*\(")
        .expect("java method regex must compile")
});

pub(crate) fn extract(source: &str, out: &mut SymbolCollector) {
    each_capture(&IMPORT_RE, source, |name| out.import(name));
    each_capture(&METHOD_RE, source, |name| out.function(name));
    each_capture(&TYPE_RE, source, |name| out.class(name));
}
