use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([\w.]+(?:[ \t]+as[ \t]+\w+)?(?:[ \t]*,[ \t]*[\w.]+(?:[ \t]+as[ \t]+\w+)?)*)")
        .expect("python import regex must compile")
});
static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+(\.*[\w.]*)[ \t]+import\b")
        .expect("python from-import regex must compile")
});
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)[ \t]*\(")
        .expect("python def regex must compile")
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*class[ \t]+([A-Za-z_]\w*)").expect("python class regex must compile")
});

pub(crate) fn extract(source: &str, out: &mut SymbolCollector) {
    each_capture(&IMPORT_RE, source, |names| {
        for name in names.split(',') {
            let module = name.split_whitespace().next().unwrap_or_default();
            out.import(module);
        }
    });
    each_capture(&FROM_IMPORT_RE, source, |module| out.import(module));
    each_capture(&FUNCTION_RE, source, |name| out.function(name));
    each_capture(&CLASS_RE, source, |name| out.class(name));
}
