use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static USE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)\n]*\))?[ \t]+)?use[ \t]+((?:::)?[A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)")
        .expect("rust use regex must compile")
});
static EXTERN_CRATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*extern[ \t]+crate[ \t]+([A-Za-z_]\w*)")
        .expect("rust extern crate regex must compile")
});
static FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:pub(?:\([^)\n]*\))?[ \t]+)?(?:default[ \t]+)?(?:const[ \t]+)?(?:async[ \t]+)?(?:unsafe[ \t]+)?(?:extern[ \t]+(?:"[^"\n]*"[ \t]+)?)?fn[ \t]+([A-Za-z_]\w*)"#)
        .expect("rust fn regex must compile")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)\n]*\))?[ \t]+)?(?:unsafe[ \t]+)?(?:struct|enum|trait|union|type)[ \t]+([A-Za-z_]\w*)")
        .expect("rust type regex must compile")
});

pub(crate) fn extract(source: &str, out: &mut SymbolCollector) {
    each_capture(&USE_RE, source, |path| out.import(path.trim_start_matches("::")));
    each_capture(&EXTERN_CRATE_RE, source, |name| out.import(name));
    each_capture(&FN_RE, source, |name| out.function(name));
    each_capture(&TYPE_RE, source, |name| out.class(name));
}
