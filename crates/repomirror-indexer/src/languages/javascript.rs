use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:import|export)[ \t]+(?:type[ \t]+)?(?:[\w*{}\s,$]+?[ \t]+from[ \t]+)?['"]([^'"\n]+)['"]"#)
        .expect("js import regex must compile")
});
static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:require|import)\(\s*['"]([^'"\n]+)['"]\s*\)"#)
        .expect("js require regex must compile")
});
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)")
        .expect("js function regex must compile")
});
static ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)(?:[ \t]*:[^=\n]+)?[ \t]*=[ \t]*(?:async[ \t]+)?(?:\([^)\n]*\)|[A-Za-z_$][\w$]*)(?:[ \t]*:[^=\n]+)?[ \t]*=>")
        .expect("js arrow regex must compile")
});
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]+(?:(?:public|private|protected|static|async|readonly)[ \t]+)*([A-Za-z_$][\w$]*)[ \t]*\([^)\n]*\)[ \t]*(?::[^{\n]+)?\{")
        .expect("js method regex must compile")
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?class[ \t]+([A-Za-z_$][\w$]*)")
        .expect("js class regex must compile")
});
static TS_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?(?:interface|enum|type)[ \t]+([A-Za-z_$][\w$]*)")
        .expect("ts type regex must compile")
});

const NOT_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "function", "return"];

pub(crate) fn extract(source: &str, typescript: bool, out: &mut SymbolCollector) {
    each_capture(&IMPORT_FROM_RE, source, |module| out.import(module));
    each_capture(&REQUIRE_RE, source, |module| out.import(module));
    each_capture(&FUNCTION_RE, source, |name| out.function(name));
    each_capture(&ARROW_RE, source, |name| out.function(name));
    each_capture(&METHOD_RE, source, |name| {
        if !NOT_METHODS.contains(&name) {
            out.function(name);
        }
    });
    each_capture(&CLASS_RE, source, |name| out.class(name));
    if typescript {
        each_capture(&TS_TYPE_RE, source, |name| out.class(name));
    }
}
