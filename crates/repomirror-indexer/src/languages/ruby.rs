use super::{SymbolCollector, each_capture};
use regex::Regex;
use std::sync::LazyLock;

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*require(?:_relative)?[ \t]*\(?[ \t]*['"]([^'"\n]+)['"]"#)
        .expect("ruby require regex must compile")
});
static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*def[ \t]+(?:self\.)?([A-Za-z_]\w*[?!=]?)")
        .expect("ruby def regex must compile")
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:class|module)[ \t]+([A-Z]\w*(?:::[A-Z]\w*)*)")
        .expect("ruby class regex must compile")
});

pub(crate) fn extract(source: &str, out: &mut SymbolCollector) {
    each_capture(&REQUIRE_RE, source, |name| out.import(name));
    each_capture(&DEF_RE, source, |name| out.function(name));
    each_capture(&CLASS_RE, source, |name| out.class(name));
}

#[cfg(test)]
mod tests {
    use crate::languages::Extractor;

    #[test]
    fn extracts_ruby_symbols() {
        let source = r#"
require 'json'
require_relative "lib/helper"

module Billing
  class Invoice::Line < Base
    def self.build(attrs); end
    def paid?; end
  end
end
"#;
        let symbols = Extractor::Ruby.extract(source, 50);
        assert_eq!(symbols.imports, vec!["json", "lib/helper"]);
        assert_eq!(symbols.functions, vec!["build", "paid?"]);
        assert_eq!(symbols.classes, vec!["Billing", "Invoice::Line"]);
    }
}
