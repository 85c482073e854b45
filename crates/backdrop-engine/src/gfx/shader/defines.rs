use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Preprocessor definitions injected into both stages of a program.
///
/// Keys are macro names, values their replacement text. Emitted in key order.
pub type Defines = BTreeMap<String, String>;

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#[ \t]*version[ \t]+.*$")
        .unwrap_or_else(|err| unreachable!("version directive pattern is valid: {err}"))
});

/// `#define NAME VALUE` lines for every entry, each newline-terminated.
pub fn defines_code(defines: &Defines) -> String {
    defines
        .iter()
        .map(|(name, value)| format!("#define {name} {value}\n"))
        .collect()
}

/// Inserts `defines_code` right after the `#version` directive, which must stay
/// the first statement of the source. Sources without one get the code prepended.
pub fn insert_defines(source: &str, defines_code: &str) -> String {
    if defines_code.is_empty() {
        return source.to_string();
    }
    match VERSION_LINE.find(source) {
        Some(version) => {
            let (head, tail) = source.split_at(version.end());
            let mut out = String::with_capacity(source.len() + defines_code.len() + 1);
            out.push_str(head);
            out.push('\n');
            out.push_str(defines_code);
            out.push_str(tail);
            out
        }
        None => format!("{defines_code}{source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(pairs: &[(&str, &str)]) -> Defines {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn injects_after_version_line() {
        let code = defines_code(&defines(&[("USE_FOO", "1")]));
        assert_eq!(
            insert_defines("#version 300 es\nvoid main(){}", &code),
            "#version 300 es\n#define USE_FOO 1\n\nvoid main(){}"
        );
    }

    #[test]
    fn only_the_first_version_line_counts() {
        let code = defines_code(&defines(&[("A", "2")]));
        let out = insert_defines("  # version 300 es\n#version 100\nvoid main(){}", &code);
        assert_eq!(out, "  # version 300 es\n#define A 2\n\n#version 100\nvoid main(){}");
        assert_eq!(out.matches("#define").count(), 1);
    }

    #[test]
    fn prepends_without_version_line() {
        let code = defines_code(&defines(&[("B", "x"), ("A", "y")]));
        assert_eq!(code, "#define A y\n#define B x\n");
        assert_eq!(
            insert_defines("precision mediump float;\nvoid main(){}", &code),
            "#define A y\n#define B x\nprecision mediump float;\nvoid main(){}"
        );
    }

    #[test]
    fn version_inside_a_line_is_not_a_directive() {
        let code = defines_code(&defines(&[("A", "1")]));
        let out = insert_defines("// see #version 300 es\nvoid main(){}", &code);
        assert!(out.starts_with("#define A 1\n"));
    }

    #[test]
    fn empty_defines_leave_source_untouched() {
        let source = "#version 300 es\nvoid main(){}";
        assert_eq!(insert_defines(source, &defines_code(&Defines::new())), source);
    }
}
