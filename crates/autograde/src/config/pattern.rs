//! Placeholder expansion for naming patterns
//!
//! Patterns such as `{candidate}_hw_{problem:02}.cpp` are expanded by
//! substituting named values. A `:0N` spec pads the value with leading zeros
//! to width N, a plain `:N` spec pads with leading spaces. Unknown
//! placeholders and unbalanced braces are kept literally.

/// Expand `{name}` and `{name:spec}` placeholders in `pattern`
pub fn expand_pattern(pattern: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &after[..end];
        match substitute(inner, vars) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(inner);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn substitute(inner: &str, vars: &[(&str, &str)]) -> Option<String> {
    let (name, spec) = match inner.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (inner, None),
    };
    let value = vars.iter().find(|(key, _)| *key == name).map(|(_, v)| *v)?;

    let Some(spec) = spec else {
        return Some(value.to_owned());
    };
    let width: usize = spec.parse().ok()?;
    if spec.starts_with('0') {
        Some(format!("{value:0>width$}"))
    } else {
        Some(format!("{value:>width$}"))
    }
}

/// Whether `pattern` references the placeholder `name`
pub fn has_placeholder(pattern: &str, name: &str) -> bool {
    pattern.contains(&format!("{{{name}}}")) || pattern.contains(&format!("{{{name}:"))
}
