/// Canonicalize a single command line.
///
/// Trims the line, lowercases the verb, folds verb aliases onto their
/// canonical verb and drops a trailing `:` after the verb (`click: #a`).
/// Arguments are left untouched so quoted text keeps its spacing.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let (first, rest) = match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim_start()),
        None => (trimmed, ""),
    };

    let lower_first = first.trim_end_matches(':').to_lowercase();
    let verb = canonical_verb(&lower_first);

    if rest.is_empty() {
        verb.to_string()
    } else {
        format!("{} {}", verb, rest)
    }
}

fn canonical_verb(verb: &str) -> &str {
    match verb {
        "goto" | "navigate" | "nav" => "navto",
        "select" => "focus",
        "scrollto" => "scroll",
        "getattribute" => "getattr",
        "getcomputedstyle" => "getstyle",
        "executejs" => "exec",
        "waitforselector" => "waitforelement",
        "toast" => "showtoast",
        other => other,
    }
}

/// Splits the verb off a normalized line.
pub fn verb_of(normalized: &str) -> &str {
    normalized
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

/// Whether a script line carries no command.
pub(crate) fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_aliases() {
        assert_eq!(normalize("goto https://a.test"), "navto https://a.test");
        assert_eq!(normalize("  Navigate   https://a.test "), "navto https://a.test");
        assert_eq!(normalize("select #name"), "focus #name");
        assert_eq!(normalize("Toast \"hi\""), "showtoast \"hi\"");
        assert_eq!(normalize("ScrollTo #btn"), "scroll #btn");
        assert_eq!(normalize("executejs 2+2"), "exec 2+2");
    }

    #[test]
    fn test_colon_after_verb() {
        assert_eq!(normalize("click: #btn"), "click #btn");
    }

    #[test]
    fn test_arguments_keep_spacing() {
        assert_eq!(
            normalize("TYPE #field \"two  spaces\""),
            "type #field \"two  spaces\""
        );
    }

    #[test]
    fn test_comment_lines() {
        assert!(is_blank_or_comment("   "));
        assert!(is_blank_or_comment("# login steps"));
        assert!(!is_blank_or_comment("click #btn"));
    }
}
