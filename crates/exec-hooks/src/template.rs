use std::collections::HashMap;

/// Escape a string for safe shell usage by wrapping it in single quotes.
///
/// Internal single quotes are escaped as `'\''` (end quote, escaped quote,
/// start quote).
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Substitute `{key}` template variables in `template`, shell-escaping each
/// substituted value. Unrecognized or unterminated placeholders are left
/// as-is; already-substituted content is never re-scanned.
pub fn substitute_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            result.push(ch);
            continue;
        }

        let mut key = String::new();
        let mut found_close = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                found_close = true;
                break;
            }
            key.push(inner);
        }

        if !found_close {
            result.push('{');
            result.push_str(&key);
            continue;
        }

        match variables.get(&key) {
            Some(value) => result.push_str(&shell_escape(value)),
            None => {
                result.push('{');
                result.push_str(&key);
                result.push('}');
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn substitutes_known_variables() {
        let mut vars = HashMap::new();
        vars.insert("session_id".to_string(), "abc 123".to_string());
        let out = substitute_variables("echo {session_id}", &vars);
        assert_eq!(out, "echo 'abc 123'");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let vars = HashMap::new();
        let out = substitute_variables("echo {unknown}", &vars);
        assert_eq!(out, "echo {unknown}");
    }

    #[test]
    fn leaves_unterminated_brace_untouched() {
        let vars = HashMap::new();
        let out = substitute_variables("echo {oops", &vars);
        assert_eq!(out, "echo {oops");
    }

    #[test]
    fn does_not_rescan_substituted_content() {
        let mut vars = HashMap::new();
        vars.insert("payload".to_string(), "{injected}".to_string());
        vars.insert("injected".to_string(), "pwned".to_string());
        let out = substitute_variables("run {payload}", &vars);
        assert_eq!(out, "run '{injected}'");
    }
}
