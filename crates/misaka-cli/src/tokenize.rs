//! Splits one REPL input line into command arguments, honoring single and
//! double quoting so values like `set greeting "hello world"` work without
//! a full shell-grammar dependency.

/// Splits `line` into whitespace-separated tokens, treating `'...'` and
/// `"..."` runs as single tokens (quotes themselves are stripped). An
/// unterminated quote consumes to end of line.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            if c == '"' || c == '\'' {
                let quote = c;
                chars.next();
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                    token.push(c);
                }
            } else {
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("set k v"), vec!["set", "k", "v"]);
    }

    #[test]
    fn keeps_quoted_spaces_together() {
        assert_eq!(tokenize(r#"set greeting "hello world""#), vec!["set", "greeting", "hello world"]);
    }

    #[test]
    fn collapses_extra_whitespace() {
        assert_eq!(tokenize("  get   k  "), vec!["get", "k"]);
    }

    #[test]
    fn empty_line_yields_no_tokens() {
        assert!(tokenize("   ").is_empty());
    }
}
