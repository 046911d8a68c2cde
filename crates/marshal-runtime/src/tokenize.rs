//! Shell-like splitting of a command line into tokens.
//!
//! - whitespace separates tokens
//! - single quotes keep their content literally
//! - double quotes allow `\` escapes
//! - `""` and `''` produce an empty token

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unterminated {quote} quote")]
    UnterminatedQuote { quote: char },

    #[error("trailing escape character")]
    TrailingEscape,
}

/// Splits `line` into tokens.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Set once the current token has started, so quoted empties survive.
    let mut started = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in line.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => escape_next = true,
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                started = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                started = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            _ => {
                current.push(ch);
                started = true;
            }
        }
    }

    if escape_next {
        return Err(TokenizeError::TrailingEscape);
    }
    if in_single_quote {
        return Err(TokenizeError::UnterminatedQuote { quote: '\'' });
    }
    if in_double_quote {
        return Err(TokenizeError::UnterminatedQuote { quote: '"' });
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(tokenize("math add 3 4").unwrap(), vec!["math", "add", "3", "4"]);
    }

    #[test]
    fn test_tokenize_quoted() {
        assert_eq!(
            tokenize(r#"say "hello world" 'and you'"#).unwrap(),
            vec!["say", "hello world", "and you"]
        );
        assert_eq!(
            tokenize(r#"cmd "double's quote" 'single"s quote'"#).unwrap(),
            vec!["cmd", "double's quote", r#"single"s quote"#]
        );
    }

    #[test]
    fn test_tokenize_escapes_and_empties() {
        assert_eq!(
            tokenize(r#"echo "a \"b\"" '' x"#).unwrap(),
            vec!["echo", r#"a "b""#, "", "x"]
        );
        assert_eq!(tokenize(r"path 'C:\dir'").unwrap(), vec!["path", r"C:\dir"]);
    }

    #[test]
    fn test_tokenize_adjacent_quotes_join() {
        assert_eq!(tokenize(r#"a"b c"d"#).unwrap(), vec!["ab cd"]);
    }

    #[test]
    fn test_tokenize_blank() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("  \t  ").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(
            tokenize("say 'oops").unwrap_err(),
            TokenizeError::UnterminatedQuote { quote: '\'' }
        );
        assert_eq!(
            tokenize(r#"say "oops"#).unwrap_err(),
            TokenizeError::UnterminatedQuote { quote: '"' }
        );
        assert_eq!(tokenize(r#"say "x\"#).unwrap_err(), TokenizeError::TrailingEscape);
    }
}
