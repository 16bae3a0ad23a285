use std::path::Path;

use anyhow::{Context, Result};

use crate::error::EvalError;

/// Fill `{name}` placeholders in a prompt template.
///
/// `{{` and `}}` are literal braces. Unknown or malformed placeholders are
/// errors rather than being left in the prompt.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> Result<String, EvalError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(EvalError::Template(format!(
                                "unterminated placeholder '{{{}'",
                                name
                            )))
                        }
                    }
                }
                let value = values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| EvalError::Template(format!("unknown placeholder '{{{}}}'", name)))?;
                rendered.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '}' => {
                return Err(EvalError::Template("single '}' encountered in template".to_string()));
            }
            c => rendered.push(c),
        }
    }

    Ok(rendered)
}

pub fn read_prompt_template(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(EvalError::MissingFile(path.to_path_buf()).into());
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt template {}", path.display()))
}

/// Make an identifier safe to use as a single path component.
pub fn sanitize_file_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Percent-encode path separators so distinct ids never share a file name.
pub fn encode_file_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            _ => encoded.push(c),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_named_placeholders() {
        let rendered = render_template(
            "Context: {context}\nAnswer: {answer}",
            &[("context", "A"), ("answer", "B")],
        )
        .unwrap();
        assert_eq!(rendered, "Context: A\nAnswer: B");
    }

    #[test]
    fn test_render_escaped_braces() {
        let rendered = render_template("{{\"doc\": \"{context}\"}}", &[("context", "x")]).unwrap();
        assert_eq!(rendered, "{\"doc\": \"x\"}");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let rendered = render_template("{context}", &[("context", "{answer}")]).unwrap();
        assert_eq!(rendered, "{answer}");
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        assert!(render_template("{question}", &[("context", "x")]).is_err());
    }

    #[test]
    fn test_malformed_template_fails() {
        assert!(render_template("{context", &[("context", "x")]).is_err());
        assert!(render_template("oops }", &[]).is_err());
    }

    #[test]
    fn test_missing_template_file() {
        let err = read_prompt_template(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("abisee/cnn_dailymail"), "abisee_cnn_dailymail");
    }

    #[test]
    fn test_encode_file_name_keeps_ids_distinct() {
        assert_eq!(encode_file_name("a/b"), "a%2Fb");
        assert_eq!(encode_file_name("a_b"), "a_b");
        assert_eq!(encode_file_name("a%2Fb"), "a%252Fb");
        assert_eq!(encode_file_name(r"a\b"), "a%5Cb");
    }
}
