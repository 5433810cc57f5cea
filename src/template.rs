//! Minimal `{{.Field}}` template expansion.
//!
//! Runner output templates and endpoint templates in the job catalog use the
//! `{{.Field}}` form, which is part of the operator-facing contract, so the
//! expander speaks exactly that syntax and nothing more.

use crate::error::{Error, ErrorCode};

/// Expand every `{{.Name}}` token in `template` against `vars`.
///
/// Unknown field names and unterminated tokens fail; literal text outside of
/// tokens passes through untouched.
pub fn expand(template: &str, vars: &[(&str, &str)]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let end = after_open.find("}}").ok_or_else(|| {
            Error::new(
                ErrorCode::PreExecutionFailure,
                format!("template parsing failed: unterminated token in '{template}'"),
            )
        })?;

        let token = after_open[..end].trim();
        let field = token.strip_prefix('.').ok_or_else(|| {
            Error::new(
                ErrorCode::PreExecutionFailure,
                format!("template parsing failed: expected '.field', got '{token}'"),
            )
        })?;

        let value = vars
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| *value)
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::PreExecutionFailure,
                    format!("template execution failed: unknown field '{field}'"),
                )
            })?;

        out.push_str(value);
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_single_field() {
        let out = expand("Hello, {{.Account}}!", &[("Account", "acct")]).unwrap();
        assert_eq!(out, "Hello, acct!");
    }

    #[test]
    fn expands_multiple_fields() {
        let out = expand(
            "http://api/{{.Account}}/instances/{{.InstanceID}}",
            &[("Account", "a1"), ("InstanceID", "i-123")],
        )
        .unwrap();
        assert_eq!(out, "http://api/a1/instances/i-123");
    }

    #[test]
    fn passes_through_plain_text() {
        assert_eq!(expand("no tokens here", &[]).unwrap(), "no tokens here");
    }

    #[test]
    fn unknown_field_fails() {
        let err = expand("{{.Nope}}", &[("Account", "a")]).unwrap_err();
        assert!(err.is(ErrorCode::PreExecutionFailure));
        assert!(err.message().contains("Nope"));
    }

    #[test]
    fn unterminated_token_fails() {
        let err = expand("{{.Account", &[("Account", "a")]).unwrap_err();
        assert!(err.is(ErrorCode::PreExecutionFailure));
    }

    #[test]
    fn token_without_dot_fails() {
        let err = expand("{{Account}}", &[("Account", "a")]).unwrap_err();
        assert!(err.is(ErrorCode::PreExecutionFailure));
    }

    #[test]
    fn whitespace_inside_token_is_tolerated() {
        let out = expand("{{ .Account }}", &[("Account", "a")]).unwrap();
        assert_eq!(out, "a");
    }
}
