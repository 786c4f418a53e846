//! Log-body redaction (spec.md §9): masking by field name alone isn't
//! enough, since a secret can end up embedded inside an unrelated string
//! field (`config_dump`, an error message echoing a request URL, ...). This
//! wraps the `tracing_subscriber::fmt` writer rather than adding a `Layer`,
//! because layers each see the same event independently and can't edit what
//! a sibling `fmt` layer renders; the writer sees the final formatted bytes,
//! so both the field-name and message-body cases are handled in one place.
//!
//! Hand-rolled scanning, no `regex` dependency, matching `config::substitute_env_vars`.

use std::io;
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use super::mask_secret;

const CREDENTIAL_FIELD_PATTERNS: &[&str] = &["api_key", "api_secret", "password", "token"];

fn is_credential_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CREDENTIAL_FIELD_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Returns the `key=value` token's value slice and how many bytes of `s`
/// (starting right after `=`) it occupies. A quoted value runs to the next
/// `"`; otherwise it runs to the next whitespace.
fn take_value(s: &str) -> (&str, usize) {
    if let Some(rest) = s.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            return (&s[..end + 2], end + 2);
        }
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    (&s[..end], end)
}

fn mask_value(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => format!("\"{}\"", mask_secret(inner)),
        None => mask_secret(value),
    }
}

/// Masks every `field=value` pair whose field name matches a credential
/// pattern, then masks every literal occurrence of `known_secrets` left
/// anywhere else in the line.
fn redact_line(line: &str, known_secrets: &[String]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(eq) = rest.find('=') {
        let before_eq = &rest[..eq];
        let field_start = before_eq
            .rfind(|c: char| c.is_whitespace() || c == '{' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);
        let field_name = &before_eq[field_start..];
        out.push_str(&before_eq[..field_start]);

        let value_region = &rest[eq + 1..];
        let (value, value_len) = take_value(value_region);

        out.push_str(field_name);
        out.push('=');
        if is_credential_field(field_name) {
            out.push_str(&mask_value(value));
        } else {
            out.push_str(value);
        }

        rest = &value_region[value_len..];
    }
    out.push_str(rest);

    for secret in known_secrets {
        if !secret.is_empty() && out.contains(secret.as_str()) {
            out = out.replace(secret.as_str(), &mask_secret(secret));
        }
    }
    out
}

/// `MakeWriter` that redacts every line written through it before handing
/// it to stdout. `known_secrets` are the resolved credential values (API
/// keys/secrets) pulled from config at startup.
#[derive(Clone)]
pub struct RedactingMakeWriter {
    known_secrets: Arc<Vec<String>>,
}

impl RedactingMakeWriter {
    pub fn new(known_secrets: Vec<String>) -> Self {
        Self {
            known_secrets: Arc::new(known_secrets.into_iter().filter(|s| !s.is_empty()).collect()),
        }
    }
}

impl<'a> MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            known_secrets: Arc::clone(&self.known_secrets),
        }
    }
}

pub struct RedactingWriter {
    known_secrets: Arc<Vec<String>>,
}

impl io::Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let redacted = redact_line(&text, &self.known_secrets);
        io::Write::write_all(&mut io::stdout(), redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut io::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_credential_field_by_name() {
        let line = r#"2026-07-28T00:00:00Z INFO request api_key="AKIA1234567890ABCDEF" base_url="https://api.binance.com""#;
        let redacted = redact_line(line, &[]);
        assert!(!redacted.contains("AKIA1234567890ABCDEF"));
        assert!(redacted.contains("base_url=\"https://api.binance.com\""));
    }

    #[test]
    fn masks_secret_embedded_in_unrelated_field() {
        let line = r#"INFO startup config_dump="spot.api_secret=s3cr3t-value-do-not-print""#;
        let redacted = redact_line(line, &["s3cr3t-value-do-not-print".to_string()]);
        assert!(!redacted.contains("s3cr3t-value-do-not-print"));
    }

    #[test]
    fn leaves_unrelated_fields_untouched() {
        let line = "order_id=order-1 venue=Spot notional=48.9";
        assert_eq!(redact_line(line, &[]), line);
    }

    #[test]
    fn matches_password_and_token_field_names() {
        let line = r#"password="hunter2hunter2" auth_token="abcdefghijklmnop""#;
        let redacted = redact_line(line, &[]);
        assert!(!redacted.contains("hunter2hunter2"));
        assert!(!redacted.contains("abcdefghijklmnop"));
    }
}
