//! SQL Templating
//!
//! Substitutes `${name}` placeholders. No expressions, no recursion: the
//! substituted value is inserted verbatim.

use crate::error::TemplateError;
use std::collections::BTreeMap;

/// Render `template`, replacing every `${key}` with its value
pub fn render_template(
    template: &str,
    variables: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(open) = rest.find("${") {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find('}')
            .ok_or(TemplateError::Unterminated {
                offset: consumed + open,
            })?;

        let key = after_open[..close].trim();
        let value = variables
            .get(key)
            .ok_or_else(|| TemplateError::UnknownVariable {
                name: key.to_string(),
            })?;
        output.push_str(value);

        let advance = open + 2 + close + 1;
        consumed += advance;
        rest = &rest[advance..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Whether a statement returns rows (`SELECT`, `SHOW`, `WITH`)
pub fn is_select_statement(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(head.as_str(), "select" | "show" | "with")
}
