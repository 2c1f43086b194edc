//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in a single pass,
/// so placeholders inside substituted values are left as they are. Unknown keys stay.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings, on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
pub fn strip_code_fences(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_occurrence() {
    let out = fill_template("{a} y {b}, otra vez {a}", &[("a", "uno"), ("b", "dos")]);
    assert_eq!(out, "uno y dos, otra vez uno");
  }

  #[test]
  fn fill_template_does_not_expand_placeholders_inside_values() {
    let out = fill_template("{a} | {b}", &[("a", "literal {b}"), ("b", "dos")]);
    assert_eq!(out, "literal {b} | dos");
    assert_eq!(fill_template("{x} {a", &[("a", "uno")]), "{x} {a");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    assert_eq!(trunc_for_log("corto", 10), "corto");
    let out = trunc_for_log("órdenes médicas", 2);
    assert!(out.starts_with("ó…"));
  }

  #[test]
  fn strip_code_fences_handles_plain_and_fenced() {
    assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
  }
}
