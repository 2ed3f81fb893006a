//! Protects boolean operators in expressions from the query string delimiter.
//!
//! A raw `&&` in a query string would split an expression into two parameters, so it is replaced
//! with `.AND.` before the query string is split, and restored once a value has been extracted.
//!

use bgt_config::types::Params;
use url::form_urlencoded;

const AND_PLACEHOLDER: &str = ".AND.";

/// Replace every literal `&&` with its placeholder.
pub fn escape(raw: &str) -> String {
  raw.replace("&&", AND_PLACEHOLDER)
}

/// Restore the operators written as placeholders: `.AND.`/`.and.` to `&&` and `.OR.`/`.or.`
/// to `||`.
pub fn unescape(value: &str) -> String {
  value
    .replace(".AND.", "&&")
    .replace(".and.", "&&")
    .replace(".OR.", "||")
    .replace(".or.", "||")
}

/// Split a raw query string or form body into ordered parameters, escaping `&&` first.
/// Values are percent-decoded but not unescaped.
pub fn parse_params(raw: &str) -> Params {
  form_urlencoded::parse(escape(raw).as_bytes())
    .into_owned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn escape_double_ampersand() {
    assert_eq!(escape("f=(AC>0&&AN>2)&r=11"), "f=(AC>0.AND.AN>2)&r=11");
  }

  #[test]
  fn unescape_both_cases() {
    assert_eq!(
      unescape("AC1>0.and.AC2>0.OR.AN>10.or.AC==1.AND.AN==2"),
      "AC1>0&&AC2>0||AN>10||AC==1&&AN==2"
    );
  }

  #[test]
  fn round_trip() {
    for expression in [
      "population==\"FIN\" && gender==1",
      "AC>0",
      "(a||b)&&!c",
      "",
    ] {
      assert_eq!(unescape(&escape(expression)), expression);
    }
  }

  #[test]
  fn params_keep_operators() {
    let params = parse_params("f=(AC1>0&&AC2>0)&s=(population==%22FIN%22)&s=,X,Y&S");

    assert_eq!(
      params.get("f").map(unescape),
      Some("(AC1>0&&AC2>0)".to_string())
    );
    assert_eq!(
      params.get_all("s").collect::<Vec<_>>(),
      vec!["(population==\"FIN\")", ",X,Y"]
    );
    assert!(params.contains("S"));
  }

  #[test]
  fn params_plus_is_space() {
    let params = parse_params("s=gender==1+%7C%7C+gender==2");

    assert_eq!(params.get("s"), Some("gender==1 || gender==2"));
  }
}
