//! JSON recovery for free-form model output.
//!
//! LLMs wrap their JSON in prose, markdown fences or both. The parser
//! tries, in order: the first triple-backtick fenced block (optionally
//! labeled `json`), the substring from the first `{` to the last `}`,
//! and the whole trimmed body. Total and pure.

use serde_json::Value;

/// Extract the first valid JSON object from raw model output.
pub fn recover_json(raw: &str) -> Option<Value> {
    if let Some(fenced) = first_fenced_block(raw)
        && let Some(value) = parse_object(fenced)
    {
        return Some(value);
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
        && start < end
        && let Some(value) = parse_object(&raw[start..=end])
    {
        return Some(value);
    }

    parse_object(raw.trim())
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

fn first_fenced_block(raw: &str) -> Option<&str> {
    let re = regex::Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex is valid");
    re.captures(raw).map(|c| c.get(1).unwrap().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_plain_object() {
        let v = recover_json(r#"{"beleg_typ": "rechnung"}"#).unwrap();
        assert_eq!(v, json!({"beleg_typ": "rechnung"}));
    }

    #[test]
    fn parses_a_labeled_fenced_block() {
        let raw = "Hier ist das Ergebnis:\n```json\n{\"betrag_brutto\": 19.99}\n```\nFertig.";
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"betrag_brutto": 19.99}));
    }

    #[test]
    fn parses_an_unlabeled_fenced_block() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(recover_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn parses_an_object_embedded_in_prose() {
        let raw = "Das Dokument ist eine Rechnung. {\"beleg_typ\": \"rechnung\", \"mwst_satz\": 19} Weitere Details fehlen.";
        let v = recover_json(raw).unwrap();
        assert_eq!(v["mwst_satz"], json!(19));
    }

    #[test]
    fn nested_braces_survive_the_brace_heuristic() {
        let raw = "x {\"a\": {\"b\": 2}} y";
        assert_eq!(recover_json(raw).unwrap(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(recover_json("kein json hier"), None);
        assert_eq!(recover_json(""), None);
        assert_eq!(recover_json("{broken"), None);
    }

    #[test]
    fn non_object_json_yields_none() {
        assert_eq!(recover_json("[1, 2, 3]"), None);
        assert_eq!(recover_json("42"), None);
    }

    #[test]
    fn idempotent_on_valid_json() {
        let raw = r#"{"a": [1, 2], "b": {"c": "d"}}"#;
        let first = recover_json(raw).unwrap();
        let second = recover_json(&first.to_string()).unwrap();
        assert_eq!(first, second);
    }
}
