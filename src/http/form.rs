use std::collections::HashMap;

/// Escapes the control page can produce in its fields. Anything else is left
/// encoded.
const ESCAPES: [(&str, &str); 3] = [("%20", " "), ("%3A", ":"), ("%2D", "-")];

/// Decodes an `application/x-www-form-urlencoded` body. Pairs without `=` are
/// skipped; later duplicates win.
pub fn decode_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), unescape(value)))
        .collect()
}

fn unescape(value: &str) -> String {
    ESCAPES
        .iter()
        .fold(value.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_escapes() {
        let form = decode_form("duration=30&label=test%20run");

        assert_eq!(form.len(), 2);
        assert_eq!(form["duration"], "30");
        assert_eq!(form["label"], "test run");

        let form = decode_form("clock_time=09%3A45&date=2024%2D03%2D01");
        assert_eq!(form["clock_time"], "09:45");
        assert_eq!(form["date"], "2024-03-01");
    }

    #[test]
    fn unknown_escapes_pass_through() {
        let form = decode_form("label=a%2Fb+c");
        assert_eq!(form["label"], "a%2Fb+c");
    }

    #[test]
    fn pairs_without_equals_are_dropped() {
        let form = decode_form("flag&duration=5&&label=x=y");

        assert_eq!(form.len(), 2);
        assert_eq!(form["duration"], "5");
        // only the first '=' splits
        assert_eq!(form["label"], "x=y");
    }

    #[test]
    fn empty_body_is_empty_form() {
        assert!(decode_form("").is_empty());
    }
}
