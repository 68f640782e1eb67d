//! Locale-aware text and number normalization shared by every parser.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static NAME_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\.,']|\s+a\.s\.?|\s+anonim sirketi").expect("static regex is valid")
});

static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,]\s*)([A-Za-z_]\w*)\s*:").expect("static regex is valid"));

/// Parses a number written in Turkish or plain notation.
///
/// - `"1.234,56"` (both separators): dots are thousands separators, the comma is decimal
/// - `"12,5"` (comma only): the comma is decimal
/// - `"1234.56"`: plain decimal
///
/// Surrounding whitespace, a `%` sign and a trailing `₺`/`TL` marker are ignored.
/// Returns `None` for anything that is not a finite number.
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text
        .trim()
        .trim_end_matches('₺')
        .trim_end_matches("TL")
        .trim_end_matches('%')
        .trim()
        .trim_start_matches('%')
        .trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned = match (trimmed.contains('.'), trimmed.contains(',')) {
        (true, true) => trimmed.replace('.', "").replace(',', "."),
        (false, true) => trimmed.replace(',', "."),
        _ => trimmed.to_string(),
    };
    let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a number that is known to be in Turkish notation, where every dot is
/// a thousands separator: `"1.234"` is `1234.0`, `"9.850,25"` is `9850.25`.
#[must_use]
pub fn parse_turkish_number(text: &str) -> Option<f64> {
    parse_number(&text.replace('.', ""))
}

/// Reads a JSON value that may be a number or a locale-formatted string.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Rounds to a fixed number of decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Folds Turkish letters to their ASCII counterparts and lowercases the result.
///
/// Folding happens before lowercasing so `İ` becomes `i` instead of `i̇`.
#[must_use]
pub fn fold_turkish(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'İ' | 'ı' => 'i',
            'Ö' | 'ö' => 'o',
            'Ü' | 'ü' => 'u',
            'Ş' | 'ş' => 's',
            'Ç' | 'ç' => 'c',
            'Ğ' | 'ğ' => 'g',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Normalizes a company name for fuzzy matching: folds Turkish letters, removes
/// punctuation and the common `A.Ş.` / `Anonim Şirketi` suffixes.
#[must_use]
pub fn normalize_name(text: &str) -> String {
    NAME_NOISE
        .replace_all(&fold_turkish(text), "")
        .trim()
        .to_string()
}

/// Score for an exact, case-insensitive code match.
pub const SCORE_EXACT_CODE: u32 = 1000;
/// Score for a code that starts with the query.
pub const SCORE_CODE_PREFIX: u32 = 500;
/// Score for a name containing the normalized query.
pub const SCORE_NAME_SUBSTRING: u32 = 100;

/// Scores one candidate against a query. Zero means no match.
#[must_use]
pub fn match_score(query: &str, code: &str, name: &str) -> u32 {
    let query_upper = query.trim().to_uppercase();
    if query_upper.is_empty() {
        return 0;
    }
    let code_upper = code.to_uppercase();

    if code_upper == query_upper {
        SCORE_EXACT_CODE
    } else if code_upper.starts_with(&query_upper) {
        SCORE_CODE_PREFIX
    } else if normalize_name(name).contains(&normalize_name(query)) {
        SCORE_NAME_SUBSTRING
    } else {
        0
    }
}

/// Ranks candidates by [`match_score`], best first.
///
/// Non-matching candidates are dropped. The sort is stable, so equally scored
/// candidates keep their upstream order.
pub fn rank_matches<T, C, N>(query: &str, candidates: Vec<T>, code: C, name: N) -> Vec<T>
where
    C: Fn(&T) -> &str,
    N: Fn(&T) -> &str,
{
    let mut scored: Vec<(u32, T)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let score = match_score(query, code(&candidate), name(&candidate));
            (score > 0).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Repairs a JavaScript object/array literal into strict JSON.
///
/// Bare keys are quoted and single quotes become double quotes. Returns `None`
/// when the repaired text still does not parse.
#[must_use]
pub fn repair_js_literal(literal: &str) -> Option<String> {
    let quoted_keys = BARE_KEY.replace_all(literal.trim(), "$1\"$2\":");
    let repaired = quoted_keys.replace('\'', "\"");
    match serde_json::from_str::<Value>(&repaired) {
        Ok(_) => Some(repaired),
        Err(e) => {
            debug!(error = %e, "Embedded literal could not be repaired");
            None
        }
    }
}

/// Extracts the array assigned to `var <name> = [...];` in a page and decodes it.
///
/// Fails soft: a missing variable, an irreparable literal or a shape mismatch
/// all yield an empty vector.
#[must_use]
pub fn parse_js_array<T: DeserializeOwned>(html: &str, var_name: &str) -> Vec<T> {
    let pattern = format!(r"(?s)var\s+{}\s*=\s*\[(.*?)\];", regex::escape(var_name));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let Some(body) = re.captures(html).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let body = body.as_str().trim();
    if body.is_empty() {
        return Vec::new();
    }

    repair_js_literal(&format!("[{body}]"))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_parse_number_conventions() {
        assert_eq!(parse_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("1234.56"), Some(1234.56));
        assert_eq!(parse_number(" 268,50 ₺"), Some(268.5));
        assert_eq!(parse_number("%51,2"), Some(51.2));
        assert_eq!(parse_number("1.234.567,8"), Some(1_234_567.8));
    }

    #[test]
    fn test_parse_number_rejects_malformed_input() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("   "), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("12,5,3"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_turkish_notation_treats_every_dot_as_grouping() {
        assert_eq!(parse_turkish_number("1.234"), Some(1234.0));
        assert_eq!(parse_turkish_number("12.345.678"), Some(12_345_678.0));
        assert_eq!(parse_turkish_number("9.850,25"), Some(9850.25));
        assert_eq!(parse_turkish_number("-0,45"), Some(-0.45));
        assert_eq!(parse_turkish_number("%1,25"), Some(1.25));
        assert_eq!(parse_turkish_number(""), None);
        assert_eq!(parse_turkish_number("-"), None);
        // plain notation would read these as decimals
        assert_eq!(parse_number("1.234"), Some(1.234));
    }

    #[test]
    fn test_value_as_f64() {
        assert_eq!(value_as_f64(&serde_json::json!(12.5)), Some(12.5));
        assert_eq!(value_as_f64(&serde_json::json!("1.000,25")), Some(1000.25));
        assert_eq!(value_as_f64(&Value::Null), None);
    }

    #[test]
    fn test_fold_turkish() {
        assert_eq!(fold_turkish("İSTANBUL Çİmento Ğüşö"), "istanbul cimento gusu");
        assert_eq!(fold_turkish("ılık"), "ilik");
    }

    #[test]
    fn test_normalize_name_strips_corporate_suffixes() {
        assert_eq!(
            normalize_name("TÜRK HAVA YOLLARI A.Ş."),
            "turk hava yollari"
        );
        assert_eq!(
            normalize_name("Akbank Türk Anonim Şirketi"),
            "akbank turk"
        );
    }

    #[test]
    fn test_rank_matches_tiers() {
        let candidates = vec![
            ("BANVT", "BANVİT BANDIRMA VİTAMİNLİ YEM SANAYİİ A.Ş."),
            ("AKBNK", "AKBANK T.A.Ş."),
            ("BANK", "ÖRNEK BANK A.Ş."),
            ("XYZ", "NOTHING IN COMMON"),
            ("ICBCT", "ICBC TURKEY BANK A.Ş."),
        ];
        let ranked = rank_matches("bank", candidates, |c| c.0, |c| c.1);
        let codes: Vec<&str> = ranked.iter().map(|c| c.0).collect();
        // exact code, then prefix, then name substrings in upstream order
        assert_eq!(codes, vec!["BANK", "AKBNK", "ICBCT"]);

        let ranked = rank_matches("ban", candidates_again(), |c| c.0, |c| c.1);
        let codes: Vec<&str> = ranked.iter().map(|c| c.0).collect();
        assert_eq!(codes, vec!["BANVT", "BANK", "AKBNK", "ICBCT"]);
    }

    fn candidates_again() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AKBNK", "AKBANK T.A.Ş."),
            ("BANVT", "BANVİT A.Ş."),
            ("ICBCT", "ICBC TURKEY BANK A.Ş."),
            ("BANK", "ÖRNEK A.Ş."),
        ]
    }

    #[test]
    fn test_match_score_ordering() {
        assert!(match_score("thyao", "THYAO", "x") > match_score("thy", "THYAO", "x"));
        assert!(
            match_score("thy", "THYAO", "x") > match_score("hava", "THYAO", "Türk Hava Yolları")
        );
        assert_eq!(match_score("", "THYAO", "Türk Hava Yolları"), 0);
    }

    #[test]
    fn test_repair_js_literal() {
        let repaired = repair_js_literal("[{name: 'Türkiye Varlık Fonu', y: 49.12}]").unwrap();
        assert_eq!(repaired, r#"[{"name": "Türkiye Varlık Fonu", "y": 49.12}]"#);
        assert!(repair_js_literal("[{name: 'broken'").is_none());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Slice {
        name: String,
        y: f64,
    }

    #[test]
    fn test_parse_js_array() {
        let html = r"<script>
            var OrtaklikYapisidata = [{name: 'TVF', y: 49.12},{name: 'Diğer', y: 50.88}];
        </script>";
        let slices: Vec<Slice> = parse_js_array(html, "OrtaklikYapisidata");
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[1].name, "Diğer");
        assert_eq!(slices[1].y, 50.88);
    }

    #[test]
    fn test_parse_js_array_fails_soft() {
        let missing: Vec<Slice> = parse_js_array("<html></html>", "OrtaklikYapisidata");
        assert!(missing.is_empty());

        let broken: Vec<Slice> =
            parse_js_array("var OrtaklikYapisidata = [{name: 'x', y: }];", "OrtaklikYapisidata");
        assert!(broken.is_empty());

        let wrong_shape: Vec<Slice> =
            parse_js_array("var OrtaklikYapisidata = [{label: 'x'}];", "OrtaklikYapisidata");
        assert!(wrong_shape.is_empty());
    }
}
