//! Disclosures and the expected-disclosure calendar.

use std::sync::LazyLock;

use async_trait::async_trait;
use borsa_core::{
    DataError, Disclosure, DisclosureProvider, ExpectedDisclosure, Result, StatusMode, Symbol,
};
use chrono::TimeDelta;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::KapProvider;

const DISCLOSURE_PATH: &str = "/tr/bildirim-sorgu-sonuc";
const CALENDAR_PATH: &str = "/tr/api/expected-disclosure-inquiry/company";

/// Public link of a disclosure.
const DISCLOSURE_LINK: &str = "https://www.kap.org.tr/tr/Bildirim";

/// Calendar horizon.
const CALENDAR_DAYS: i64 = 180;

static DISCLOSURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?s)publishDate\\":\\"([^\\"]+)\\".*?"#,
        r#"disclosureIndex\\":(\d+).*?"#,
        r#"title\\":\\"([^\\"]+)\\""#,
    ))
    .expect("static regex is valid")
});

pub(crate) fn parse_disclosures(html: &str, limit: usize) -> Vec<Disclosure> {
    DISCLOSURE
        .captures_iter(html)
        .filter_map(|caps| {
            let index = caps[2].parse::<u64>().ok()?;
            Some(Disclosure::new(
                &caps[1],
                index,
                &caps[3],
                format!("{DISCLOSURE_LINK}/{index}"),
            ))
        })
        .take(limit)
        .collect()
}

/// Text of a field that may be a string or a number.
fn text(item: &Value, name: &str) -> String {
    match item.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn parse_calendar(items: &Value) -> Result<Vec<ExpectedDisclosure>> {
    let Value::Array(items) = items else {
        return Err(DataError::Parse(
            "expected a JSON array of expected disclosures".to_string(),
        ));
    };
    Ok(items
        .iter()
        .map(|item| ExpectedDisclosure {
            start_date: text(item, "startDate"),
            end_date: text(item, "endDate"),
            subject: text(item, "subject"),
            period: text(item, "ruleTypeTerm"),
            year: text(item, "year"),
        })
        .collect())
}

#[async_trait]
impl DisclosureProvider for KapProvider {
    /// Most recent disclosures. Symbols unknown to KAP have none.
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_disclosures(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Disclosure>> {
        let Some(member) = self.fetch_member_id(symbol).await else {
            return Ok(Vec::new());
        };

        let html = self
            .transport
            .get(&format!("{}{DISCLOSURE_PATH}", self.base_url))
            .query(&[("member", member.as_str())])
            .send(StatusMode::Strict)
            .await
            .map_err(|e| e.context(format!("disclosures for {symbol}")))?
            .text();

        let disclosures = parse_disclosures(&html, limit);
        debug!(count = disclosures.len(), "Fetched disclosures");
        Ok(disclosures)
    }

    /// Disclosures expected from today through the next 180 days.
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_calendar(&self, symbol: &Symbol) -> Result<Vec<ExpectedDisclosure>> {
        let Some(member) = self.fetch_member_id(symbol).await else {
            return Ok(Vec::new());
        };

        let today = self.clock.market_now().date_naive();
        let body = json!({
            "startDate": today.format("%Y-%m-%d").to_string(),
            "endDate": (today + TimeDelta::days(CALENDAR_DAYS)).format("%Y-%m-%d").to_string(),
            "memberTypes": ["IGS"],
            "mkkMemberOidList": [member],
            "disclosureClass": "",
            "subjects": [],
            "mainSector": "",
            "sector": "",
            "subSector": "",
            "market": "",
            "index": "",
            "year": "",
            "term": "",
            "ruleType": "",
        });
        let referer = format!("{}/tr/beklenen-bildirim-sorgu", self.api_url);

        let items = self
            .transport
            .post(&format!("{}{CALENDAR_PATH}", self.api_url))
            .header("Accept", "*/*")
            .header("Origin", &self.api_url)
            .header("Referer", &referer)
            .json(&body)
            .send(StatusMode::Strict)
            .await
            .and_then(|payload| payload.json::<Value>())
            .map_err(|e| e.context(format!("calendar for {symbol}")))?;

        parse_calendar(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_companies_page, provider};
    use chrono::NaiveDate;
    use mockito::{Matcher, Server};

    const DISCLOSURE_PAGE: &str = concat!(
        r#"{\"publishDate\":\"29.12.2025 19:21:18\",\"disclosureIndex\":1530826,\"kapTitle\":\"x\",\"title\":\"Özel Durum Açıklaması\"},"#,
        r#"{\"publishDate\":\"28.12.2025 09:05:00\",\"disclosureIndex\":1530700,\"title\":\"Finansal Rapor\"},"#,
        r#"{\"publishDate\":\"27.12.2025 18:00:00\",\"disclosureIndex\":1530500,\"title\":\"Genel Kurul\"}"#,
    );

    #[test]
    fn test_parse_disclosures_respects_limit() {
        let disclosures = parse_disclosures(DISCLOSURE_PAGE, 2);
        assert_eq!(disclosures.len(), 2);
        assert_eq!(disclosures[0].index, 1_530_826);
        assert_eq!(disclosures[0].title, "Özel Durum Açıklaması");
        assert_eq!(disclosures[0].url, "https://www.kap.org.tr/tr/Bildirim/1530826");
        assert_eq!(
            disclosures[0].published_at,
            NaiveDate::from_ymd_opt(2025, 12, 29).and_then(|d| d.and_hms_opt(19, 21, 18))
        );
        assert_eq!(parse_disclosures(DISCLOSURE_PAGE, 10).len(), 3);
    }

    #[tokio::test]
    async fn test_disclosures_use_member_id() {
        let mut server = Server::new_async().await;
        mock_companies_page(&mut server).await;
        let mock = server
            .mock("GET", DISCLOSURE_PATH)
            .match_query(Matcher::UrlEncoded(
                "member".into(),
                "4028e4a140f2ed720140f37a5a5e0018".into(),
            ))
            .with_body(DISCLOSURE_PAGE)
            .expect(1)
            .create_async()
            .await;
        let (_clock, provider) = provider(&server);

        let disclosures = provider
            .fetch_disclosures(&Symbol::new("THYAO"), 20)
            .await
            .unwrap();
        assert_eq!(disclosures.len(), 3);
        mock.assert_async().await;

        // unknown to KAP: no request, no error
        assert!(provider
            .fetch_disclosures(&Symbol::new("NOPE"), 20)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_calendar_window_and_fields() {
        let mut server = Server::new_async().await;
        mock_companies_page(&mut server).await;
        let response = json!([
            {"startDate": "01.03.2025", "endDate": "11.03.2025", "subject": "Finansal Rapor", "ruleTypeTerm": "Yıllık", "year": 2024},
            {"startDate": "01.05.2025", "endDate": "12.05.2025", "subject": "Finansal Rapor", "ruleTypeTerm": "3 Aylık", "year": "2025"},
        ]);
        let mock = server
            .mock("POST", CALENDAR_PATH)
            .match_body(Matcher::PartialJson(json!({
                "startDate": "2025-02-10",
                "endDate": "2025-08-09",
                "memberTypes": ["IGS"],
                "mkkMemberOidList": ["4028e4a140f2ed720140f37a5a5e0018"],
            })))
            .with_body(response.to_string())
            .expect(1)
            .create_async()
            .await;
        let (_clock, provider) = provider(&server);

        let calendar = provider.fetch_calendar(&Symbol::new("THYAO")).await.unwrap();
        assert_eq!(calendar.len(), 2);
        assert_eq!(calendar[0].year, "2024");
        assert_eq!(calendar[1].period, "3 Aylık");
        mock.assert_async().await;
    }

    #[test]
    fn test_parse_calendar_rejects_objects() {
        assert!(parse_calendar(&json!({"error": "x"})).is_err());
        assert!(parse_calendar(&json!([])).unwrap().is_empty());
    }
}
