//! Dividends, capital increases and the analyst recommendation.
//!
//! All three come from the `GetSermayeArttirimlari` web method. It needs the
//! session cookies of the company card page, so every call visits that page
//! first. Failures degrade to empty results.

use async_trait::async_trait;
use borsa_core::{
    AnalystRecommendation, CacheKey, CapitalIncrease, CorporateActionsProvider, DataKind, Dividend,
    MARKET_TZ, Result, StatusMode, Symbol,
    normalize::{round_to, value_as_f64},
};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::{CACHE_PREFIX, ISYATIRIM_URL, IsYatirimProvider};

type Record = Map<String, Value>;

/// `SHT_KODU` of cash dividends.
const CASH_DIVIDEND: &str = "04";
/// `SHT_KODU` values of capital increases (rights issue, bonus issue).
const CAPITAL_INCREASE: [&str; 2] = ["03", "09"];

/// Decodes the `d` member, which is either an array or a JSON string holding one.
fn sermaye_records(response: &Value) -> Vec<Record> {
    let records = match response.get("d") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).unwrap_or_else(|e| {
            warn!(error = %e, "Undecodable sermaye payload");
            Value::Null
        }),
        Some(value) => value.clone(),
        None => Value::Null,
    };
    match records {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn field(record: &Record, name: &str) -> f64 {
    record.get(name).and_then(value_as_f64).unwrap_or(0.0)
}

fn kind_of(record: &Record) -> &str {
    record.get("SHT_KODU").and_then(Value::as_str).unwrap_or("")
}

/// Local date of `SHHE_TARIH` (epoch milliseconds).
fn record_date(record: &Record) -> Option<NaiveDate> {
    let millis = record
        .get("SHHE_TARIH")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .filter(|ms| *ms != 0)?;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&MARKET_TZ).date_naive())
}

fn parse_dividends(records: &[Record]) -> Vec<Dividend> {
    let mut dividends: Vec<Dividend> = records
        .iter()
        .filter(|r| kind_of(r) == CASH_DIVIDEND)
        .filter_map(|r| {
            let date = record_date(r)?;
            let gross_rate = field(r, "SHHE_NAKIT_TM_ORAN");
            Some(Dividend {
                date,
                // rate is a percentage of the 1 TRY nominal
                amount: round_to(gross_rate / 100.0, 4),
                gross_rate: round_to(gross_rate, 2),
                net_rate: round_to(field(r, "SHHE_NAKIT_TM_ORAN_NET"), 2),
                total_dividend: field(r, "SHHE_NAKIT_TM_TUTAR"),
            })
        })
        .collect();
    dividends.sort_by(|a, b| b.date.cmp(&a.date));
    dividends
}

fn parse_capital_increases(records: &[Record]) -> Vec<CapitalIncrease> {
    let mut increases: Vec<CapitalIncrease> = records
        .iter()
        .filter(|r| CAPITAL_INCREASE.contains(&kind_of(r)))
        .filter_map(|r| {
            Some(CapitalIncrease {
                date: record_date(r)?,
                capital: field(r, "HSP_BOLUNME_SONRASI_SERMAYE"),
                rights_issue: field(r, "SHHE_BDLI_ORAN"),
                bonus_from_capital: field(r, "SHHE_BDSZ_IK_ORAN"),
                bonus_from_dividend: field(r, "SHHE_BDSZ_TM_ORAN"),
            })
        })
        .collect();
    increases.sort_by(|a, b| b.date.cmp(&a.date));
    increases
}

fn parse_recommendation(records: &[Record]) -> AnalystRecommendation {
    let text = |r: &Record| {
        r.get("ONERI")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let positive = |r: &Record, name: &str| {
        r.get(name)
            .and_then(value_as_f64)
            .filter(|v| *v != 0.0)
    };

    records
        .iter()
        .find(|r| text(r).is_some() || positive(r, "HEDEF_FIYAT").is_some())
        .map(|r| AnalystRecommendation {
            recommendation: text(r),
            target_price: positive(r, "HEDEF_FIYAT").map(|v| round_to(v, 2)),
            upside_potential: positive(r, "GETIRI_POT").map(|v| round_to(v * 100.0, 2)),
        })
        .unwrap_or_default()
}

impl IsYatirimProvider {
    async fn fetch_sermaye(&self, symbol: &Symbol) -> Result<Vec<Record>> {
        let page = self.stock_page_url(symbol);
        self.transport.establish_session(&page).await;

        let body = json!({
            "hisseKodu": symbol.as_str(),
            "hisseTanimKodu": "",
            "yil": 0,
            "zaman": "HEPSI",
            "endeksKodu": "09",
            "sektorKodu": "",
        });
        let response = self
            .transport
            .post(&self.stock_info_url("GetSermayeArttirimlari"))
            .header("Content-Type", "application/json; charset=UTF-8")
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", &page)
            .header("Origin", ISYATIRIM_URL)
            .body(body.to_string())
            .send(StatusMode::Strict)
            .await?
            .json::<Value>()?;

        let records = sermaye_records(&response);
        debug!(records = records.len(), "Fetched sermaye records");
        Ok(records)
    }

    /// Latest analyst recommendation with target price and upside.
    ///
    /// A failed request yields an empty recommendation.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_recommendation(&self, symbol: &Symbol) -> Result<AnalystRecommendation> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::RealtimeQuote)
            .part(symbol)
            .part("recommendation")
            .build();
        if let Some(recommendation) = self.cache.get::<AnalystRecommendation>(&key) {
            debug!("Serving recommendation from cache");
            return Ok(recommendation);
        }

        match self.fetch_sermaye(symbol).await {
            Ok(records) => {
                let recommendation = parse_recommendation(&records);
                self.cache
                    .set(key, recommendation.clone(), DataKind::RealtimeQuote);
                Ok(recommendation)
            }
            Err(e) => {
                warn!(error = %e, "Recommendation unavailable");
                Ok(AnalystRecommendation::default())
            }
        }
    }
}

#[async_trait]
impl CorporateActionsProvider for IsYatirimProvider {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_dividends(&self, symbol: &Symbol) -> Result<Vec<Dividend>> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::FinancialStatements)
            .part(symbol)
            .part("dividends")
            .build();
        if let Some(dividends) = self.cache.get::<Vec<Dividend>>(&key) {
            debug!("Serving dividends from cache");
            return Ok(dividends);
        }

        match self.fetch_sermaye(symbol).await {
            Ok(records) => {
                let dividends = parse_dividends(&records);
                self.cache
                    .set(key, dividends.clone(), DataKind::FinancialStatements);
                Ok(dividends)
            }
            Err(e) => {
                warn!(error = %e, "Dividends unavailable");
                Ok(Vec::new())
            }
        }
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_capital_increases(&self, symbol: &Symbol) -> Result<Vec<CapitalIncrease>> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::FinancialStatements)
            .part(symbol)
            .part("capital_increases")
            .build();
        if let Some(increases) = self.cache.get::<Vec<CapitalIncrease>>(&key) {
            debug!("Serving capital increases from cache");
            return Ok(increases);
        }

        match self.fetch_sermaye(symbol).await {
            Ok(records) => {
                let increases = parse_capital_increases(&records);
                self.cache
                    .set(key, increases.clone(), DataKind::FinancialStatements);
                Ok(increases)
            }
            Err(e) => {
                warn!(error = %e, "Capital increases unavailable");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::provider;
    use mockito::{Matcher, Server, ServerGuard};

    const SERMAYE_PATH: &str =
        "/_layouts/15/IsYatirim.Website/StockInfo/CompanyInfoAjax.aspx/GetSermayeArttirimlari";
    const PAGE_PATH: &str = "/tr-tr/analiz/hisse/Sayfalar/sirket-karti.aspx";

    /// 2024-05-15 00:00 Istanbul.
    const MAY_15: i64 = 1_715_720_400_000;
    /// 2023-06-01 00:00 Istanbul.
    const JUNE_1: i64 = 1_685_566_800_000;

    fn records() -> Value {
        json!([
            {"SHT_KODU": "04", "SHHE_TARIH": JUNE_1, "SHHE_NAKIT_TM_ORAN": 150.0, "SHHE_NAKIT_TM_ORAN_NET": 135.0, "SHHE_NAKIT_TM_TUTAR": 2_070_000_000.0},
            {"SHT_KODU": "04", "SHHE_TARIH": MAY_15, "SHHE_NAKIT_TM_ORAN": 245.678, "SHHE_NAKIT_TM_ORAN_NET": 221.1102, "SHHE_NAKIT_TM_TUTAR": 3_390_000_000.0},
            {"SHT_KODU": "09", "SHHE_TARIH": JUNE_1, "HSP_BOLUNME_SONRASI_SERMAYE": 1_380_000_000.0, "SHHE_BDSZ_IK_ORAN": 100.0},
            {"SHT_KODU": "01", "SHHE_TARIH": MAY_15},
            {"SHT_KODU": "04", "SHHE_TARIH": 0, "SHHE_NAKIT_TM_ORAN": 1.0},
        ])
    }

    async fn mock_session(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("GET", PAGE_PATH)
            .match_query(Matcher::UrlEncoded("hisse".into(), "THYAO".into()))
            .with_body("<html></html>")
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_dividends_from_string_payload() {
        let mut server = Server::new_async().await;
        let session = mock_session(&mut server).await;
        let body = json!({"d": records().to_string()});
        let mock = server
            .mock("POST", SERMAYE_PATH)
            .match_header("content-type", "application/json; charset=UTF-8")
            .match_header("x-requested-with", "XMLHttpRequest")
            .match_body(Matcher::PartialJson(json!({"hisseKodu": "THYAO", "zaman": "HEPSI"})))
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let provider = provider(&server);
        let symbol = Symbol::new("THYAO");
        let dividends = provider.fetch_dividends(&symbol).await.unwrap();

        assert_eq!(dividends.len(), 2);
        assert_eq!(dividends[0].date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
        assert_eq!(dividends[0].amount, 2.4568);
        assert_eq!(dividends[0].gross_rate, 245.68);
        assert_eq!(dividends[0].net_rate, 221.11);
        assert_eq!(dividends[1].date, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());

        provider.fetch_dividends(&symbol).await.unwrap();
        mock.assert_async().await;
        session.assert_async().await;
    }

    #[tokio::test]
    async fn test_capital_increases_from_array_payload() {
        let mut server = Server::new_async().await;
        mock_session(&mut server).await;
        server
            .mock("POST", SERMAYE_PATH)
            .with_body(json!({"d": records()}).to_string())
            .create_async()
            .await;

        let increases = provider(&server)
            .fetch_capital_increases(&Symbol::new("THYAO"))
            .await
            .unwrap();
        assert_eq!(increases.len(), 1);
        assert_eq!(increases[0].capital, 1_380_000_000.0);
        assert_eq!(increases[0].bonus_from_capital, 100.0);
        assert_eq!(increases[0].rights_issue, 0.0);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let mut server = Server::new_async().await;
        mock_session(&mut server).await;
        server
            .mock("POST", SERMAYE_PATH)
            .with_status(500)
            .create_async()
            .await;

        let provider = provider(&server);
        let symbol = Symbol::new("THYAO");
        assert!(provider.fetch_dividends(&symbol).await.unwrap().is_empty());
        assert!(provider.fetch_capital_increases(&symbol).await.unwrap().is_empty());
        assert_eq!(
            provider.fetch_recommendation(&symbol).await.unwrap(),
            AnalystRecommendation::default()
        );
    }

    #[test]
    fn test_recommendation_takes_first_populated_record() {
        let records = sermaye_records(&json!({"d": [
            {"ONERI": "", "HEDEF_FIYAT": 0},
            {"ONERI": "AL", "HEDEF_FIYAT": 412.456, "GETIRI_POT": 0.2534},
            {"ONERI": "SAT", "HEDEF_FIYAT": 100},
        ]}));
        let recommendation = parse_recommendation(&records);
        assert_eq!(recommendation.recommendation.as_deref(), Some("AL"));
        assert_eq!(recommendation.target_price, Some(412.46));
        assert_eq!(recommendation.upside_potential, Some(25.34));
    }

    #[test]
    fn test_undecodable_payload_is_empty() {
        assert!(sermaye_records(&json!({"d": "not json"})).is_empty());
        assert!(sermaye_records(&json!({})).is_empty());
        assert!(sermaye_records(&json!({"d": 5})).is_empty());
    }
}
