//! Financial statements from the MaliTablo endpoint.

use async_trait::async_trait;
use borsa_core::{
    CacheKey, DataError, DataKind, FinancialGroup, FinancialTable, FiscalPeriod,
    FundamentalDataProvider, LineItem, PeriodType, Result, StatementKind, StatusMode, Symbol,
    normalize::value_as_f64, period::fiscal_periods,
};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{CACHE_PREFIX, IsYatirimProvider};

/// Year/period pairs accepted by one MaliTablo request.
pub(crate) const MAX_PERIODS: usize = 5;

/// Upstream tables that make up a statement.
pub(crate) const fn statement_tables(statement: StatementKind) -> &'static [&'static str] {
    match statement {
        StatementKind::BalanceSheet => &["BILANCO_AKTIF", "BILANCO_PASIF"],
        StatementKind::IncomeStatement => &["GELIR_TABLOSU"],
        StatementKind::CashFlow => &["NAKIT_AKIM_TABLOSU"],
    }
}

#[derive(Debug, Default, Deserialize)]
struct MaliTabloResponse {
    #[serde(default)]
    value: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl IsYatirimProvider {
    async fn fetch_table(
        &self,
        symbol: &Symbol,
        table: &str,
        group: FinancialGroup,
        periods: &[FiscalPeriod],
    ) -> Result<Vec<LineItem>> {
        let mut params = vec![
            ("companyCode".to_string(), symbol.to_string()),
            ("exchange".to_string(), "TRY".to_string()),
            ("financialGroup".to_string(), group.code().to_string()),
        ];
        for (i, period) in periods.iter().enumerate() {
            params.push((format!("year{}", i + 1), period.year.to_string()));
            params.push((format!("period{}", i + 1), period.month.to_string()));
        }

        let response = self
            .transport
            .get(&self.common_url("Data.aspx/MaliTablo"))
            .query(&params)
            .send(StatusMode::Strict)
            .await?
            .json::<MaliTabloResponse>()?;
        debug!(table, rows = response.value.len(), "Fetched financial table");

        Ok(response
            .value
            .iter()
            .map(|item| {
                let text = |name: &str| item.get(name).and_then(|v| v.as_str()).map(str::trim);
                let name_en = text("itemDescEng").filter(|s| !s.is_empty()).map(str::to_string);
                let name = text("itemDescTr")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .or_else(|| name_en.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                let values = (1..=periods.len())
                    .map(|i| item.get(&format!("value{i}")).and_then(value_as_f64))
                    .collect();
                LineItem {
                    name,
                    name_en,
                    values,
                }
            })
            .collect())
    }
}

#[async_trait]
impl FundamentalDataProvider for IsYatirimProvider {
    #[instrument(skip(self), fields(symbol = %symbol, statement = statement.as_str()))]
    async fn fetch_financials(
        &self,
        symbol: &Symbol,
        statement: StatementKind,
        period_type: PeriodType,
        group: FinancialGroup,
        count: usize,
    ) -> Result<FinancialTable> {
        if count == 0 {
            return Err(DataError::InvalidParameter(
                "period count must be at least 1".to_string(),
            ));
        }
        if count > MAX_PERIODS {
            warn!(count, max = MAX_PERIODS, "Period count capped");
        }
        let count = count.min(MAX_PERIODS);

        let key = CacheKey::new(CACHE_PREFIX, DataKind::FinancialStatements)
            .part(symbol)
            .part(statement.as_str())
            .part(period_type.as_str())
            .part(group.code())
            .part(count)
            .build();
        if let Some(table) = self.cache.get::<FinancialTable>(&key) {
            debug!("Serving financials from cache");
            return Ok(table);
        }

        let periods = fiscal_periods(self.today(), period_type, count);
        let tables = statement_tables(statement);
        let results = join_all(
            tables
                .iter()
                .map(|table| self.fetch_table(symbol, table, group, &periods)),
        )
        .await;

        let mut items: Vec<LineItem> = Vec::new();
        for (table, result) in tables.iter().zip(results) {
            match result {
                Ok(rows) => {
                    for row in rows {
                        if !items.contains(&row) {
                            items.push(row);
                        }
                    }
                }
                Err(e) => warn!(table, error = %e, "Skipping financial table"),
            }
        }
        if items.is_empty() {
            return Err(DataError::unavailable(
                symbol.as_str(),
                format!("no {} data", statement.as_str()),
            ));
        }

        let table = FinancialTable {
            symbol: symbol.clone(),
            statement,
            period_type,
            periods: periods.iter().map(|p| p.label(period_type)).collect(),
            items,
        };
        self.cache
            .set(key, table.clone(), DataKind::FinancialStatements);
        Ok(table)
    }
}
