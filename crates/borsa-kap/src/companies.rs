//! Company list, search and company details.

use std::io::Cursor;
use std::sync::LazyLock;

use async_trait::async_trait;
use borsa_core::{
    Company, CompanyDetails, DataError, DataKind, ReferenceDataProvider, Result, StatusMode,
    Symbol, normalize::rank_matches,
};
use calamine::{Reader, open_workbook_auto_from_rs};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::{BIST_COMPANIES_PATH, KapProvider, PROVIDER};

const COMPANIES_EXCEL_PATH: &str = "/tr/api/company/generic/excel/IGS/A";
const COMPANY_SUMMARY_PATH: &str = "/tr/sirket-bilgileri/ozet";

/// Header labels of the ticker column.
const HEADER_LABELS: [&str; 2] = ["BIST KODU", "Kod"];

static SECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="/tr/Sektorler\?sector=[^"]*">([^<]+)</a>"#).expect("static regex is valid")
});

static MARKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="/tr/Pazarlar\?market=[^"]*">([^<]+)</a>"#).expect("static regex is valid")
});

static WEBSITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"İnternet Adresi</h3><p[^>]*>([^<]+)</p>").expect("static regex is valid")
});

/// Reads the first worksheet as rows of trimmed cell text.
fn read_sheet(bytes: Vec<u8>) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| DataError::Parse(format!("{PROVIDER} company list: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DataError::Parse(format!("{PROVIDER} company list has no worksheet")))?
        .map_err(|e| DataError::Parse(format!("{PROVIDER} company list: {e}")))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect())
}

/// Turns spreadsheet rows (ticker, name, city) into companies.
///
/// Header and blank rows are skipped. A ticker cell such as `"GARAN, TGB"`
/// yields one company per ticker.
pub(crate) fn parse_company_rows(rows: &[Vec<String>]) -> Vec<Company> {
    let mut companies = Vec::new();
    for row in rows {
        let [tickers, name, city, ..] = row.as_slice() else {
            continue;
        };
        if tickers.is_empty() || name.is_empty() || HEADER_LABELS.contains(&tickers.as_str()) {
            continue;
        }
        for ticker in tickers.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            companies.push(Company {
                ticker: ticker.to_string(),
                name: name.clone(),
                city: city.clone(),
            });
        }
    }
    companies
}

fn parse_details(html: &str) -> CompanyDetails {
    let capture = |re: &Regex| {
        re.captures(html)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };
    CompanyDetails {
        sector: capture(&SECTOR),
        market: capture(&MARKET),
        website: capture(&WEBSITE),
    }
}

#[async_trait]
impl ReferenceDataProvider for KapProvider {
    #[instrument(skip(self))]
    async fn fetch_companies(&self) -> Result<Vec<Company>> {
        const KEY: &str = "kap:lookup:companies";
        if let Some(companies) = self.lookups.get::<Vec<Company>>(KEY) {
            debug!("Serving company list from cache");
            return Ok(companies);
        }

        let referer = format!("{}{BIST_COMPANIES_PATH}", self.base_url);
        let payload = self
            .transport
            .get(&format!("{}{COMPANIES_EXCEL_PATH}", self.base_url))
            .header("Accept", "*/*")
            .header("Accept-Language", "tr")
            .header("Referer", &referer)
            .send(StatusMode::Strict)
            .await
            .map_err(|e| e.context("company list"))?;

        let rows = read_sheet(payload.bytes().to_vec())?;
        let companies = parse_company_rows(&rows);
        debug!(companies = companies.len(), "Fetched company list");

        self.lookups.set(KEY, companies.clone(), DataKind::Lookup);
        Ok(companies)
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<Company>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let companies = self.fetch_companies().await?;
        Ok(rank_matches(
            query,
            companies,
            |c| c.ticker.as_str(),
            |c| c.name.as_str(),
        ))
    }

    /// Sector, market and website. Any failure yields empty details.
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_company_details(&self, symbol: &Symbol) -> Result<CompanyDetails> {
        let key = format!("kap:lookup:details:{symbol}");
        if let Some(details) = self.lookups.get::<CompanyDetails>(&key) {
            debug!("Serving company details from cache");
            return Ok(details);
        }

        let Some(member) = self.fetch_member_id(symbol).await else {
            return Ok(CompanyDetails::default());
        };

        let url = format!("{}{COMPANY_SUMMARY_PATH}/{member}", self.api_url);
        let html = match self.transport.get(&url).send(StatusMode::Strict).await {
            Ok(payload) => payload.text(),
            Err(e) => {
                warn!(error = %e, "Company details unavailable");
                return Ok(CompanyDetails::default());
            }
        };

        let details = parse_details(&html);
        self.lookups.set(key, details.clone(), DataKind::Lookup);
        Ok(details)
    }
}
