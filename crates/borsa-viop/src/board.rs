//! VİOP board page parsing.
//!
//! The page groups contracts into accordion items, one per market. Each item
//! has a heading link with the market name and a table with one row per
//! contract: name, last price, change, TRY volume and contract volume.

use std::sync::LazyLock;

use borsa_core::{
    ContractKind, DerivativeContract, ParseReport, SkipReason, UnderlyingClass,
    normalize::parse_turkish_number, parse::collect_rows,
};
use scraper::{ElementRef, Html, Selector};

fn static_selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static ACCORDION_ITEM: LazyLock<Selector> =
    LazyLock::new(|| static_selector("div.accordion-item"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| static_selector("a"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| static_selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| static_selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| static_selector("td"));

/// Board sections in page order.
pub(crate) const SECTIONS: &[(ContractKind, UnderlyingClass, &str)] = &[
    (ContractKind::Future, UnderlyingClass::Stock, "Pay Vadeli İşlem Ana Pazarı"),
    (ContractKind::Future, UnderlyingClass::Index, "Endeks Vadeli İşlem Ana Pazarı"),
    (ContractKind::Future, UnderlyingClass::Currency, "Döviz Vadeli İşlem Ana Pazarı"),
    (
        ContractKind::Future,
        UnderlyingClass::Commodity,
        "Kıymetli Madenler Vadeli İşlem Ana Pazarı",
    ),
    (ContractKind::Option, UnderlyingClass::Stock, "Pay Opsiyon Ana Pazarı"),
    (ContractKind::Option, UnderlyingClass::Index, "Endeks Opsiyon Ana Pazarı"),
];

/// Visible text with whitespace runs collapsed.
fn text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The accordion item whose heading reads `title`.
fn section<'a>(document: &'a Html, title: &str) -> Option<ElementRef<'a>> {
    document
        .select(&ACCORDION_ITEM)
        .find(|item| item.select(&ANCHOR).any(|anchor| text(anchor) == title))
}

/// Contract code from a `title="F_AKBNK0226 | ..."` attribute.
fn contract_code(cell: ElementRef<'_>) -> String {
    cell.value()
        .attr("title")
        .and_then(|title| title.split_once('|'))
        .map(|(code, _)| code.trim().to_string())
        .unwrap_or_default()
}

fn contract(
    index: usize,
    cells: &[ElementRef<'_>],
    kind: ContractKind,
    underlying: UnderlyingClass,
) -> Result<DerivativeContract, SkipReason> {
    let code = contract_code(cells[0]);
    let name = text(cells[0]);
    if code.is_empty() && name.is_empty() {
        return Err(SkipReason::new(index, "missing contract name"));
    }

    let number = |i: usize| parse_turkish_number(&text(cells[i]));
    Ok(DerivativeContract {
        code,
        name,
        price: number(1),
        change: number(2),
        volume_try: number(3),
        volume_contracts: number(4),
        kind,
        underlying,
    })
}

/// Every contract on the board, in section order.
///
/// Rows with fewer than five cells (headers, footnotes) are ignored. A missing
/// section contributes nothing.
pub(crate) fn parse_board(html: &str) -> (Vec<DerivativeContract>, ParseReport) {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();
    for &(kind, underlying, title) in SECTIONS {
        let Some(table) = section(&document, title).and_then(|item| item.select(&TABLE).next())
        else {
            continue;
        };
        for row in table.select(&ROW) {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            if cells.len() >= 5 {
                rows.push((kind, underlying, cells));
            }
        }
    }

    let parsed = rows
        .iter()
        .enumerate()
        .map(|(index, (kind, underlying, cells))| contract(index, cells, *kind, *underlying));
    collect_rows("viop board", parsed)
}
