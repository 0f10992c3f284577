//! HTML tables returned by the orders, cause-list and judgment searches.
//!
//! Every table carries a header row first, which is skipped. Rows with fewer
//! cells than expected are layout rows and are ignored. A non-empty page
//! without any table (maintenance notices, login pages) is not a result.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::ParseError;
use super::envelope::parse_date;
use crate::portal::{BenchType, CaseOrder, CauseListPdf, JudgmentPage, JudgmentResult};

static ORDER_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#orderTable").expect("invalid order table selector"));
static CAUSE_LIST_TABLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.causelistTbl").expect("invalid cause list table selector")
});
static RESULT_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#resultTable").expect("invalid result table selector"));
static STRONG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong").expect("invalid strong selector"));
static PAGINATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.pagination, span").expect("invalid pagination selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("invalid anchor selector"));
static HONORIFIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)hon'?ble\s+").expect("invalid honorific regex"));
static JUDGE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*|\s+and\s+").expect("invalid judge separator regex"));
static TOTAL_HITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"of\s+(\d+)").expect("invalid total regex"));
static ANY_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("invalid table selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("invalid row selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("invalid cell selector"));
static LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("invalid link selector"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

fn cell_text(cell: &ElementRef<'_>) -> String {
    let joined: String = cell.text().collect();
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

fn href(cell: &ElementRef<'_>) -> Option<String> {
    cell.select(&LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Body rows of the preferred table, falling back to the first table.
/// `None` when the document has no table at all.
fn body_rows<'a>(document: &'a Html, preferred: &Selector) -> Option<Vec<Vec<ElementRef<'a>>>> {
    let table = document
        .select(preferred)
        .next()
        .or_else(|| document.select(&ANY_TABLE).next())?;

    Some(
        table
            .select(&ROW)
            .skip(1)
            .map(|row| row.select(&CELL).collect())
            .collect(),
    )
}

fn rows_or_failure<'a>(
    html: &str,
    document: &'a Html,
    preferred: &Selector,
) -> Result<Vec<Vec<ElementRef<'a>>>, ParseError> {
    match body_rows(document, preferred) {
        Some(rows) => Ok(rows),
        None if html.trim().is_empty() => Ok(Vec::new()),
        None => {
            let preview: String = html.trim().chars().take(60).collect();
            Err(ParseError::UnexpectedShape(format!(
                "expected an html table, got {preview:?}"
            )))
        }
    }
}

/// Site-absolute links are anchored under the portal base path.
pub(crate) fn resolve_order_link(base: &Url, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    base.join(href.trim_start_matches('/'))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

pub(super) fn parse_orders(html: &str, base: &Url) -> Result<Vec<CaseOrder>, ParseError> {
    let document = Html::parse_document(html);
    let mut orders = Vec::new();

    for cells in rows_or_failure(html, &document, &ORDER_TABLE)? {
        if cells.len() < 5 {
            continue;
        }
        let Some(order_date) = parse_date(&cell_text(&cells[1])) else {
            continue;
        };
        orders.push(CaseOrder {
            order_date,
            order_type: cell_text(&cells[2]),
            judge: cell_text(&cells[3]),
            pdf_url: href(&cells[4])
                .map(|href| resolve_order_link(base, &href))
                .unwrap_or_default(),
        });
    }

    log::debug!("parsed {} order rows", orders.len());
    Ok(orders)
}

pub(super) fn parse_cause_list(
    html: &str,
    case_qry_dir: &Url,
) -> Result<Vec<CauseListPdf>, ParseError> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for cells in rows_or_failure(html, &document, &CAUSE_LIST_TABLE)? {
        if cells.len() < 4 {
            continue;
        }
        let pdf_url = match href(&cells[3]) {
            Some(href) if href.starts_with("http") => href,
            Some(href) => case_qry_dir
                .join(&href)
                .map(|url| url.to_string())
                .unwrap_or(href),
            None => String::new(),
        };
        entries.push(CauseListPdf {
            serial_number: cell_text(&cells[0]).parse().unwrap_or(0),
            bench: cell_text(&cells[1]),
            cause_list_type: cell_text(&cells[2]),
            pdf_url,
        });
    }

    log::debug!("parsed {} cause list rows", entries.len());
    Ok(entries)
}

fn judges(cell: &str) -> Vec<String> {
    let cleaned = HONORIFIC.replace_all(cell, "");
    JUDGE_SEPARATOR
        .split(&cleaned)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn total_hits(document: &Html) -> Option<usize> {
    document.select(&PAGINATION).find_map(|node| {
        let text: String = node.text().collect();
        TOTAL_HITS
            .captures(&text)
            .and_then(|caps| caps[1].parse().ok())
    })
}

fn has_next_page(document: &Html) -> bool {
    document.select(&ANCHOR).any(|link| {
        link.value().classes().any(|class| class == "next")
            || link.text().any(|text| text.contains("Next"))
    })
}

/// Judgment search results. Links resolve like a browser would, so a leading
/// `/` is relative to the host.
pub(super) fn parse_judgments(html: &str, base: &Url) -> Result<JudgmentPage, ParseError> {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for cells in rows_or_failure(html, &document, &RESULT_TABLE)? {
        if cells.len() < 7 {
            continue;
        }
        let title = cells[1]
            .select(&STRONG)
            .next()
            .map(|strong| cell_text(&strong))
            .unwrap_or_default();
        let full = cell_text(&cells[1]);
        let case_number = if title.is_empty() {
            full
        } else {
            full.replacen(&title, "", 1).trim().to_string()
        };
        let judges = judges(&cell_text(&cells[3]));

        items.push(JudgmentResult {
            title,
            court_name: cell_text(&cells[2]),
            case_number,
            judgment_date: parse_date(&cell_text(&cells[4])),
            bench_type: BenchType::from_judge_count(judges.len()),
            judges,
            pdf_url: href(&cells[5])
                .map(|href| base.join(&href).map(|url| url.to_string()).unwrap_or(href))
                .unwrap_or_default(),
        });
    }

    let total_count = total_hits(&document).unwrap_or(items.len());
    log::debug!("parsed {}/{} judgment rows", items.len(), total_count);
    Ok(JudgmentPage {
        has_next: has_next_page(&document),
        total_count,
        items,
        page: 1,
    })
}
