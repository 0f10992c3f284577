//! Records decoded from portal responses.
//!
//! Dates serialise as ISO 8601 strings via chrono's serde support.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

/// Case metadata from a case-status search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaseInfo {
    /// `number/year`, e.g. `3/2024`.
    pub case_number: String,
    /// Numeric case type code as the portal reports it.
    pub case_type: String,
    /// Court Number Record, e.g. `DLHC010582482024`.
    pub cnr_number: String,
    pub filing_number: String,
    pub registration_date: Option<NaiveDate>,
    pub petitioner: String,
    pub respondent: String,
    pub status: String,
    pub order_url_path: String,
    pub court_name: String,
}

/// A single order or judgment attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOrder {
    pub order_date: NaiveDate,
    pub order_type: String,
    pub judge: String,
    pub pdf_url: String,
}

/// One row of the cause-list index: a PDF per bench.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CauseListPdf {
    pub serial_number: u32,
    pub bench: String,
    pub cause_list_type: String,
    pub pdf_url: String,
}

/// Bench strength, told from the number of judges on a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchType {
    Single,
    Division,
    Full,
}

impl BenchType {
    pub fn from_judge_count(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(BenchType::Single),
            2 => Some(BenchType::Division),
            _ => Some(BenchType::Full),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BenchType::Single => "Single Bench",
            BenchType::Division => "Division Bench",
            BenchType::Full => "Full Bench",
        }
    }
}

impl Serialize for BenchType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One hit from the judgment search portal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JudgmentResult {
    pub title: String,
    pub court_name: String,
    pub case_number: String,
    pub judgment_date: Option<NaiveDate>,
    pub judges: Vec<String>,
    pub pdf_url: String,
    pub bench_type: Option<BenchType>,
}

/// A page of judgment search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgmentPage {
    pub items: Vec<JudgmentResult>,
    /// Hits across all pages, as the portal reports it.
    pub total_count: usize,
    pub page: usize,
    pub has_next: bool,
}

impl JudgmentPage {
    pub fn total_pages(&self) -> usize {
        if self.items.is_empty() {
            return usize::from(self.total_count > 0);
        }
        self.total_count.div_ceil(self.items.len())
    }
}

impl Default for JudgmentPage {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            page: 1,
            has_next: false,
        }
    }
}
