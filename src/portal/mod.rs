//! Portal surfaces: resource layout, form construction, and the records
//! decoded from their responses. The HC services portal and the judgment
//! search portal share the session and challenge flow.

pub mod endpoints;
pub mod judgments;
pub mod models;

pub use endpoints::{DEFAULT_BASE_URL, PortalEndpoints, Site};
pub use judgments::DEFAULT_JUDGMENTS_BASE_URL;
pub use models::{BenchType, CaseInfo, CaseOrder, CauseListPdf, JudgmentPage, JudgmentResult};
