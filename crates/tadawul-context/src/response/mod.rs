//! Output contract and the assembler that fills it

mod assembler;
mod schema;

pub use assembler::{ResponseAssembler, ResponseStatus};
pub use schema::{
    AnalysisQuality, ChatResponse, CompanyInfo, ConfidenceReport, DebugInfo, DocumentReference,
    FinancialContext, MarketAnalysis, UserMood,
};
