//! Per-turn context assembly.
//!
//! Builds the package the coach sees at the start of every turn from four
//! blocks, under a word budget:
//!
//! | Block | Source | Trim strategy |
//! |-------|--------|---------------|
//! | Fixed profile | Runner facts + race objective | Never trimmed |
//! | Training history | Recent activities | Records, then commentary |
//! | KPIs | 4-week aggregates | Never trimmed |
//! | Session memory | Summarized prior turns | Clipped per entry |

pub mod assembler;
pub mod kpi;
pub mod words;

pub use assembler::{
    AssemblyInput, AssemblyMetadata, ContextAssembler, ContextBudget, ContextPackage, SectionStats,
};
pub use kpi::{Kpis, TrainingPhase};
pub use words::count_words;
