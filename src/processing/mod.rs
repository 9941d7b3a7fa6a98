//! Report parsing and signal ingestion

pub mod parser;
pub mod signal_table;

pub use parser::{parse_report, AnchorReport, ParseError};
pub use signal_table::SignalTable;
