//! Statement format detection and parsing

pub mod amount;
pub mod camt053;
pub mod csv;
pub mod mt940;

pub use amount::parse_amount;
pub use camt053::Camt053Parser;
pub use mt940::Mt940Parser;
pub use self::csv::{CsvColumnMapping, CsvParser};

use crate::types::{ParsedStatement, ReconcileResult};

/// A parser for one bank statement format
///
/// Implementations are registered with a [`ParserRegistry`] in
/// specific-before-generic order; the first parser whose `can_parse`
/// probe accepts a file handles it.
pub trait StatementParser: Send + Sync {
    /// Short name of the format, used in summaries and logs
    fn format_name(&self) -> &'static str;

    /// Cheap probe: does this file look like the parser's format?
    fn can_parse(&self, bytes: &[u8], filename: Option<&str>) -> bool;

    /// Parse the file into transactions plus per-entry errors
    fn parse(&self, bytes: &[u8]) -> ReconcileResult<ParsedStatement>;
}

/// Ordered set of registered statement parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn StatementParser>>,
}

impl ParserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the built-in XML and SWIFT parsers
    ///
    /// CSV parsing needs a per-bank column mapping, so a configured
    /// [`CsvParser`] must be registered separately; register it last so
    /// the more specific formats probe first.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Camt053Parser));
        registry.register(Box::new(Mt940Parser));
        registry
    }

    /// Append a parser; registration order is probe order
    pub fn register(&mut self, parser: Box<dyn StatementParser>) {
        self.parsers.push(parser);
    }

    /// First registered parser that accepts the file
    pub fn resolve(&self, bytes: &[u8], filename: Option<&str>) -> Option<&dyn StatementParser> {
        self.parsers
            .iter()
            .find(|parser| parser.can_parse(bytes, filename))
            .map(|parser| parser.as_ref())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
