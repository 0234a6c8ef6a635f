//! Walker output → structured rows: parse the key/value text, lay the
//! records out as a table, then compute the reporting columns.

pub mod date_parser;
pub mod derive;
pub mod parse;
pub mod raw_table;
