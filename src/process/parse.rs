use encoding_rs::ISO_8859_15;
use std::{collections::BTreeMap, fmt, io};
use tracing::{error, info, instrument, warn};

/// Key that opens a new record in the walker output.
pub const START_KEY: &str = "LastWriteTime";
/// Key that closes the current record.
pub const END_KEY: &str = "Owner";

const SEPARATOR: &str = ": ";

/// One file's metadata as emitted by the walker, before any derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
    /// Keys in the order they arrived, used for column ordering downstream.
    order: Vec<String>,
}

impl RawRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field names in arrival order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Insert a field; returns `true` when the key was already present.
    fn insert(&mut self, key: String, value: String) -> bool {
        match self.fields.insert(key.clone(), value) {
            Some(_) => true,
            None => {
                self.order.push(key);
                false
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut rec = RawRecord::default();
        for (k, v) in iter {
            rec.insert(k.into(), v.into());
        }
        rec
    }
}

/// Something that went wrong on a single line. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Reading from the source failed; nothing after it is read.
    Read(String),
    /// Bytes are not valid in the walker's encoding.
    Decode,
    /// A field arrived while no record was open.
    OrphanField,
    /// A key was repeated inside one record; the later value wins.
    DuplicateField,
    /// A new `LastWriteTime` arrived before the open record saw `Owner`.
    /// The open record is dropped.
    Unterminated { full_name: Option<String> },
    /// The stream ended with a record still open. It is dropped.
    TruncatedAtEnd { full_name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    /// 1-based line number in the walker output.
    pub line_no: usize,
    pub kind: AnomalyKind,
    /// The offending line, lossily decoded.
    pub content: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AnomalyKind::Read(e) => write!(f, "line {}: read failed: {}", self.line_no, e),
            AnomalyKind::Decode => write!(
                f,
                "line {}: not valid ISO-8859-15: {}",
                self.line_no, self.content
            ),
            AnomalyKind::OrphanField => write!(
                f,
                "line {}: field outside of any record: {}",
                self.line_no, self.content
            ),
            AnomalyKind::DuplicateField => write!(
                f,
                "line {}: field repeated within record: {}",
                self.line_no, self.content
            ),
            AnomalyKind::Unterminated { full_name } => write!(
                f,
                "line {}: record for {} never received {}, dropped",
                self.line_no,
                full_name.as_deref().unwrap_or("<unknown>"),
                END_KEY
            ),
            AnomalyKind::TruncatedAtEnd { full_name } => write!(
                f,
                "line {}: output ended inside record for {}, dropped",
                self.line_no,
                full_name.as_deref().unwrap_or("<unknown>")
            ),
        }
    }
}

/// Result of parsing the whole walker stream.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Completed records in emission order.
    pub records: Vec<RawRecord>,
    pub anomalies: Vec<Anomaly>,
    /// Total lines consumed from the source.
    pub lines_read: usize,
}

/// Classification of one decoded line.
#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    Field { key: &'a str, value: &'a str },
    Ignored,
}

/// Decode one raw walker line. `None` on bytes the encoding cannot map.
pub fn decode_line(bytes: &[u8]) -> Option<String> {
    ISO_8859_15
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
}

/// Split a decoded line at the first `": "`; lines without it are ignored.
pub fn classify_line(line: &str) -> Line<'_> {
    match line.split_once(SEPARATOR) {
        Some((key, value)) => Line::Field {
            key: key.trim(),
            value: value.trim(),
        },
        None => Line::Ignored,
    }
}

/// Fold state: the record currently being filled, if any.
#[derive(Default)]
struct Pending {
    open: Option<RawRecord>,
}

impl Pending {
    fn feed(&mut self, out: &mut ParseOutcome, line_no: usize, line: &str) {
        let (key, value) = match classify_line(line) {
            Line::Field { key, value } => (key, value),
            Line::Ignored => return,
        };

        let anomaly = |kind: AnomalyKind| Anomaly {
            line_no,
            kind,
            content: line.trim_end().to_string(),
        };

        if key == START_KEY {
            if let Some(prev) = self.open.take() {
                let full_name = prev.get("FullName").map(str::to_string);
                out.anomalies.push(anomaly(AnomalyKind::Unterminated { full_name }));
            }
            let mut rec = RawRecord::default();
            rec.insert(key.to_string(), value.to_string());
            self.open = Some(rec);
            return;
        }

        let Some(rec) = self.open.as_mut() else {
            out.anomalies.push(anomaly(AnomalyKind::OrphanField));
            return;
        };

        if rec.insert(key.to_string(), value.to_string()) {
            out.anomalies.push(anomaly(AnomalyKind::DuplicateField));
        }

        if key == END_KEY {
            if let Some(done) = self.open.take() {
                out.records.push(done);
            }
        }
    }

    fn finish(mut self, out: &mut ParseOutcome) {
        if let Some(rec) = self.open.take() {
            out.anomalies.push(Anomaly {
                line_no: out.lines_read,
                kind: AnomalyKind::TruncatedAtEnd {
                    full_name: rec.get("FullName").map(str::to_string),
                },
                content: String::new(),
            });
        }
    }
}

/// Rebuild one [`RawRecord`] per file from the walker's raw line stream.
///
/// Never fails: undecodable or out-of-place lines are skipped and reported in
/// [`ParseOutcome::anomalies`]. A read error ends the stream after one anomaly.
pub fn parse_records<I>(lines: I) -> ParseOutcome
where
    I: IntoIterator<Item = io::Result<Vec<u8>>>,
{
    let mut out = ParseOutcome::default();
    let mut pending = Pending::default();

    for (idx, raw) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        out.lines_read = line_no;

        let bytes = match raw {
            Ok(b) => b,
            // a failed read on a pipe or file does not clear; treat it as end of stream
            Err(e) => {
                out.anomalies.push(Anomaly {
                    line_no,
                    kind: AnomalyKind::Read(e.to_string()),
                    content: String::new(),
                });
                break;
            }
        };

        match decode_line(&bytes) {
            Some(line) => pending.feed(&mut out, line_no, &line),
            None => out.anomalies.push(Anomaly {
                line_no,
                kind: AnomalyKind::Decode,
                content: String::from_utf8_lossy(&bytes).trim_end().to_string(),
            }),
        }
    }

    pending.finish(&mut out);
    out
}

/// Parse and log, the way the pipeline reports this stage.
#[instrument(level = "info", skip(lines))]
pub fn parse_and_report<I>(lines: I) -> ParseOutcome
where
    I: IntoIterator<Item = io::Result<Vec<u8>>>,
{
    info!("parsing walker output");
    let outcome = parse_records(lines);

    for a in &outcome.anomalies {
        match a.kind {
            AnomalyKind::Read(_) | AnomalyKind::Decode | AnomalyKind::OrphanField => {
                error!("failed to parse walker output: {}", a)
            }
            _ => warn!("{}", a),
        }
    }

    info!(
        lines = outcome.lines_read,
        records = outcome.records.len(),
        "completed parsing walker output"
    );
    if !outcome.anomalies.is_empty() {
        warn!(
            anomalies = outcome.anomalies.len(),
            "these may be partial results, check the log for records that failed to parse"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<io::Result<Vec<u8>>> {
        text.lines().map(|l| Ok(l.as_bytes().to_vec())).collect()
    }

    const TWO_FILES: &str = "\
LastWriteTime: 01/02/2024 10:00:00
FullName: F:\\A\\B\\f.txt
Name: f.txt
Length: 2048
Owner: DOMAIN\\alice

LastWriteTime: 06/30/2023 08:15:00
FullName: F:\\Shared\\g.csv
Name: g.csv
Length: 10
Owner: bob
";

    #[test]
    fn classify_splits_on_first_separator() {
        assert_eq!(
            classify_line("  Name :  a: b.txt  "),
            Line::Field {
                key: "Name",
                value: "a: b.txt"
            }
        );
        assert_eq!(classify_line("no separator here"), Line::Ignored);
        assert_eq!(classify_line("Key:NoSpace"), Line::Ignored);
    }

    #[test]
    fn one_record_per_owner_line() {
        let out = parse_records(lines(TWO_FILES));
        assert_eq!(out.records.len(), 2);
        assert!(out.anomalies.is_empty());
        assert_eq!(out.lines_read, 11);

        let first = &out.records[0];
        assert_eq!(first.get("Owner"), Some("DOMAIN\\alice"));
        assert_eq!(first.get("Length"), Some("2048"));
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            vec!["LastWriteTime", "FullName", "Name", "Length", "Owner"]
        );
        assert_eq!(out.records[1].get("Name"), Some("g.csv"));
    }

    #[test]
    fn lines_without_separator_do_not_disturb_records() {
        let noisy = TWO_FILES.replace("Name: f.txt\n", "Name: f.txt\n-----\ngarbage\n");
        let clean = parse_records(lines(TWO_FILES));
        let out = parse_records(lines(&noisy));
        assert_eq!(out.records, clean.records);
        assert!(out.anomalies.is_empty());
    }

    #[test]
    fn decodes_latin9_bytes() {
        // 0xA4 is the euro sign in ISO-8859-15, 0xE9 is e-acute.
        let mut raw = lines("LastWriteTime: 01/02/2024 10:00:00");
        raw.push(Ok(b"Name: caf\xe9 \xa4.txt".to_vec()));
        raw.push(Ok(b"Owner: x".to_vec()));
        let out = parse_records(raw);
        assert_eq!(out.records[0].get("Name"), Some("café €.txt"));
    }

    #[test]
    fn unterminated_record_is_dropped_and_flagged() {
        let text = "\
LastWriteTime: 01/01/2024 00:00:00
FullName: F:\\lost\\x.txt
LastWriteTime: 01/02/2024 00:00:00
Name: kept.txt
Owner: carol
";
        let out = parse_records(lines(text));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("Name"), Some("kept.txt"));
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].line_no, 3);
        assert_eq!(
            out.anomalies[0].kind,
            AnomalyKind::Unterminated {
                full_name: Some("F:\\lost\\x.txt".into())
            }
        );
    }

    #[test]
    fn orphan_and_duplicate_fields_are_flagged() {
        let text = "\
Name: before-anything.txt
LastWriteTime: 01/01/2024 00:00:00
Length: 1
Length: 2
Owner: dave
Name: after-owner.txt
";
        let out = parse_records(lines(text));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("Length"), Some("2"));
        let kinds: Vec<_> = out.anomalies.iter().map(|a| a.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::OrphanField,
                AnomalyKind::DuplicateField,
                AnomalyKind::OrphanField
            ]
        );
        assert_eq!(out.anomalies[2].content, "Name: after-owner.txt");
    }

    #[test]
    fn read_error_ends_the_stream() {
        let mut raw = lines("LastWriteTime: 01/01/2024 00:00:00\nOwner: erin");
        raw.extend(lines("LastWriteTime: 01/03/2024 00:00:00\nFullName: F:\\t\\y"));
        raw.push(Err(io::Error::new(io::ErrorKind::Other, "pipe hiccup")));
        raw.extend(lines("LastWriteTime: 01/04/2024 00:00:00\nOwner: never-read"));

        let out = parse_records(raw);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.lines_read, 5);
        assert_eq!(out.anomalies.len(), 2);
        assert!(matches!(out.anomalies[0].kind, AnomalyKind::Read(_)));
        assert_eq!(out.anomalies[0].line_no, 5);
        assert_eq!(
            out.anomalies[1].kind,
            AnomalyKind::TruncatedAtEnd {
                full_name: Some("F:\\t\\y".into())
            }
        );
    }

    #[test]
    fn persistent_read_error_terminates() {
        let failing = std::iter::repeat_with(|| {
            Err(io::Error::new(io::ErrorKind::Other, "is a directory"))
        });
        let out = parse_records(failing);
        assert_eq!(out.lines_read, 1);
        assert_eq!(out.anomalies.len(), 1);
        assert!(matches!(out.anomalies[0].kind, AnomalyKind::Read(_)));
        assert!(out.records.is_empty());
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let out = parse_records(Vec::new());
        assert!(out.records.is_empty());
        assert!(out.anomalies.is_empty());
        assert_eq!(out.lines_read, 0);
    }
}
