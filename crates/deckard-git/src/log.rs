//! Parsing of NUL-delimited `git log` output.
//!
//! Each commit is emitted as six fields (hash, author, committer,
//! commit-epoch-seconds, subject, body), each terminated by a NUL byte.
//! Git separates records with a newline, which ends up in front of the next
//! hash and is trimmed away.

use std::path::Path;

use chrono::{TimeZone, Utc};
use deckard_core::{DeckardError, RawCommit};

/// Number of fields per commit record.
pub const FIELD_COUNT: usize = 6;

/// `--format` argument producing the record layout [`parse_log`] expects.
pub const LOG_FORMAT: &str = "%H%x00%an%x00%cn%x00%ct%x00%s%x00%b%x00";

/// Parse raw `git log` output into commit records, in output order.
///
/// A trailing partial group (fewer than [`FIELD_COUNT`] fields) is dropped.
/// The hash is trimmed; every other field is kept verbatim.
///
/// # Errors
///
/// Returns [`DeckardError::MalformedTimestamp`] if an epoch-seconds field is
/// not an integer.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use deckard_git::log::parse_log;
///
/// let raw = "abc123\0alice\0bob\01700000000\0subject\0body\n\0\n";
/// let commits = parse_log(raw, Path::new("/code/deckard")).unwrap();
/// assert_eq!(commits.len(), 1);
/// assert_eq!(commits[0].hash, "abc123");
/// assert_eq!(commits[0].message, "body\n");
/// ```
pub fn parse_log(raw: &str, folder: &Path) -> Result<Vec<RawCommit>, DeckardError> {
    let fields: Vec<&str> = raw.split('\0').collect();

    let mut commits = Vec::with_capacity(fields.len() / FIELD_COUNT);
    for record in fields.chunks_exact(FIELD_COUNT) {
        let epoch = record[3];
        let commit_when = epoch
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| DeckardError::MalformedTimestamp {
                value: epoch.to_string(),
                folder: folder.to_path_buf(),
            })?;

        commits.push(RawCommit {
            hash: record[0].trim().to_string(),
            author_name: record[1].to_string(),
            committer_name: record[2].to_string(),
            commit_when,
            subject: record[4].to_string(),
            message: record[5].to_string(),
        });
    }

    Ok(commits)
}

/// Render a commit the way `git log --format=`[`LOG_FORMAT`] prints it.
///
/// This is the inverse of [`parse_log`] for a single record.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use chrono::{TimeZone, Utc};
/// use deckard_core::RawCommit;
/// use deckard_git::log::{encode_record, parse_log};
///
/// let commit = RawCommit {
///     hash: "abc123".into(),
///     author_name: "alice".into(),
///     committer_name: "bob".into(),
///     commit_when: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
///     subject: "subject".into(),
///     message: "line one\nline two\n".into(),
/// };
/// let parsed = parse_log(&encode_record(&commit), Path::new(".")).unwrap();
/// assert_eq!(parsed, vec![commit]);
/// ```
pub fn encode_record(commit: &RawCommit) -> String {
    format!(
        "{}\0{}\0{}\0{}\0{}\0{}\0\n",
        commit.hash,
        commit.author_name,
        commit.committer_name,
        commit.commit_when.timestamp(),
        commit.subject,
        commit.message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn raw(hash: &str, secs: i64, body: &str) -> RawCommit {
        RawCommit {
            hash: hash.into(),
            author_name: "Alice Example".into(),
            committer_name: "Bob Example".into(),
            commit_when: at(secs),
            subject: format!("subject of {hash}"),
            message: body.into(),
        }
    }

    #[test]
    fn empty_output_yields_no_commits() {
        assert!(parse_log("", Path::new(".")).unwrap().is_empty());
    }

    #[test]
    fn trailing_partial_group_is_discarded() {
        // 2 full records followed by one stray field: 13 fields in total.
        let raw = "h1\0a\0c\0100\0s1\0b1\0h2\0a\0c\0200\0s2\0b2\0tail";
        assert_eq!(raw.split('\0').count(), 13);

        let commits = parse_log(raw, Path::new(".")).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "h1");
        assert_eq!(commits[1].hash, "h2");
        assert_eq!(commits[1].commit_when, at(200));
    }

    #[test]
    fn newline_between_records_is_trimmed_from_hash() {
        let log = [raw("aaa", 300, ""), raw("bbb", 200, "")]
            .iter()
            .map(encode_record)
            .collect::<String>();
        let commits = parse_log(&log, Path::new(".")).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].hash, "bbb");
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let originals = vec![
            raw("f00d", 1_700_000_300, "Multi-line body.\n\nSigned-off-by: Alice\n"),
            raw("beef", 1_700_000_200, ""),
            raw("cafe", 1_700_000_100, "  leading and trailing spaces  "),
        ];
        let log: String = originals.iter().map(encode_record).collect();

        let parsed = parse_log(&log, Path::new(".")).unwrap();
        assert_eq!(parsed, originals);
    }

    #[test]
    fn order_of_output_is_preserved() {
        let log: String = [raw("new", 30, ""), raw("old", 10, ""), raw("mid", 20, "")]
            .iter()
            .map(encode_record)
            .collect();
        let hashes: Vec<_> = parse_log(&log, Path::new("."))
            .unwrap()
            .into_iter()
            .map(|c| c.hash)
            .collect();
        assert_eq!(hashes, ["new", "old", "mid"]);
    }

    #[test]
    fn non_numeric_timestamp_names_value_and_folder() {
        let raw = "h1\0a\0c\0yesterday\0s\0b\0";
        let err = parse_log(raw, Path::new("/code/deckard")).unwrap_err();
        match err {
            DeckardError::MalformedTimestamp { value, folder } => {
                assert_eq!(value, "yesterday");
                assert_eq!(folder, Path::new("/code/deckard"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn log_format_emits_six_nul_terminated_fields() {
        assert_eq!(LOG_FORMAT.matches("%x00").count(), FIELD_COUNT);
        assert!(LOG_FORMAT.ends_with("%x00"));
    }
}
