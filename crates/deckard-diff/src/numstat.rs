use deckard_core::{DeckardError, Diff, NumStat};

/// Result of parsing numstat output.
///
/// `degraded` lists every input line whose added or deleted count could not
/// be read. Such a line still contributes an entry to `diff` (zero counts,
/// empty path) so the rest of the commit is kept.
///
/// # Examples
///
/// ```
/// use deckard_diff::numstat::parse_numstat;
///
/// let parsed = parse_numstat("-\t-\tlogo.png\n2\t0\tREADME.md\n").unwrap();
/// assert_eq!(parsed.diff.stats.len(), 2);
/// assert_eq!(parsed.degraded, vec!["-\t-\tlogo.png".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumstatParse {
    pub diff: Diff,
    pub degraded: Vec<String>,
}

/// Parse `git diff --numstat` output.
///
/// Blank lines are skipped. Every other line needs at least three
/// whitespace-separated tokens: added count, deleted count, and a path whose
/// tokens are joined back with single spaces.
///
/// # Errors
///
/// Returns [`DeckardError::MalformedDiffLine`] for a line with fewer than
/// three tokens.
///
/// # Examples
///
/// ```
/// use deckard_diff::numstat::parse_numstat;
///
/// let parsed = parse_numstat("3\t5\tfoo bar.txt").unwrap();
/// let stat = &parsed.diff.stats[0];
/// assert_eq!((stat.added, stat.deleted), (3, 5));
/// assert_eq!(stat.file, "foo bar.txt");
///
/// assert!(parse_numstat("").unwrap().diff.is_empty());
/// assert!(parse_numstat("3\t5").is_err());
/// ```
pub fn parse_numstat(raw: &str) -> Result<NumstatParse, DeckardError> {
    let mut parsed = NumstatParse::default();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(DeckardError::MalformedDiffLine {
                line: line.to_string(),
            });
        }

        match (parse_count(fields[0]), parse_count(fields[1])) {
            (Some(added), Some(deleted)) => parsed.diff.stats.push(NumStat {
                added,
                deleted,
                file: fields[2..].join(" "),
            }),
            _ => {
                parsed.diff.stats.push(NumStat::default());
                parsed.degraded.push(line.to_string());
            }
        }
    }

    Ok(parsed)
}

/// Counts are unsigned 32-bit decimals; git prints `-` for binary files.
fn parse_count(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u32>().ok().map(u64::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_an_empty_diff() {
        let parsed = parse_numstat("").unwrap();
        assert!(parsed.diff.is_empty());
        assert!(parsed.degraded.is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let parsed = parse_numstat("\n   \n1\t2\ta.rs\n\n").unwrap();
        assert_eq!(parsed.diff.stats.len(), 1);
        assert_eq!(parsed.diff.stats[0].file, "a.rs");
    }

    #[test]
    fn path_with_spaces_is_reassembled() {
        let parsed = parse_numstat("3\t5\tfoo bar.txt").unwrap();
        assert_eq!(
            parsed.diff.stats,
            vec![NumStat {
                added: 3,
                deleted: 5,
                file: "foo bar.txt".into(),
            }]
        );
    }

    #[test]
    fn runs_of_whitespace_in_path_collapse_to_one_space() {
        let parsed = parse_numstat("1\t1\tdocs/my   notes.md").unwrap();
        assert_eq!(parsed.diff.stats[0].file, "docs/my notes.md");
    }

    #[test]
    fn two_tokens_is_a_malformed_line() {
        let err = parse_numstat("3\t5").unwrap_err();
        match err {
            DeckardError::MalformedDiffLine { line } => assert_eq!(line, "3\t5"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_line_aborts_the_whole_parse() {
        assert!(parse_numstat("1\t1\tok.rs\nbroken\n2\t2\tlater.rs").is_err());
    }

    #[test]
    fn non_numeric_counts_degrade_a_single_entry() {
        let raw = "10\t2\tsrc/lib.rs\n-\t-\tassets/logo.png\n4\tx\tweird.txt\n1\t0\tREADME.md";
        let parsed = parse_numstat(raw).unwrap();

        assert_eq!(parsed.diff.stats.len(), 4);
        assert_eq!(parsed.diff.stats[1], NumStat::default());
        assert_eq!(parsed.diff.stats[2], NumStat::default());
        assert_eq!(parsed.diff.stats[3].file, "README.md");
        assert_eq!(
            parsed.degraded,
            vec!["-\t-\tassets/logo.png", "4\tx\tweird.txt"]
        );
    }

    #[test]
    fn negative_and_oversized_counts_are_degraded() {
        let parsed =
            parse_numstat("-1\t0\ta\n4294967296\t0\tb\n4294967295\t0\tc\n+3\t1\td").unwrap();
        assert_eq!(parsed.degraded.len(), 3);
        assert_eq!(parsed.diff.stats[2].added, u64::from(u32::MAX));
        assert!(parsed.degraded[2].contains("+3"));
        assert_eq!(parsed.diff.stats[3].added, 0);
    }

    #[test]
    fn rename_arrow_is_kept_as_part_of_the_path() {
        let parsed = parse_numstat("0\t0\told name.rs => new name.rs").unwrap();
        assert_eq!(parsed.diff.stats[0].file, "old name.rs => new name.rs");
    }
}
