use blame_protocol::AttributionRecord;

/// Parse raw annotate output into one record per output line.
///
/// Each line is trimmed and split on whitespace runs: the first token is the
/// author, the second the revision, anything after that (usually the echoed
/// source text) is ignored. Lines with fewer than two tokens, blank lines
/// included, become `unknown` records so numbering stays aligned with the
/// source file. A trailing newline does not add a record.
pub fn parse(raw_output: &str) -> Vec<AttributionRecord> {
    raw_output
        .lines()
        .enumerate()
        .map(|(idx, line)| parse_line(idx + 1, line))
        .collect()
}

fn parse_line(line_number: usize, line: &str) -> AttributionRecord {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(author), Some(revision)) => {
            AttributionRecord::new(line_number, author, revision, None)
        }
        _ => AttributionRecord::unknown(line_number),
    }
}
