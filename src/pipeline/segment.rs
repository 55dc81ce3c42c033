//! Partition extracted text into a fixed number of story segments.

use crate::config::SegmentationPolicy;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

/// Split `text` into at most `policy.segment_count` ordered segments.
///
/// Lines are the runs between one or more newlines. Every segment takes
/// `ceil(lines / segment_count)` consecutive lines joined by `\n`, so the
/// last segment may be shorter. Blank segments are dropped; the returned
/// order is the reading order.
pub fn partition(text: &str, policy: &SegmentationPolicy) -> Vec<String> {
    if text.trim().is_empty() || policy.segment_count == 0 {
        return Vec::new();
    }

    let lines: Vec<&str> = RE_LINE_BREAKS.split(text).collect();
    let part_size = lines.len().div_ceil(policy.segment_count);

    lines
        .chunks(part_size)
        .take(policy.segment_count)
        .map(|part| part.join("\n"))
        .filter(|segment| !segment.trim().is_empty())
        .collect()
}
