//! Prometheus exposition parsing
//!
//! The runtime's gauge names vary across versions, so each signal is
//! looked up through a small allowlist tried in priority order.

/// Known names for the waiting-requests gauge, newest first.
pub const WAITING_GAUGE_NAMES: &[&str] = &[
    "vllm_num_requests_waiting",
    "vllm:num_requests_waiting",
    "vllm_requests_waiting",
    "vllm:requests_waiting",
];

/// Known names for the running-requests gauge, newest first.
pub const RUNNING_GAUGE_NAMES: &[&str] = &[
    "vllm_num_requests_running",
    "vllm:num_requests_running",
    "vllm_requests_running",
    "vllm:requests_running",
];

/// Find the first gauge among `names` in a Prometheus text exposition.
///
/// Accepts `name value`, `name{labels} value`, and an optional trailing
/// timestamp. Returns the first parseable value for the first name that
/// matches anywhere in the text.
pub fn find_gauge(text: &str, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| {
        text.lines()
            .filter_map(|line| parse_gauge_line(line, name))
            .next()
    })
}

fn parse_gauge_line(line: &str, name: &str) -> Option<f64> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }

    let rest = line.strip_prefix(name)?;

    // The name must end here or at a label block; "vllm_num_requests_waiting_total"
    // must not match "vllm_num_requests_waiting".
    let value_part = if let Some(after_labels) = rest.strip_prefix('{') {
        after_labels.split_once('}')?.1
    } else if rest.starts_with(char::is_whitespace) {
        rest
    } else {
        return None;
    };

    value_part.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_gauge() {
        let text = "vllm_num_requests_waiting 4.5\n";
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), Some(4.5));
    }

    #[test]
    fn test_labeled_gauge() {
        let text = "vllm:num_requests_running{model=\"demo\",engine=\"0\"} 2\n";
        assert_eq!(find_gauge(text, RUNNING_GAUGE_NAMES), Some(2.0));
    }

    #[test]
    fn test_trailing_timestamp_ignored() {
        let text = "vllm_requests_waiting 7 1700000000000\n";
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), Some(7.0));
    }

    #[test]
    fn test_name_priority_order() {
        let text = "vllm:requests_waiting 9\nvllm_num_requests_waiting 1\n";
        // The first allowlist entry wins even though it appears later.
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), Some(1.0));
    }

    #[test]
    fn test_prefix_names_do_not_match() {
        let text = "vllm_num_requests_waiting_total 99\n";
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), None);
    }

    #[test]
    fn test_comments_and_garbage_skipped() {
        let text = "# HELP vllm_num_requests_waiting queued\n\
                    # TYPE vllm_num_requests_waiting gauge\n\
                    vllm_num_requests_waiting notanumber\n\
                    vllm_num_requests_waiting 3\n";
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), Some(3.0));
    }

    #[test]
    fn test_scientific_notation() {
        let text = "vllm_num_requests_waiting 1.2e1\n";
        assert_eq!(find_gauge(text, WAITING_GAUGE_NAMES), Some(12.0));
    }

    #[test]
    fn test_absent_gauge() {
        assert_eq!(find_gauge("up 1\n", WAITING_GAUGE_NAMES), None);
    }
}
