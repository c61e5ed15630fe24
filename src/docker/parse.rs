use super::types::ContainerRef;

/// Parse `docker ps -q` output: one identifier per line, surrounding
/// whitespace trimmed, blank lines skipped, order kept.
pub fn parse_container_ids(raw: &str) -> Vec<ContainerRef> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ContainerRef::from)
        .collect()
}
