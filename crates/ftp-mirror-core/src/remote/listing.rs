//! MLSD response parser (RFC 3659).
//!
//! A fact line looks like `type=file;size=1234;perm=r; report.xlsx`: facts are
//! `;`-terminated `key=value` pairs, followed by a single space and the name.

use std::collections::HashMap;

use super::RemoteListing;
use crate::entry::EntryKind;

/// Parse a full MLSD body. `cdir`/`pdir` entries are dropped.
pub fn parse_mlsd(lines: &[String]) -> Vec<RemoteListing> {
    lines
        .iter()
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_mlsd_line)
        .collect()
}

/// Parse one fact line. Returns `None` for malformed lines and for the
/// current/parent directory entries.
pub fn parse_mlsd_line(line: &str) -> Option<RemoteListing> {
    let (facts_str, name) = match line.find("; ") {
        Some(pos) => (&line[..pos + 1], &line[pos + 2..]),
        // A line with no facts at all is just " name".
        None => match line.strip_prefix(' ') {
            Some(rest) => ("", rest),
            None => return None,
        },
    };

    if name.is_empty() {
        return None;
    }

    let facts: HashMap<String, String> = facts_str
        .split(';')
        .filter_map(|segment| segment.trim().split_once('='))
        .map(|(k, v)| (k.to_lowercase(), v.to_string()))
        .collect();

    let type_fact = facts.get("type").map(|s| s.to_lowercase());
    let kind = match type_fact.as_deref() {
        Some("cdir") | Some("pdir") => return None,
        Some("dir") => Some(EntryKind::Directory),
        Some("file") => Some(EntryKind::File),
        _ => None,
    };

    let size = match kind {
        Some(EntryKind::Directory) => None,
        _ => facts.get("size").and_then(|v| v.parse::<u64>().ok()),
    };

    Some(RemoteListing {
        name: name.to_string(),
        kind,
        size,
        perm: facts.get("perm").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_line() {
        let entry = parse_mlsd_line("type=file;size=1024;modify=20260101120000; example.bin").unwrap();
        assert_eq!(entry.name, "example.bin");
        assert_eq!(entry.kind, Some(EntryKind::File));
        assert_eq!(entry.size, Some(1024));
        assert_eq!(entry.perm, None);
    }

    #[test]
    fn test_dir_line_keeps_perm() {
        let entry = parse_mlsd_line("Type=dir;Perm=flcdmpe;Modify=20250301093000; Отчеты 2025").unwrap();
        assert_eq!(entry.name, "Отчеты 2025");
        assert_eq!(entry.kind, Some(EntryKind::Directory));
        assert_eq!(entry.size, None);
        assert_eq!(entry.perm.as_deref(), Some("flcdmpe"));
    }

    #[test]
    fn test_name_with_semicolon_and_spaces() {
        let entry = parse_mlsd_line("type=file;size=3; a; b c.txt").unwrap();
        assert_eq!(entry.name, "a; b c.txt");
    }

    #[test]
    fn test_filters_cdir_and_pdir() {
        let raw = vec![
            "type=cdir;perm=el; .".to_string(),
            "type=pdir;perm=el; ..".to_string(),
            "type=file;size=10; real.txt".to_string(),
            "".to_string(),
        ];
        let entries = parse_mlsd(&raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.txt");
    }

    #[test]
    fn test_unknown_type_has_no_kind() {
        let entry = parse_mlsd_line("type=OS.unix=symlink;size=4; link").unwrap();
        assert_eq!(entry.kind, None);
    }

    #[test]
    fn test_line_without_facts() {
        let entry = parse_mlsd_line(" bare.txt").unwrap();
        assert_eq!(entry.name, "bare.txt");
        assert_eq!(entry.kind, None);
    }

    #[test]
    fn test_malformed_line() {
        assert!(parse_mlsd_line("no-facts-here").is_none());
    }
}
