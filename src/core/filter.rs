//! 列表搜索
//!
//! 只在内存中的快照上过滤，不访问远程存储。

use crate::remote::Entry;

/// 文件名包含 term（不区分大小写）的条目，保持原有顺序；term 为空时返回全部
pub fn filter(entries: &[Entry], term: &str) -> Vec<Entry> {
    matching(entries, term).cloned().collect()
}

/// 借用版本，避免复制条目
pub fn matching<'a>(entries: &'a [Entry], term: &str) -> impl Iterator<Item = &'a Entry> {
    let needle = term.to_lowercase();
    entries
        .iter()
        .filter(move |e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::EntryType;
    use chrono::Utc;

    fn listing(names: &[&str]) -> Vec<Entry> {
        names
            .iter()
            .map(|n| Entry::new(*n, EntryType::File, 0, Utc::now(), format!("ref:{}", n)))
            .collect()
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_case_insensitive_order_preserved() {
        let entries = listing(&["a.txt", "README.md", "A2.txt"]);
        // "README.md" 也包含字母 a
        assert_eq!(
            names(&filter(&entries, "a")),
            vec!["a.txt", "README.md", "A2.txt"]
        );
        assert_eq!(names(&filter(&entries, "A.T")), vec!["a.txt"]);
        assert_eq!(names(&filter(&entries, "txt")), vec!["a.txt", "A2.txt"]);
        assert_eq!(names(&filter(&entries, "ReadMe")), vec!["README.md"]);
    }

    #[test]
    fn test_empty_term_returns_everything() {
        let entries = listing(&["z", "y", "x"]);
        assert_eq!(filter(&entries, ""), entries);
    }

    #[test]
    fn test_idempotent() {
        let entries = listing(&["build.rs", "Cargo.toml", "cargo.lock", "src.tar", "notes"]);
        for term in ["", "car", "S", ".", "missing"] {
            let once = filter(&entries, term);
            assert_eq!(filter(&once, term), once, "term {:?}", term);
        }
    }

    #[test]
    fn test_only_matching_names() {
        let entries = listing(&["Cargo.toml", "cargo.lock", "main.rs"]);
        let result = filter(&entries, "CARGO");
        assert!(result
            .iter()
            .all(|e| e.name.to_lowercase().contains("cargo")));
        assert_eq!(result.len(), 2);
        assert!(filter(&entries, "nothing").is_empty());
    }
}
