use std::path::Path;

/// Parsed `.indexignore` rules, applied against paths relative to the catalog
/// root. Syntax mirrors common source-control ignore files: literal
/// component matches, a trailing `*` wildcard, a trailing `/` to match
/// directories only, a leading `!` to negate an earlier match, and `#`
/// comment lines. The last matching rule wins, as in `.gitignore`.
#[derive(Clone, Debug, Default)]
pub struct IgnoreSet {
    rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
struct Rule {
    pattern: String,
    dir_only: bool,
    negate: bool,
}

impl IgnoreSet {
    pub fn parse(contents: &str) -> IgnoreSet {
        let rules = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let negate = line.starts_with('!');
                let line = if negate { &line[1..] } else { line };
                let dir_only = line.ends_with('/');
                let pattern = line.trim_end_matches('/').to_owned();
                Rule {
                    pattern,
                    dir_only,
                    negate,
                }
            })
            .collect();
        IgnoreSet { rules }
    }

    /// Whether `relative_path` (relative to the catalog root, using `/`
    /// separators) is ignored. `is_dir` selects directory-only rules.
    pub fn is_ignored(&self, relative_path: &Path, is_dir: bool) -> bool {
        let path_str = relative_path.to_string_lossy().replace('\\', "/");
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule_matches(&rule.pattern, &path_str, &file_name) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}

fn rule_matches(pattern: &str, path_str: &str, file_name: &str) -> bool {
    if pattern.contains('/') {
        glob_match(pattern, path_str)
    } else {
        glob_match(pattern, file_name) || glob_match(pattern, path_str)
    }
}

/// A minimal glob matcher supporting literal segments and `*` wildcards
/// (no `**`, no character classes) -- the subset `.indexignore` needs.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn inner(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                (0..=text.len()).any(|i| inner(&pattern[1..], &text[i..]))
            }
            (Some(p), Some(t)) if p == t => inner(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), candidate.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ignored(rules: &str, path: &str, is_dir: bool) -> bool {
        IgnoreSet::parse(rules).is_ignored(&PathBuf::from(path), is_dir)
    }

    #[test]
    fn literal_file_name() {
        assert!(ignored("secret.yaml", "pkg/secret.yaml", false));
        assert!(!ignored("secret.yaml", "pkg/other.yaml", false));
    }

    #[test]
    fn wildcard_suffix() {
        assert!(ignored("*.bak", "pkg/bundle.yaml.bak", false));
    }

    #[test]
    fn directory_only_suffix() {
        assert!(ignored("drafts/", "drafts", true));
        assert!(!ignored("drafts/", "drafts", false));
    }

    #[test]
    fn negation_overrides_earlier_rule() {
        let rules = "*.yaml\n!keep.yaml\n";
        assert!(!ignored(rules, "a/keep.yaml", false));
        assert!(ignored(rules, "a/other.yaml", false));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let rules = "# a comment\n\n*.tmp\n";
        assert!(ignored(rules, "x.tmp", false));
    }
}
