use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use filetime::FileTime;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::spec::{CopyAssetsError, EnumAssetPatternMode, EnumAssetToType};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
struct SpecGlobIgnore {
    matcher: GlobMatcher,
    if_match_base: bool,
    if_globstar: bool,
    /// Per pattern segment: starts with a literal `.`.
    l_segments_dot: Vec<bool>,
}

impl SpecGlobIgnore {
    /// Wildcards never match a leading `.` of a path segment; the pattern
    /// segment at that position must spell the dot out.
    fn _allows_dot_segments(&self, path_relative: &str) -> bool {
        let iter_segments = path_relative.split('/');
        if self.if_globstar {
            // `**` spans an unknown number of segments, so compare counts.
            let cnt_dot_path = iter_segments.filter(|s| s.starts_with('.')).count();
            let cnt_dot_pattern = self.l_segments_dot.iter().filter(|b| **b).count();
            return cnt_dot_path <= cnt_dot_pattern;
        }
        iter_segments.enumerate().all(|(idx, segment)| {
            !segment.starts_with('.') || self.l_segments_dot.get(idx).copied().unwrap_or(false)
        })
    }

    fn is_match(&self, path_relative: &str, name_base: &str) -> bool {
        let path_candidate = if self.if_match_base {
            name_base
        } else {
            path_relative
        };
        self._allows_dot_segments(path_candidate) && self.matcher.is_match(path_candidate)
    }
}

#[derive(Debug, Clone)]
enum TypeIgnorePatternSeq {
    Literal(Vec<String>),
    Glob(Vec<SpecGlobIgnore>),
    Regex(Vec<Regex>),
}

/// Compiled ignore list.
///
/// Glob patterns without a `/` are matched against the final path segment,
/// others against the whole `/`-separated relative path. A segment starting
/// with `.` is only matched by a pattern segment that starts with `.` too.
#[derive(Debug, Clone, Default)]
pub struct SpecIgnorePatterns {
    patterns: Option<TypeIgnorePatternSeq>,
}

impl SpecIgnorePatterns {
    /// Compile `patterns` under `rule_pattern`. `None` or empty never ignores.
    pub fn from_raw(
        patterns: Option<&[String]>,
        rule_pattern: EnumAssetPatternMode,
    ) -> Result<Self, CopyAssetsError> {
        Ok(Self {
            patterns: _compile(patterns, rule_pattern)?,
        })
    }

    /// Whether `path_relative` matches any ignore pattern.
    pub fn is_ignored(&self, path_relative: &str) -> bool {
        let Some(patterns) = self.patterns.as_ref() else {
            return false;
        };
        match patterns {
            TypeIgnorePatternSeq::Literal(v) => v.iter().any(|p| path_relative.contains(p)),
            TypeIgnorePatternSeq::Regex(v) => v.iter().any(|p| p.is_match(path_relative)),
            TypeIgnorePatternSeq::Glob(v) => {
                let name_base = path_relative.rsplit('/').next().unwrap_or(path_relative);
                v.iter().any(|p| p.is_match(path_relative, name_base))
            }
        }
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumAssetPatternMode,
) -> Result<Option<TypeIgnorePatternSeq>, CopyAssetsError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumAssetPatternMode::Literal => {
            Ok(Some(TypeIgnorePatternSeq::Literal(patterns.to_vec())))
        }
        EnumAssetPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| CopyAssetsError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?
                    .compile_matcher();
                l_glob.push(SpecGlobIgnore {
                    matcher,
                    if_match_base: !pattern.contains('/'),
                    if_globstar: pattern.split('/').any(|s| s == "**"),
                    l_segments_dot: pattern.split('/').map(|s| s.starts_with('.')).collect(),
                });
            }
            Ok(Some(TypeIgnorePatternSeq::Glob(l_glob)))
        }
        EnumAssetPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| CopyAssetsError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                l_regex.push(regex);
            }
            Ok(Some(TypeIgnorePatternSeq::Regex(l_regex)))
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _derive_base_name(path_src: &Path) -> PathBuf {
    match path_src.file_name() {
        Some(name) => PathBuf::from(name),
        None => path_src.to_path_buf(),
    }
}

fn _is_dir_like(dest: &str) -> bool {
    Path::new(dest).extension().is_none() || dest.ends_with('/') || dest.ends_with(MAIN_SEPARATOR)
}

/// Lexically drop `.` components and fold `..` into a preceding normal component.
fn _normalize_lexically(path: &Path) -> PathBuf {
    let mut path_out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(path_out.components().next_back(), Some(Component::Normal(_))) {
                    path_out.pop();
                } else {
                    path_out.push(component.as_os_str());
                }
            }
            _ => path_out.push(component.as_os_str()),
        }
    }
    path_out
}

/// Final destination of a file source declared with `dest` / `to_type`.
///
/// # Rules
/// 1. `to_type == File`: `dest` verbatim, or the source base name when empty.
/// 2. `to_type == Dir`, or `dest` has no extension, or ends in a separator:
///    `dest` joined with the source base name.
/// 3. Otherwise `dest`, or the source base name when empty.
///
/// Rule 2 treats an extensionless filename such as `LICENSE` as a directory.
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use axiomkit_io_assets::resolve_destination;
///
/// let src = Path::new("a/b.txt");
/// assert_eq!(resolve_destination(src, "", None), PathBuf::from("b.txt"));
/// assert_eq!(resolve_destination(src, "out", None), PathBuf::from("out/b.txt"));
/// assert_eq!(resolve_destination(src, "out.txt", None), PathBuf::from("out.txt"));
/// ```
pub fn resolve_destination(
    path_src: &Path,
    dest: &str,
    to_type: Option<EnumAssetToType>,
) -> PathBuf {
    let name_base = _derive_base_name(path_src);
    if to_type != Some(EnumAssetToType::File)
        && (to_type == Some(EnumAssetToType::Dir) || _is_dir_like(dest))
    {
        return _normalize_lexically(&Path::new(dest).join(name_base));
    }
    if dest.is_empty() {
        return name_base;
    }
    PathBuf::from(dest)
}

/// Destination of a walked file: `relative` under `dest_prefix`, never rooted.
pub fn derive_walked_destination(dest_prefix: &str, path_relative: &Path) -> PathBuf {
    let path_dst = _normalize_lexically(&Path::new(dest_prefix).join(path_relative));
    match path_dst.strip_prefix(Component::RootDir) {
        Ok(v) => v.to_path_buf(),
        Err(_) => path_dst,
    }
}

/// `/`-separated path of `path_file` relative to `path_dir_root`.
pub(crate) fn derive_relative_path(path_file: &Path, path_dir_root: &Path) -> String {
    let path_rel = path_file.strip_prefix(path_dir_root).unwrap_or(path_file);
    path_rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Staleness

/// Whether an entry must be (re)materialized.
///
/// A forced entry is always written. An existing, unforced entry is kept
/// (first writer wins). Otherwise the source is written when no batch has
/// completed yet or when its mtime is strictly newer than the last completed
/// batch.
pub fn should_write(
    if_exists: bool,
    if_force: bool,
    time_mtime: FileTime,
    time_last_batch: Option<FileTime>,
) -> bool {
    if if_force {
        return true;
    }
    if if_exists {
        return false;
    }
    match time_last_batch {
        None => true,
        Some(time_baseline) => time_mtime > time_baseline,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use filetime::FileTime;

    use super::{
        SpecIgnorePatterns, calculate_worker_limit, derive_relative_path,
        derive_walked_destination, resolve_destination, should_write,
    };
    use crate::spec::{CopyAssetsError, EnumAssetPatternMode, EnumAssetToType};

    fn glob_ignore(patterns: &[&str]) -> SpecIgnorePatterns {
        let l_raw = patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        SpecIgnorePatterns::from_raw(Some(l_raw.as_slice()), EnumAssetPatternMode::Glob)
            .expect("compile ignore list")
    }

    #[test]
    fn ignore_absent_or_empty_never_matches() {
        let spec_none = SpecIgnorePatterns::from_raw(None, EnumAssetPatternMode::Glob)
            .expect("compile none");
        assert!(!spec_none.is_ignored("a/b.tmp"));

        let spec_empty = SpecIgnorePatterns::from_raw(Some(&[][..]), EnumAssetPatternMode::Glob)
            .expect("compile empty");
        assert!(!spec_empty.is_ignored("a/b.tmp"));
    }

    #[test]
    fn ignore_glob_without_slash_matches_base_name() {
        let spec_ignore = glob_ignore(&["*.tmp"]);
        assert!(spec_ignore.is_ignored("skip.tmp"));
        assert!(spec_ignore.is_ignored("deep/nested/skip.tmp"));
        assert!(!spec_ignore.is_ignored("img/a.png"));
        assert!(!spec_ignore.is_ignored("tmp/a.png"));
    }

    #[test]
    fn ignore_glob_with_slash_matches_whole_path() {
        let spec_ignore = glob_ignore(&["img/*.png"]);
        assert!(spec_ignore.is_ignored("img/a.png"));
        assert!(!spec_ignore.is_ignored("other/img/a.png"));
        assert!(!spec_ignore.is_ignored("img/sub/a.png"));

        let spec_deep = glob_ignore(&["img/**/*.png"]);
        assert!(spec_deep.is_ignored("img/sub/a.png"));
    }

    #[test]
    fn ignore_any_pattern_in_list_matches() {
        let spec_ignore = glob_ignore(&["*.map", "*.tmp"]);
        assert!(spec_ignore.is_ignored("app.js.map"));
        assert!(spec_ignore.is_ignored("x.tmp"));
        assert!(!spec_ignore.is_ignored("app.js"));
    }

    #[test]
    fn ignore_glob_skips_dotfiles_like_minimatch() {
        let spec_star = glob_ignore(&["*", "*.map"]);
        assert!(spec_star.is_ignored("a.map"));
        assert!(!spec_star.is_ignored(".gitkeep"));
        assert!(!spec_star.is_ignored("sub/.hidden.map"));

        let spec_dot = glob_ignore(&[".gitkeep", ".*"]);
        assert!(spec_dot.is_ignored("sub/.gitkeep"));
        assert!(spec_dot.is_ignored(".env"));
        assert!(!spec_dot.is_ignored("env"));

        let spec_dir = glob_ignore(&["src/*"]);
        assert!(spec_dir.is_ignored("src/main.js"));
        assert!(!spec_dir.is_ignored("src/.env"));
        assert!(glob_ignore(&["src/.*"]).is_ignored("src/.env"));

        let spec_deep = glob_ignore(&["**/*.map"]);
        assert!(spec_deep.is_ignored("x/a.map"));
        assert!(!spec_deep.is_ignored(".cache/a.map"));
        assert!(glob_ignore(&["**/.cache/**"]).is_ignored("a/.cache/b.map"));
    }

    #[test]
    fn ignore_regex_and_literal_modes() {
        let l_regex = vec![r"\.bak$".to_string()];
        let spec_regex =
            SpecIgnorePatterns::from_raw(Some(l_regex.as_slice()), EnumAssetPatternMode::Regex)
                .expect("compile regex");
        assert!(spec_regex.is_ignored("a/b.bak"));
        assert!(!spec_regex.is_ignored("a/b.bak.txt"));

        let l_literal = vec!["drafts/".to_string()];
        let spec_literal =
            SpecIgnorePatterns::from_raw(Some(l_literal.as_slice()), EnumAssetPatternMode::Literal)
                .expect("compile literal");
        assert!(spec_literal.is_ignored("docs/drafts/x.md"));
        assert!(!spec_literal.is_ignored("docs/x.md"));
    }

    #[test]
    fn ignore_invalid_patterns_rejected() {
        let l_glob = vec!["[".to_string()];
        let err =
            SpecIgnorePatterns::from_raw(Some(l_glob.as_slice()), EnumAssetPatternMode::Glob)
                .expect_err("invalid glob");
        assert!(matches!(err, CopyAssetsError::InvalidPattern { .. }));

        let l_regex = vec!["(".to_string()];
        let err =
            SpecIgnorePatterns::from_raw(Some(l_regex.as_slice()), EnumAssetPatternMode::Regex)
                .expect_err("invalid regex");
        assert!(matches!(err, CopyAssetsError::InvalidPattern { .. }));
    }

    #[test]
    fn resolve_destination_inference_cases() {
        let src = Path::new("a/b.txt");
        assert_eq!(resolve_destination(src, "", None), PathBuf::from("b.txt"));
        assert_eq!(resolve_destination(src, "out/", None), PathBuf::from("out/b.txt"));
        assert_eq!(resolve_destination(src, "out", None), PathBuf::from("out/b.txt"));
        assert_eq!(resolve_destination(src, "out.txt", None), PathBuf::from("out.txt"));
        assert_eq!(
            resolve_destination(src, "out", Some(EnumAssetToType::File)),
            PathBuf::from("out")
        );
    }

    #[test]
    fn resolve_destination_explicit_types_override_inference() {
        let src = Path::new("a/b.txt");
        assert_eq!(
            resolve_destination(src, "out.d", Some(EnumAssetToType::Dir)),
            PathBuf::from("out.d/b.txt")
        );
        assert_eq!(
            resolve_destination(src, "", Some(EnumAssetToType::File)),
            PathBuf::from("b.txt")
        );
        assert_eq!(
            resolve_destination(src, "out.d/", None),
            PathBuf::from("out.d/b.txt")
        );
        assert_eq!(
            resolve_destination(src, "./out/", None),
            PathBuf::from("out/b.txt")
        );
    }

    #[test]
    fn walked_destination_strips_leading_separator() {
        let path_rel = Path::new("img/a.png");
        assert_eq!(
            derive_walked_destination("static/", path_rel),
            PathBuf::from("static/img/a.png")
        );
        assert_eq!(derive_walked_destination("", path_rel), PathBuf::from("img/a.png"));
        assert_eq!(derive_walked_destination("/", path_rel), PathBuf::from("img/a.png"));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let path_root = Path::new("/base/assets");
        let path_file = path_root.join("img").join("a.png");
        assert_eq!(derive_relative_path(&path_file, path_root), "img/a.png");
    }

    #[test]
    fn should_write_follows_staleness_rules() {
        let t_old = FileTime::from_unix_time(1_700_000_000, 0);
        let t_new = FileTime::from_unix_time(1_700_000_100, 0);

        assert!(should_write(false, false, t_old, None));
        assert!(should_write(false, false, t_new, Some(t_old)));
        assert!(!should_write(false, false, t_old, Some(t_old)));
        assert!(!should_write(false, false, t_old, Some(t_new)));
        assert!(!should_write(true, false, t_new, None));
        assert!(should_write(true, true, t_new, Some(t_old)));
        assert!(should_write(true, true, t_old, Some(t_new)));
    }

    #[test]
    fn worker_limit_is_clamped() {
        assert_eq!(calculate_worker_limit(Some(0)), 1);
        assert!(calculate_worker_limit(None) >= 1);
        assert!(calculate_worker_limit(None) <= 8);
    }
}
