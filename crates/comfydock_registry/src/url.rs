use regex::Regex;
use std::sync::OnceLock;

/// Normalize any GitHub repository reference to the canonical
/// `https://github.com/<owner>/<repo>` form: `.git` suffixes and trailing
/// slashes are stripped, SSH forms are rewritten to HTTPS, and the host is
/// lowercased. Non-GitHub URLs are returned with only the `.git` suffix
/// stripped.
pub fn normalize_github_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let without_git = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    // scp-like SSH form: git@github.com:owner/repo
    if let Some(path) = without_git.strip_prefix("git@github.com:") {
        return format!("https://github.com/{}", path.trim_matches('/'));
    }
    // ssh://git@github.com/owner/repo
    if let Some(path) = without_git.strip_prefix("ssh://git@github.com/") {
        return format!("https://github.com/{}", path.trim_matches('/'));
    }

    if let Ok(mut parsed) = url::Url::parse(without_git) {
        let host = parsed.host_str().map(str::to_lowercase);
        if matches!(host.as_deref(), Some("github.com") | Some("www.github.com")) {
            let segments: Vec<&str> = parsed
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).collect())
                .unwrap_or_default();
            if segments.len() >= 2 {
                return format!("https://github.com/{}/{}", segments[0], segments[1]);
            }
        }
        // Lowercase the host of non-GitHub URLs for stable comparison.
        if let Some(host) = host {
            let _ = parsed.set_host(Some(&host));
            return parsed.to_string().trim_end_matches('/').to_string();
        }
    }

    without_git.to_string()
}

/// Split a GitHub URL into `(owner, repo, optional ref)`. The ref is an
/// `@<commit-or-tag>` suffix on the repository segment.
pub fn parse_github_url(url: &str) -> Option<(String, String, Option<String>)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:https?://(?:www\.)?github\.com/|git@github\.com:|ssh://git@github\.com/)([^/]+)/([^/@]+?)(?:\.git)?(?:@([^/]+))?/?$",
        )
        .expect("pattern compiles")
    });
    let captures = pattern.captures(url.trim())?;
    Some((
        captures.get(1)?.as_str().to_string(),
        captures.get(2)?.as_str().to_string(),
        captures.get(3).map(|m| m.as_str().to_string()),
    ))
}
