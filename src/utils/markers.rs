//! Inline citation markers (`[1]`, `[2]`, ...)

use regex::{Captures, Regex};
use std::sync::LazyLock;

// A marker already followed by `(` is a Markdown link and is left alone.
static CITATION_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3})\](\()?").ok());

/// All 1-based citation ids referenced in `text`, in order of appearance.
pub fn citation_ids(text: &str) -> Vec<usize> {
    let Some(re) = CITATION_MARKER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter(|c| c.get(2).is_none())
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Rewrite bare markers as `[n](<url>)` where `url_for(n)` knows the source.
pub fn link_citations<F>(text: &str, url_for: F) -> String
where
    F: Fn(usize) -> Option<String>,
{
    let Some(re) = CITATION_MARKER.as_ref() else {
        return text.to_string();
    };
    re.replace_all(text, |c: &Captures| {
        if c.get(2).is_some() {
            return c[0].to_string();
        }
        match c[1].parse::<usize>().ok().and_then(&url_for) {
            Some(url) => format!("[{}](<{}>)", &c[1], url),
            None => c[0].to_string(),
        }
    })
    .into_owned()
}

/// Rewrite bare marker ids through `map`; markers it rejects are removed.
///
/// A removed marker takes the whitespace before it along when it is
/// followed by whitespace or punctuation. Other text is left untouched.
pub fn renumber_citations<F>(text: &str, map: F) -> String
where
    F: Fn(usize) -> Option<usize>,
{
    let Some(re) = CITATION_MARKER.as_ref() else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for c in re.captures_iter(text) {
        let Some(marker) = c.get(0) else { continue };
        out.push_str(&text[last..marker.start()]);
        last = marker.end();
        if c.get(2).is_some() {
            out.push_str(marker.as_str());
            continue;
        }
        match c[1].parse::<usize>().ok().and_then(&map) {
            Some(id) => out.push_str(&format!("[{}]", id)),
            None => {
                let joins = text[last..]
                    .chars()
                    .next()
                    .map_or(true, |ch| ch.is_whitespace() || matches!(ch, '.' | ',' | ';' | ':'));
                if joins {
                    out.truncate(out.trim_end().len());
                }
            }
        }
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_ids() {
        assert_eq!(citation_ids("a [1] b [12], c [x] [3](http://y)"), vec![1, 12]);
        assert!(citation_ids("none here").is_empty());
    }

    #[test]
    fn test_link_citations() {
        let linked = link_citations("Costs fell [1] and rose [4]. See [2](<a>).", |n| {
            (n == 1).then(|| "https://iea.org".to_string())
        });
        assert_eq!(
            linked,
            "Costs fell [1](<https://iea.org>) and rose [4]. See [2](<a>)."
        );
    }

    #[test]
    fn test_renumber_citations() {
        let text = "Wind grew [3] while solar stalled [9].";
        let renumbered = renumber_citations(text, |n| (n == 3).then_some(1));
        assert_eq!(renumbered, "Wind grew [1] while solar stalled.");
    }

    #[test]
    fn test_renumber_leaves_unmarked_text_alone() {
        let text = "Teams use .NET , Go and  Rust [4].";
        assert_eq!(
            renumber_citations(text, |_| None),
            "Teams use .NET , Go and  Rust."
        );
        assert_eq!(renumber_citations(text, |n| Some(n - 3)), "Teams use .NET , Go and  Rust [1].");
    }

    #[test]
    fn test_renumber_removes_adjacent_markers() {
        let text = "[7] Costs fell [2] [8], then rose [9] again";
        assert_eq!(renumber_citations(text, |n| (n == 2).then_some(1)), "Costs fell [1], then rose again");
    }
}
