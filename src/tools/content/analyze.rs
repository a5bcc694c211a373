//! Content analysis tool
//!
//! Summarises page text the browser tools returned: basic counts, links,
//! heading-like lines and the sentences most relevant to a query. Pure; it
//! never touches the browser.

use serde::{Deserialize, Serialize};
use url::Url;

/// Sentences returned when no query is given
const LEAD_SENTENCES: usize = 3;

/// Most relevant sentences returned for a query
const MAX_MATCHES: usize = 5;

/// Lines longer than this are never treated as headings
const MAX_HEADING_CHARS: usize = 80;

/// Arguments of `analyze_content`
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeArgs {
    pub content: String,
    #[serde(default)]
    pub query: Option<String>,
}

/// What `analyze_content` found
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentAnalysis {
    pub characters: usize,
    pub words: usize,
    pub sentences: usize,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    /// Leading sentences, or the best matches when a query was given
    pub highlights: Vec<String>,
}

impl ContentAnalysis {
    /// Plain-text rendering fed back to the oracle
    pub fn render(&self, query: Option<&str>) -> String {
        let mut out = format!(
            "{} characters, {} words, {} sentences\n",
            self.characters, self.words, self.sentences
        );

        if !self.headings.is_empty() {
            out.push_str("\nHeadings:\n");
            for heading in &self.headings {
                out.push_str(&format!("- {}\n", heading));
            }
        }

        if !self.links.is_empty() {
            out.push_str("\nLinks:\n");
            for link in &self.links {
                out.push_str(&format!("- {}\n", link));
            }
        }

        match query {
            Some(query) if self.highlights.is_empty() => {
                out.push_str(&format!("\nNothing matched \"{}\".\n", query));
            }
            Some(query) => {
                out.push_str(&format!("\nMost relevant to \"{}\":\n", query));
                for sentence in &self.highlights {
                    out.push_str(&format!("- {}\n", sentence));
                }
            }
            None if !self.highlights.is_empty() => {
                out.push_str("\nSummary:\n");
                out.push_str(&self.highlights.join(" "));
                out.push('\n');
            }
            None => {}
        }

        out
    }
}

/// Analyse `content`, ranking sentences against `query` when given.
pub fn analyze(content: &str, query: Option<&str>) -> ContentAnalysis {
    let sentences = split_sentences(content);
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    let highlights = match query {
        Some(query) => rank_sentences(&sentences, query),
        None => sentences.iter().take(LEAD_SENTENCES).cloned().collect(),
    };

    ContentAnalysis {
        characters: content.chars().count(),
        words: content.split_whitespace().count(),
        sentences: sentences.len(),
        headings: headings(content),
        links: links(content),
        highlights,
    }
}

fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for line in content.lines().map(str::trim) {
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            if word.ends_with(['.', '!', '?']) {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }

        // Trailing fragments count unless they look like headings
        if !current.is_empty() && !current.starts_with('#') && !is_title_line(&current) {
            push_sentence(&mut sentences, &current);
        }
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, sentence: &str) {
    if sentence.split_whitespace().count() > 1 {
        sentences.push(sentence.to_string());
    }
}

fn terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn rank_sentences(sentences: &[String], query: &str) -> Vec<String> {
    let terms = terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize, &String)> = sentences
        .iter()
        .enumerate()
        .filter_map(|(idx, sentence)| {
            let lower = sentence.to_lowercase();
            let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
            (hits > 0).then_some((hits, idx, sentence))
        })
        .collect();

    // Highest score first, document order breaks ties
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(MAX_MATCHES)
        .map(|(_, _, s)| s.clone())
        .collect()
}

fn headings(content: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for line in content.lines().map(str::trim) {
        let heading = if let Some(stripped) = line.strip_prefix('#') {
            stripped.trim_start_matches('#').trim()
        } else if is_title_line(line) {
            line
        } else {
            continue;
        };

        if !heading.is_empty() && !found.iter().any(|h| h == heading) {
            found.push(heading.to_string());
        }
    }
    found
}

fn is_title_line(line: &str) -> bool {
    let words = line.split_whitespace().count();
    (1..=10).contains(&words)
        && line.chars().count() <= MAX_HEADING_CHARS
        && line.chars().next().is_some_and(char::is_uppercase)
        && !line.ends_with(['.', '!', '?', ',', ':', ';'])
        && !line.contains("://")
}

fn links(content: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in content.split_whitespace() {
        let token = token.trim_matches(|c: char| matches!(c, '(' | ')' | '<' | '>' | '"' | '\'' | ',' | '.'));
        if !(token.starts_with("http://") || token.starts_with("https://")) {
            continue;
        }
        if let Ok(url) = Url::parse(token) {
            let link = url.to_string();
            if !found.contains(&link) {
                found.push(link);
            }
        }
    }
    found
}
