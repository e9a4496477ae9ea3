use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::ApiProbeError;
use crate::models::DocumentationChunk;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|head)\b[^>]*>.*?</(script|style|nav|footer|head)>").unwrap()
});
static HEADING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]>").unwrap()
});
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/li|/tr|/pre|/section|/article)\b[^>]*>").unwrap()
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").unwrap());

/// Result of loading the configured documentation sources.
#[derive(Debug, Default)]
pub struct LoadedDocumentation {
    pub chunks: Vec<DocumentationChunk>,
    /// One entry per source that could not be loaded.
    pub warnings: Vec<String>,
}

/// Fetch (http/https) or read (file path) each source and chunk it. A failing
/// source is reported as a warning; the rest still load.
pub async fn load_sources(sources: &[String], chunk_size: usize) -> LoadedDocumentation {
    let mut loaded = LoadedDocumentation::default();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .ok();

    for source in sources {
        let text = if source.starts_with("http://") || source.starts_with("https://") {
            match &client {
                Some(client) => fetch(client, source).await,
                None => Err(ApiProbeError::Internal("HTTP client unavailable".into())),
            }
        } else {
            tokio::fs::read_to_string(source).await.map_err(ApiProbeError::from)
        };

        match text {
            Ok(text) => {
                let text = if looks_like_html(source, &text) { html_to_text(&text) } else { text };
                let before = loaded.chunks.len();
                loaded.chunks.extend(chunk_text(source, &text, chunk_size, before));
                info!(source = %source, chunks = loaded.chunks.len() - before, "Loaded documentation source");
            }
            Err(e) => loaded.warnings.push(format!("documentation source {} failed to load: {}", source, e)),
        }
    }
    loaded
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String, ApiProbeError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiProbeError::Internal(format!("HTTP {}", status)));
    }
    Ok(resp.text().await?)
}

fn looks_like_html(source: &str, text: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") {
        return true;
    }
    let head = text.trim_start();
    head.starts_with("<!") || head.to_ascii_lowercase().starts_with("<html")
}

/// Reduce HTML to text, keeping headings as Markdown `#` lines so chunking can
/// split on them.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, " ");
    let text = HEADING_TAG.replace_all(&text, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        let inner = ANY_TAG.replace_all(&caps[2], "");
        format!("\n\n{} {}\n\n", "#".repeat(level), inner.trim())
    });
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Split text on Markdown headings, then pack paragraphs into chunks of at
/// most `chunk_size` characters. Indexes start at `first_index`.
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, first_index: usize) -> Vec<DocumentationChunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    // Heading trail by level, used for the section label.
    let mut trail: Vec<(usize, String)> = Vec::new();
    let mut body = String::new();

    let flush = |body: &mut String, trail: &[(usize, String)], chunks: &mut Vec<DocumentationChunk>| {
        let heading = trail.last().map(|(_, h)| h.clone());
        let section = (!trail.is_empty())
            .then(|| trail.iter().map(|(_, h)| h.as_str()).collect::<Vec<_>>().join(" > "));
        for piece in pack_paragraphs(body, chunk_size) {
            let text = match &heading {
                Some(h) => format!("{}\n\n{}", h, piece),
                None => piece,
            };
            chunks.push(DocumentationChunk {
                index: first_index + chunks.len(),
                source: source.to_string(),
                text,
                embedding: Vec::new(),
                section: section.clone(),
                heading: heading.clone(),
            });
        }
        body.clear();
    };

    for line in text.lines() {
        if let Some((level, title)) = markdown_heading(line) {
            flush(&mut body, &trail, &mut chunks);
            trail.retain(|(l, _)| *l < level);
            trail.push((level, title.to_string()));
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(&mut body, &trail, &mut chunks);

    debug!(source, chunks = chunks.len(), "Chunked documentation");
    chunks
}

fn markdown_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

fn pack_paragraphs(body: &str, chunk_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for paragraph in body.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        // Oversized paragraphs are split on character boundaries.
        let pieces: Vec<String> = if paragraph.chars().count() > chunk_size {
            paragraph.chars().collect::<Vec<_>>()
                .chunks(chunk_size)
                .map(|c| c.iter().collect())
                .collect()
        } else {
            vec![paragraph.to_string()]
        };

        for piece in pieces {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 2 + piece.chars().count()
            };
            if needed > chunk_size && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
