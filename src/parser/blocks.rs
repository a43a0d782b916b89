use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static INLINE_LINKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").unwrap());

static CONTENT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".entry-content").unwrap());
static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    One,
    Two,
}

/// One element of a post's flattened content, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: HeadingLevel, text: String },
    Text(String),
}

impl Block {
    pub fn heading(level: HeadingLevel, text: &str) -> Self {
        Block::Heading {
            level,
            text: text.trim().to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Block::Text(text.trim().to_string())
    }
}

/// Flatten the `.entry-content` root of a rendered post into blocks.
///
/// `h1`/`h2` become headings. Wrapper elements that hold a heading are
/// descended into so headings keep their document position; every other
/// element becomes one text block. Loose text nodes are ignored.
pub fn from_html(html: &str) -> Vec<Block> {
    let doc = Html::parse_document(html);
    let Some(content) = doc.select(&CONTENT_SEL).next() else {
        warn!("No .entry-content found in document");
        return Vec::new();
    };

    let mut blocks = Vec::new();
    push_children(content, &mut blocks);
    blocks
}

fn push_children(parent: ElementRef, blocks: &mut Vec<Block>) {
    for child in parent.children().filter_map(ElementRef::wrap) {
        let text = || child.text().collect::<String>();
        match child.value().name() {
            "h1" => blocks.push(Block::heading(HeadingLevel::One, &text())),
            "h2" => blocks.push(Block::heading(HeadingLevel::Two, &text())),
            _ if child.select(&HEADING_SEL).next().is_some() => push_children(child, blocks),
            _ => blocks.push(Block::text(&text())),
        }
    }
}

/// Line-oriented block split for markdown renditions of a post.
pub fn from_markdown(markdown: &str) -> Vec<Block> {
    markdown
        .lines()
        .map(|raw| {
            let line = IMAGE_RE.replace_all(raw.trim(), "");
            let line = INLINE_LINKS_RE.replace_all(&line, "$1");

            match HEADING_RE.captures(line.trim()) {
                Some(caps) => match caps[1].len() {
                    1 => Block::heading(HeadingLevel::One, &caps[2]),
                    2 => Block::heading(HeadingLevel::Two, &caps[2]),
                    _ => Block::text(&caps[2]),
                },
                None => Block::text(&line),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(blocks: &[Block]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text(t) => Some(t.as_str()),
                Block::Heading { .. } => None,
            })
            .collect()
    }

    #[test]
    fn html_headings_and_paragraphs() {
        let html = r#"<html><body><div class="entry-content">
            <h1>Issue 42</h1>
            <p>  Intro paragraph  </p>
            <h2>Hook 1</h2>
            <p>Title: Big Secret</p>
            <h3>Framework: Curiosity Gap</h3>
        </div></body></html>"#;
        let blocks = from_html(html);
        assert_eq!(
            blocks,
            vec![
                Block::heading(HeadingLevel::One, "Issue 42"),
                Block::text("Intro paragraph"),
                Block::heading(HeadingLevel::Two, "Hook 1"),
                Block::text("Title: Big Secret"),
                Block::text("Framework: Curiosity Gap"),
            ]
        );
    }

    #[test]
    fn html_without_content_root() {
        let blocks = from_html("<html><body><h1>Nope</h1><p>text</p></body></html>");
        assert!(blocks.is_empty());
    }

    #[test]
    fn html_wrapped_heading_keeps_position() {
        let html = r#"<div class="entry-content">
            <h1>Title</h1>
            <div class="wp-block-group"><h2>Hook 1</h2><p>Framework: X</p></div>
            <p>after</p>
        </div>"#;
        let blocks = from_html(html);
        assert_eq!(blocks[1], Block::heading(HeadingLevel::Two, "Hook 1"));
        assert_eq!(texts(&blocks), vec!["Framework: X", "after"]);
    }

    #[test]
    fn html_loose_text_nodes_ignored() {
        let html = r#"<div class="entry-content">stray<h1>T</h1>more<p>kept</p></div>"#;
        let blocks = from_html(html);
        assert_eq!(texts(&blocks), vec!["kept"]);
    }

    #[test]
    fn html_empty_paragraph_is_kept() {
        let html = r#"<div class="entry-content"><h1>T</h1><p>   </p></div>"#;
        let blocks = from_html(html);
        assert_eq!(blocks[1], Block::Text(String::new()));
    }

    #[test]
    fn markdown_heading_levels() {
        let blocks = from_markdown("# Issue\n## Hook 1\n### Detail\ntext");
        assert_eq!(blocks[0], Block::heading(HeadingLevel::One, "Issue"));
        assert_eq!(blocks[1], Block::heading(HeadingLevel::Two, "Hook 1"));
        assert_eq!(blocks[2], Block::text("Detail"));
        assert_eq!(blocks[3], Block::text("text"));
    }

    #[test]
    fn markdown_strips_images_and_links() {
        let blocks = from_markdown("![cover](https://x/y.png)\nTitle: [Big Secret](https://yt.be/1)");
        assert_eq!(blocks[0], Block::Text(String::new()));
        assert_eq!(blocks[1], Block::text("Title: Big Secret"));
    }

    #[test]
    fn markdown_blank_lines_become_empty_text() {
        let blocks = from_markdown("a\n\nb");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], Block::Text(String::new()));
    }

    #[test]
    fn post_fixture_blocks() {
        let html = std::fs::read_to_string("tests/fixtures/post.html").unwrap();
        let blocks = from_html(&html);
        let headings = blocks
            .iter()
            .filter(|b| matches!(b, Block::Heading { .. }))
            .count();
        assert_eq!(headings, 6);
        assert!(matches!(&blocks[0], Block::Heading { level: HeadingLevel::One, .. }));
    }
}
