use tracing::debug;

use super::blocks::Block;

/// A heading and the text blocks that follow it, up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub heading: &'a str,
    pub body: Vec<&'a str>,
}

/// Split a post's blocks into sections, one per heading after the first.
///
/// The first heading is the article title and never opens a section; text
/// before the second heading belongs to no section and is dropped.
pub fn segment(blocks: &[Block]) -> Vec<Section<'_>> {
    let mut sections: Vec<Section> = Vec::new();
    let mut seen_title = false;

    for block in blocks {
        match block {
            Block::Heading { .. } if !seen_title => seen_title = true,
            Block::Heading { level, text } => {
                debug!(?level, heading = %text, "Opening section");
                sections.push(Section {
                    heading: text,
                    body: Vec::new(),
                });
            }
            Block::Text(text) => {
                if let Some(current) = sections.last_mut() {
                    current.body.push(text);
                }
            }
        }
    }

    sections
}
