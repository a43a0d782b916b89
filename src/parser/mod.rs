pub mod blocks;
pub mod extract;
pub mod sections;

use crate::db::FetchedPost;
use extract::HookRecord;

/// Rendered post → blocks → sections → hook records.
pub fn process_post(post: &FetchedPost) -> Vec<HookRecord> {
    let blocks = blocks::from_html(&post.html);
    extract::extract_records(&post.url, &blocks)
}
