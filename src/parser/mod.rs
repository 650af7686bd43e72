pub mod html;

use html::{attr, class_blocks, tag_with_attr, text};

/// One quote block as it appears in the listing markup, before any storage
/// decisions are made.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub text: String,
    pub author: String,
    pub tags: Vec<String>,
}

#[derive(Debug)]
pub struct ListingPage {
    pub quotes: Vec<RawQuote>,
    pub has_next: bool,
}

/// Parses one listing page into its quote blocks plus whether the pager
/// advertises a further page. Markup without quote blocks is not an error,
/// it just yields an empty page.
pub fn parse_listing_page(page: &str) -> ListingPage {
    let quotes = class_blocks(page, "div", "quote")
        .into_iter()
        .filter_map(parse_quote_block)
        .collect();
    ListingPage {
        quotes,
        has_next: !class_blocks(page, "li", "next").is_empty(),
    }
}

/// A block missing its text span or author element is dropped rather than
/// ingested half-empty. Tag names come from the keywords meta verbatim: the
/// comma split does not trim, and a block without the meta has no tags.
fn parse_quote_block(block: &str) -> Option<RawQuote> {
    let text_el = class_blocks(block, "span", "text").into_iter().next()?;
    let author_el = class_blocks(block, "small", "author").into_iter().next()?;
    let tags = match tag_with_attr(block, "meta", "itemprop", "keywords").and_then(|t| attr(t, "content")) {
        Some(content) => html::decode_entities(content)
            .split(',')
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    Some(RawQuote {
        text: text(text_el),
        author: text(author_el),
        tags,
    })
}
