//! Markdown to HTML conversion.
//!
//! CommonMark plus the usual extensions (tables, footnotes, strikethrough,
//! task lists, smart punctuation). Headings without an explicit `{#id}` get
//! an id generated from their text. Raw HTML is passed through untouched.

use super::slug::AnchorSet;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Render markdown text to an HTML fragment.
pub fn to_html(markdown: &str) -> String {
    let mut events: Vec<Event> = Parser::new_ext(markdown, options()).collect();
    assign_heading_ids(&mut events);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Fill in missing heading ids from the heading text.
fn assign_heading_ids(events: &mut [Event]) {
    let mut anchors = AnchorSet::default();

    // Explicit ids win; reserve them first
    for event in events.iter() {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            anchors.reserve(id);
        }
    }

    let mut i = 0;
    while i < events.len() {
        if matches!(events[i], Event::Start(Tag::Heading { id: None, .. })) {
            let mut text = String::new();
            let mut j = i + 1;
            while j < events.len() && !matches!(events[j], Event::End(TagEnd::Heading(_))) {
                if let Event::Text(t) | Event::Code(t) = &events[j] {
                    text.push_str(t);
                }
                j += 1;
            }

            if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
                *id = Some(CowStr::from(anchors.anchor(&text)));
            }
            i = j;
        }
        i += 1;
    }
}
