//! Atom 1.0 rendering.

use super::{FeedMeta, article_date, entry_html, write_text_element};
use crate::dates::format_iso;
use crate::models::Article;
use crate::utils::upcase;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Render `articles` as an Atom document.
///
/// Each entry uses the article URL as its id, the article date for both
/// `published` and `updated`, and carries the listing source as a category.
pub fn render(articles: &[Article], meta: &FeedMeta, now: DateTime<Utc>) -> Result<String, Box<dyn Error>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    feed.push_attribute(("xml:lang", meta.language.as_str()));
    writer.write_event(Event::Start(feed))?;

    write_text_element(&mut writer, "id", &meta.id)?;
    write_text_element(&mut writer, "title", &meta.title)?;
    write_text_element(&mut writer, "updated", &format_iso(now))?;
    writer.write_event(Event::Start(BytesStart::new("author")))?;
    write_text_element(&mut writer, "name", &meta.author)?;
    writer.write_event(Event::End(BytesEnd::new("author")))?;
    write_link(&mut writer, &meta.feed_url, "self")?;
    write_link(&mut writer, &meta.site_url, "alternate")?;

    for article in articles {
        let date = format_iso(article_date(article, now));
        writer.write_event(Event::Start(BytesStart::new("entry")))?;
        write_text_element(&mut writer, "id", &article.url)?;
        write_text_element(&mut writer, "title", &article.title)?;
        write_text_element(&mut writer, "updated", &date)?;
        write_text_element(&mut writer, "published", &date)?;
        write_link(&mut writer, &article.url, "alternate")?;

        let source = article.source.as_str();
        let mut category = BytesStart::new("category");
        category.push_attribute(("term", source));
        category.push_attribute(("label", upcase(source).as_str()));
        writer.write_event(Event::Empty(category))?;

        let mut content = BytesStart::new("content");
        content.push_attribute(("type", "html"));
        writer.write_event(Event::Start(content))?;
        writer.write_event(Event::Text(BytesText::new(&entry_html(article))))?;
        writer.write_event(Event::End(BytesEnd::new("content")))?;

        writer.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("feed")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_link(writer: &mut Writer<Vec<u8>>, href: &str, rel: &str) -> Result<(), Box<dyn Error>> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("href", href));
    link.push_attribute(("rel", rel));
    writer.write_event(Event::Empty(link))?;
    Ok(())
}
