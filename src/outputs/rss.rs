//! RSS 2.0 rendering.

use super::{FeedMeta, article_date, write_text_element};
use crate::models::Article;
use crate::utils::upcase;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Render `articles` as an RSS 2.0 channel.
///
/// Items carry the summary as plain-text `description`, falling back to the
/// source label for articles without one.
pub fn render(articles: &[Article], meta: &FeedMeta, now: DateTime<Utc>) -> Result<String, Box<dyn Error>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    write_text_element(&mut writer, "title", &meta.title)?;
    write_text_element(&mut writer, "link", &meta.site_url)?;
    write_text_element(&mut writer, "description", &meta.title)?;
    write_text_element(&mut writer, "language", &meta.language)?;
    write_text_element(&mut writer, "lastBuildDate", &now.to_rfc2822())?;

    let mut self_link = BytesStart::new("atom:link");
    let rss_url = meta.sibling_url("feed.rss");
    self_link.push_attribute(("href", rss_url.as_str()));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    writer.write_event(Event::Empty(self_link))?;

    for article in articles {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        write_text_element(&mut writer, "title", &article.title)?;
        write_text_element(&mut writer, "link", &article.url)?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "true"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&article.url)))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        write_text_element(&mut writer, "pubDate", &article_date(article, now).to_rfc2822())?;
        write_text_element(&mut writer, "category", &upcase(article.source.as_str()))?;
        let description = match &article.summary {
            Some(summary) => summary.clone(),
            None => format!("Source: {}", article.source),
        };
        write_text_element(&mut writer, "description", &description)?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}
