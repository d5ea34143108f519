//! Newznab search responses: items of the first RSS channel.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Fields of one search result that matter for matching and downloading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewznabItem {
    /// Release title.
    pub title: Option<String>,
    /// Payload size in bytes.
    pub size: Option<u64>,
    /// Download link with HTML entities decoded.
    pub link: Option<String>,
    /// Details page URL, often the announcement id.
    pub guid: Option<String>,
    /// Comments page URL.
    pub comments: Option<String>,
}

impl NewznabItem {
    /// Whether the item's `guid` or `comments` equals `announcement_id` exactly.
    #[must_use]
    pub fn matches(&self, announcement_id: &str) -> bool {
        self.guid.as_deref() == Some(announcement_id)
            || self.comments.as_deref() == Some(announcement_id)
    }

    fn set(&mut self, field: &str, text: String) {
        match field {
            "title" if self.title.is_none() => self.title = Some(text),
            "size" if self.size.is_none() => self.size = text.trim().parse().ok(),
            "link" if self.link.is_none() => {
                self.link = Some(html_escape::decode_html_entities(&text).into_owned());
            }
            "guid" if self.guid.is_none() => self.guid = Some(text),
            "comments" if self.comments.is_none() => self.comments = Some(text),
            _ => {}
        }
    }
}

/// Parse the items that are direct children of the first `channel`.
///
/// # Errors
///
/// Returns the reader error when the document is not well-formed XML.
pub fn parse_first_channel(xml: &str) -> Result<Vec<NewznabItem>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 0_usize;
    let mut channel_depth: Option<usize> = None;
    let mut current: Option<NewznabItem> = None;
    let mut field: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match channel_depth {
                    None if name == "channel" => channel_depth = Some(depth),
                    Some(level) if depth == level + 1 && name == "item" => {
                        current = Some(NewznabItem::default());
                    }
                    Some(level) if depth == level + 2 && current.is_some() => {
                        field = Some(name);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if field.is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(level) = channel_depth {
                    if depth == level + 2 {
                        if let (Some(item), Some(name)) = (current.as_mut(), field.take()) {
                            item.set(&name, std::mem::take(&mut text));
                        }
                    } else if depth == level + 1 {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    } else if depth == level {
                        break;
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// First item of the first channel whose `guid` or `comments` equals `announcement_id`.
///
/// # Errors
///
/// Returns the reader error when the document is not well-formed XML.
pub fn find_announcement(
    xml: &str,
    announcement_id: &str,
) -> Result<Option<NewznabItem>, quick_xml::Error> {
    Ok(parse_first_channel(xml)?
        .into_iter()
        .find(|item| item.matches(announcement_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
  <channel>
    <title>indexer</title>
    <item>
      <title>Other.Movie.1994.720p</title>
      <guid>https://indexer.example/details/1</guid>
      <link>https://indexer.example/dl/1</link>
    </item>
    <item>
      <title>The.Shawshank.Redemption.1994.720p.BluRay.x264</title>
      <guid isPermaLink="true">https://indexer.example/guid/42</guid>
      <comments>https://indexer.example/details/42</comments>
      <size>4700000000</size>
      <link>https://indexer.example/dl/42?apikey=k&amp;amp;file=Shawshank</link>
      <newznab:attr name="imdb" value="0111161"/>
    </item>
  </channel>
  <channel>
    <item>
      <guid>https://indexer.example/details/99</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn items_of_first_channel_are_parsed() -> anyhow::Result<()> {
        let items = parse_first_channel(FEED)?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Other.Movie.1994.720p"));
        assert_eq!(items[1].size, Some(4_700_000_000));
        Ok(())
    }

    #[test]
    fn comments_field_matches_announcement() -> anyhow::Result<()> {
        let item = find_announcement(FEED, "https://indexer.example/details/42")?
            .ok_or_else(|| anyhow::anyhow!("expected a match"))?;
        assert_eq!(
            item.link.as_deref(),
            Some("https://indexer.example/dl/42?apikey=k&file=Shawshank")
        );
        Ok(())
    }

    #[test]
    fn links_decode_html_named_entities() -> anyhow::Result<()> {
        let feed = r#"<rss><channel><item>
            <guid>https://indexer.example/details/5</guid>
            <link>https://indexer.example/dl/5?name=Am&amp;eacute;lie&amp;nbsp;2001&amp;amp;k=1</link>
        </item></channel></rss>"#;
        let item = find_announcement(feed, "https://indexer.example/details/5")?
            .ok_or_else(|| anyhow::anyhow!("expected a match"))?;
        assert_eq!(
            item.link.as_deref(),
            Some("https://indexer.example/dl/5?name=Am\u{e9}lie\u{a0}2001&k=1")
        );
        Ok(())
    }

    #[test]
    fn second_channel_is_ignored() -> anyhow::Result<()> {
        assert!(find_announcement(FEED, "https://indexer.example/details/99")?.is_none());
        Ok(())
    }

    #[test]
    fn match_must_be_exact() -> anyhow::Result<()> {
        assert!(find_announcement(FEED, "https://indexer.example/details/4")?.is_none());
        Ok(())
    }
}
