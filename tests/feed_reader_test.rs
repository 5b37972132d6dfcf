use chrono::{TimeZone, Utc};
use newsbrief::config::SourceConfig;
use newsbrief::feed::candidates_from_document;

fn test_source() -> SourceConfig {
    SourceConfig {
        id: "src_test",
        name: "Test Source",
        url: "https://s.com",
        rss_url: "https://s.com/rss.xml",
        category: "models",
        active: true,
    }
}

#[test]
fn extracts_candidate_with_canonical_url_and_utc_timestamp() {
    let doc = br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>A</title>
      <link>https://s.com/p?utm_campaign=x</link>
      <pubDate>Mon, 02 Jan 2023 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    let candidates = candidates_from_document(doc, &test_source()).unwrap();
    assert_eq!(candidates.len(), 1);

    let candidate = &candidates[0];
    assert_eq!(candidate.title, "A");
    assert_eq!(candidate.canonical_url, "https://s.com/p");
    assert_eq!(
        candidate.published_at,
        Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap()
    );
    assert_eq!(candidate.source_id, "src_test");
    assert_eq!(candidate.category, "models");
    assert!(candidate.id.starts_with("art_"));
}

#[test]
fn offset_timestamps_normalize_to_utc() {
    let doc = br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>Offset</title>
      <link>https://s.com/offset</link>
      <pubDate>Mon, 02 Jan 2023 05:00:00 -0500</pubDate>
    </item>
  </channel>
</rss>"#;

    let candidates = candidates_from_document(doc, &test_source()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(
        candidates[0].published_at,
        Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap()
    );
}

#[test]
fn partial_entries_are_silently_dropped() {
    let doc = br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>No link</title>
      <pubDate>Mon, 02 Jan 2023 10:00:00 GMT</pubDate>
    </item>
    <item>
      <link>https://s.com/no-title</link>
      <pubDate>Mon, 02 Jan 2023 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>No date</title>
      <link>https://s.com/no-date</link>
    </item>
    <item>
      <title>Complete</title>
      <link>https://s.com/complete</link>
      <pubDate>Tue, 03 Jan 2023 08:30:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    let candidates = candidates_from_document(doc, &test_source()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].canonical_url, "https://s.com/complete");
}

#[test]
fn updated_timestamp_is_used_when_publish_time_is_absent() {
    let doc = br#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test</title>
  <id>urn:test</id>
  <updated>2023-01-05T00:00:00Z</updated>
  <entry>
    <title>Updated only</title>
    <id>urn:test:1</id>
    <link href="https://s.com/atom-entry"/>
    <updated>2023-01-04T12:00:00Z</updated>
  </entry>
</feed>"#;

    let candidates = candidates_from_document(doc, &test_source()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(
        candidates[0].published_at,
        Utc.with_ymd_and_hms(2023, 1, 4, 12, 0, 0).unwrap()
    );
}

#[test]
fn output_preserves_document_order() {
    let doc = br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>Older but first</title>
      <link>https://s.com/first</link>
      <pubDate>Sun, 01 Jan 2023 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Newer but second</title>
      <link>https://s.com/second</link>
      <pubDate>Mon, 02 Jan 2023 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    let candidates = candidates_from_document(doc, &test_source()).unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].canonical_url, "https://s.com/first");
    assert_eq!(candidates[1].canonical_url, "https://s.com/second");
}

#[test]
fn malformed_document_is_an_error_not_a_panic() {
    let doc = b"this is not xml";
    assert!(candidates_from_document(doc, &test_source()).is_err());
}
