use axum::http::StatusCode;
use chrono::{DateTime, Duration, TimeZone, Utc};
use newsbrief::api::{
    check_feed_category, paginate, parse_cursor, parse_sources_param, validate_limit, ApiError,
    DEFAULT_PAGE_SIZE,
};
use newsbrief::store::FeedRow;
use newsbrief::types::{to_iso8601, PipelineError};

fn row(index: usize, published_at: DateTime<Utc>) -> FeedRow {
    FeedRow {
        id: format!("art_{:012}", index),
        title: format!("Article {}", index),
        category: "models".to_string(),
        primary_category: None,
        published_at,
        canonical_url: format!("https://s.com/{}", index),
        summary_text: None,
        source_id: "src_test".to_string(),
        source_name: "Test Source".to_string(),
        source_url: "https://s.com".to_string(),
    }
}

/// Feed rows in the order the store returns them: newest first, one minute
/// apart.
fn feed_rows(count: usize) -> Vec<FeedRow> {
    let newest = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
    (0..count)
        .map(|i| row(i, newest - Duration::minutes(i as i64)))
        .collect()
}

#[test]
fn overfetched_page_is_truncated_and_cursored() {
    let limit = 3;
    let rows = feed_rows(limit + 1);
    let last_returned = rows[limit - 1].published_at;

    let (page, next_cursor) = paginate(rows, limit);

    assert_eq!(page.len(), limit);
    assert_eq!(next_cursor, Some(to_iso8601(last_returned)));
}

#[test]
fn exhausted_page_has_no_cursor() {
    let (page, next_cursor) = paginate(feed_rows(3), 3);
    assert_eq!(page.len(), 3);
    assert_eq!(next_cursor, None);

    let (page, next_cursor) = paginate(feed_rows(2), 3);
    assert_eq!(page.len(), 2);
    assert_eq!(next_cursor, None);

    let (page, next_cursor) = paginate(Vec::new(), 3);
    assert!(page.is_empty());
    assert_eq!(next_cursor, None);
}

#[test]
fn walking_pages_by_cursor_visits_every_row_exactly_once() {
    let all = feed_rows(25);
    let limit = 10;

    // Stand-in for the store's strictly-older cursor filter plus overfetch.
    let fetch = |before: Option<DateTime<Utc>>| -> Vec<FeedRow> {
        all.iter()
            .filter(|row| before.map_or(true, |cursor| row.published_at < cursor))
            .take(limit + 1)
            .cloned()
            .collect()
    };

    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let before = cursor
            .as_deref()
            .map(|raw| parse_cursor(raw).expect("cursor emitted by a previous page"));
        let (page, next) = paginate(fetch(before), limit);
        pages += 1;
        collected.extend(page);

        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(collected.len(), all.len());
    let collected_ids: Vec<&str> = collected.iter().map(|row| row.id.as_str()).collect();
    let expected_ids: Vec<&str> = all.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(collected_ids, expected_ids);
}

#[test]
fn subsecond_timestamps_paginate_without_loss() {
    let base = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
    let all = vec![
        row(0, base + Duration::milliseconds(900)),
        row(1, base + Duration::milliseconds(100)),
    ];
    let limit = 1;

    let fetch = |before: Option<DateTime<Utc>>| -> Vec<FeedRow> {
        all.iter()
            .filter(|row| before.map_or(true, |cursor| row.published_at < cursor))
            .take(limit + 1)
            .cloned()
            .collect()
    };

    let (first_page, next) = paginate(fetch(None), limit);
    assert_eq!(first_page.len(), 1);
    assert_eq!(first_page[0].id, all[0].id);

    // The cursor must carry the fractional part: rounded to the whole second
    // it would exclude the 100ms row, which is strictly older.
    let cursor = parse_cursor(&next.expect("a second page exists")).unwrap();
    assert_eq!(cursor, all[0].published_at);

    let (second_page, next) = paginate(fetch(Some(cursor)), limit);
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id, all[1].id);
    assert_eq!(next, None);
}

#[test]
fn limit_outside_the_allowed_window_is_a_client_error() {
    assert_eq!(validate_limit(None).unwrap(), DEFAULT_PAGE_SIZE);
    assert_eq!(validate_limit(Some(1)).unwrap(), 1);
    assert_eq!(validate_limit(Some(50)).unwrap(), 50);

    for bad in [0, 51, -3, i64::MAX] {
        let err = validate_limit(Some(bad)).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST, "limit {}", bad);
    }
}

#[test]
fn unknown_feed_category_is_not_found() {
    for known in ["models", "hardware", "research", "policy", "industry", "tools"] {
        assert!(check_feed_category(known).is_ok(), "category {}", known);
    }

    for unknown in ["banana", "open_source", "Models", ""] {
        let err = check_feed_category(unknown).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND, "category {:?}", unknown);
    }
}

#[test]
fn missing_article_error_renders_as_not_found() {
    let err = ApiError::from(PipelineError::ArticleNotFound {
        id: "art_000000000000".to_string(),
    });
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[test]
fn cursor_round_trips_through_its_rendered_form() {
    let ts = Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap();
    let rendered = to_iso8601(ts);
    assert_eq!(rendered, "2023-01-02T10:00:00Z");
    assert_eq!(parse_cursor(&rendered).unwrap(), ts);
}

#[test]
fn offset_cursors_normalize_to_utc() {
    let parsed = parse_cursor("2023-01-02T05:00:00-05:00").unwrap();
    assert_eq!(parsed, Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap());
}

#[test]
fn malformed_cursor_is_a_client_error() {
    for raw in ["yesterday", "2023-13-99T00:00:00Z", "1672653600", ""] {
        let err = parse_cursor(raw).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST, "cursor {:?}", raw);
    }
}

#[test]
fn sources_param_splits_trims_and_drops_blanks() {
    assert_eq!(
        parse_sources_param("src_openai,src_google_ai"),
        vec!["src_openai", "src_google_ai"]
    );
    assert_eq!(parse_sources_param(" a, ,b"), vec!["a", "b"]);
    assert!(parse_sources_param("").is_empty());
    assert!(parse_sources_param(" , ,").is_empty());
}
