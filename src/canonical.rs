use sha2::{Digest, Sha256};
use url::form_urlencoded;
use url::Url;

/// Query parameter keys that never participate in article identity.
const TRACKING_QUERY_PARAMS: &[&str] = &["fbclid", "gclid", "igshid", "mc_cid", "mc_eid"];

const TRACKING_PREFIX: &str = "utm_";

/// Length of the hex digest prefix kept in article identifiers.
const ID_DIGEST_LEN: usize = 12;

const ID_TAG: &str = "art_";

/// Normalize an article URL into its deduplication key.
///
/// Drops every query parameter whose key starts with the campaign-tracking
/// prefix or is in the tracking denylist, keeps the remaining parameters in
/// their original relative order, and clears the fragment. An input the URL
/// parser rejects is returned unchanged, which is still deterministic and
/// idempotent.
pub fn canonicalize_url(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with(TRACKING_PREFIX))
        .filter(|(key, _)| !TRACKING_QUERY_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        url.set_query(Some(&query));
    }

    url.set_fragment(None);
    url.to_string()
}

/// Derive the stable article identifier for a canonical URL.
///
/// Re-deriving from the same URL always yields the same identifier; the
/// title is the identity source only when canonicalization produced an
/// empty string.
pub fn derive_article_id(canonical_url: &str, title: &str) -> String {
    let identity = if canonical_url.is_empty() {
        title
    } else {
        canonical_url
    };

    let digest = Sha256::digest(identity.as_bytes());
    let hex: String = digest
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();

    format!("{}{}", ID_TAG, &hex[..ID_DIGEST_LEN])
}
