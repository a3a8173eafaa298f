// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

use crate::error::Result;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    match base.join(href) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Return `url` with `params` set, replacing existing values of the same name.
pub fn with_query<'a>(url: &str, params: impl IntoIterator<Item = (&'a str, String)>) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    let params: Vec<(&str, String)> = params.into_iter().collect();
    if params.is_empty() {
        return Ok(parsed.to_string());
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(name, _)| k == name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        for (k, v) in &params {
            pairs.append_pair(k, v);
        }
    }
    Ok(parsed.to_string())
}
