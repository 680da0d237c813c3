// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! URL canonicalization applied before indexing and before lookup.
//!
//! An index is only searchable with the canonicalizer it was built with.

use url::Url;

pub trait UrlCanonicalizer: Send + Sync {
    fn canonicalize(&self, url: &str) -> String;
}

/// Leaves URLs byte for byte as captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCanonicalizer;

impl UrlCanonicalizer for IdentityCanonicalizer {
    fn canonicalize(&self, url: &str) -> String {
        url.to_owned()
    }
}

/// Lower-cases scheme and host, strips default ports and fragments and sorts
/// query parameters. Input that does not parse as a URL is left unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizingCanonicalizer;

impl UrlCanonicalizer for NormalizingCanonicalizer {
    fn canonicalize(&self, url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_owned();
        };
        parsed.set_fragment(None);
        if let Some(query) = parsed.query() {
            let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
            params.sort_unstable();
            let sorted = params.join("&");
            parsed.set_query((!sorted.is_empty()).then_some(sorted.as_str()));
        }
        parsed.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_input() {
        let url = "HTTP://Example.org:80/a?b=1&a=2#top";
        assert_eq!(IdentityCanonicalizer.canonicalize(url), url);
    }

    #[test]
    fn normalizing_equivalent_urls_match() {
        let c = NormalizingCanonicalizer;
        assert_eq!(
            c.canonicalize("HTTP://Example.ORG:80/a?b=1&a=2#top"),
            "http://example.org/a?a=2&b=1"
        );
        assert_eq!(
            c.canonicalize("http://example.org/a?a=2&b=1"),
            c.canonicalize("http://EXAMPLE.org/a?b=1&a=2")
        );
        assert_eq!(
            c.canonicalize("https://example.org:8443/?"),
            "https://example.org:8443/"
        );
    }

    #[test]
    fn normalizing_passes_through_unparsable_input() {
        assert_eq!(NormalizingCanonicalizer.canonicalize("not a url"), "not a url");
    }
}
