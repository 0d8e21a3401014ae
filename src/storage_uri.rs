//! Canonical object-storage URIs and the URL shapes they can be recovered from.
//!
//! Vector-index entries are identified by `s3://<bucket>/<key>`, while photo
//! documents only store the public URL of their image. [`StorageUri::from_url`]
//! bridges the two by pulling bucket and key back out of any URL shape the
//! gallery produces or accepts.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use std::{fmt, sync::LazyLock};

// Virtual-hosted production URL: https://<bucket>.s3[.-<region>].amazonaws.com/<key>
static VIRTUAL_HOSTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([^/?#]+)\.s3(?:[.-][a-z0-9-]+)*\.amazonaws\.com/([^?#]+)")
        .expect("virtual-hosted regex is valid")
});

// Path-style URL, which is also what LocalStack serves: http(s)://<host>/<bucket>/<key>
static PATH_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/?#]+/([^/?#]+)/([^?#]+)").expect("path-style regex is valid")
});

// CLI URI: s3://<bucket>/<key>
static CLI_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^s3://([^/?#]+)/([^?#]+)").expect("cli uri regex is valid"));

// Characters escaped in a single key segment when building public URLs.
const KEY_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'+')
    .add(b'&');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageUri {
    pub bucket: String,
    pub key: String,
}

impl StorageUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), key: key.into() }
    }

    /// Recovers the object behind a stored image URL. Returns `None` for empty
    /// input, unknown shapes, or keys that do not percent-decode to UTF-8.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let caps = VIRTUAL_HOSTED
            .captures(url)
            .or_else(|| CLI_URI.captures(url))
            .or_else(|| PATH_STYLE.captures(url))?;

        let bucket = caps.get(1)?.as_str();
        let raw_key = caps.get(2)?.as_str();
        let key = percent_decode_str(raw_key).decode_utf8().ok()?;
        if key.is_empty() {
            return None;
        }

        Some(Self::new(bucket, key.into_owned()))
    }

    /// Public URL for this object. With an endpoint override (LocalStack) the
    /// path-style shape is used, otherwise the virtual-hosted AWS shape.
    pub fn public_url(&self, region: &str, endpoint: Option<&str>) -> String {
        let key = encode_key(&self.key);
        match endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, region, key),
        }
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Canonical `s3://` identifier for a stored image URL, if it has one.
pub fn canonical_uri_from_url(url: &str) -> Option<String> {
    StorageUri::from_url(url).map(|uri| uri.to_string())
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_url_round_trips() {
        let uri = StorageUri::new("my-gallery", "photos/summer trip/beach #1.jpg");
        let url = uri.public_url("eu-west-1", None);
        assert_eq!(
            url,
            "https://my-gallery.s3.eu-west-1.amazonaws.com/photos/summer%20trip/beach%20%231.jpg"
        );
        assert_eq!(StorageUri::from_url(&url), Some(uri));
    }

    #[test]
    fn legacy_global_endpoint_is_recognised() {
        assert_eq!(
            canonical_uri_from_url("https://my-gallery.s3.amazonaws.com/a/b.png?versionId=3"),
            Some("s3://my-gallery/a/b.png".to_string())
        );
        assert_eq!(
            canonical_uri_from_url("https://my.dotted.bucket.s3-us-west-2.amazonaws.com/x.gif"),
            Some("s3://my.dotted.bucket/x.gif".to_string())
        );
    }

    #[test]
    fn emulator_url_round_trips() {
        let uri = StorageUri::new("local-bucket", "photos/a+b&c.jpeg");
        let url = uri.public_url("us-east-1", Some("http://localhost:4566/"));
        assert_eq!(url, "http://localhost:4566/local-bucket/photos/a%2Bb%26c.jpeg");
        assert_eq!(StorageUri::from_url(&url), Some(uri));
    }

    #[test]
    fn path_style_aws_url_is_recognised() {
        assert_eq!(
            canonical_uri_from_url("https://s3.us-east-1.amazonaws.com/gallery/photos/img.png"),
            Some("s3://gallery/photos/img.png".to_string())
        );
    }

    #[test]
    fn cli_uri_round_trips() {
        let uri = StorageUri::from_url("s3://gallery/photos/%C3%A9t%C3%A9.jpg").unwrap();
        assert_eq!(uri.key, "photos/été.jpg");
        assert_eq!(uri.to_string(), "s3://gallery/photos/été.jpg");
        assert_eq!(StorageUri::from_url(&uri.to_string()), Some(uri));
    }

    #[test]
    fn encoded_slashes_decode_into_the_key() {
        assert_eq!(
            canonical_uri_from_url("http://127.0.0.1:4566/gallery/user1%2F170000_cat.png"),
            Some("s3://gallery/user1/170000_cat.png".to_string())
        );
    }

    #[test]
    fn unknown_shapes_yield_nothing() {
        assert_eq!(canonical_uri_from_url(""), None);
        assert_eq!(canonical_uri_from_url("not a url"), None);
        assert_eq!(canonical_uri_from_url("https://example.com/only-one-segment"), None);
        assert_eq!(canonical_uri_from_url("ftp://host/bucket/key"), None);
        assert_eq!(canonical_uri_from_url("s3://bucket-only"), None);
        assert_eq!(canonical_uri_from_url("http://localhost:4566/bucket/%FF.png"), None);
    }
}
