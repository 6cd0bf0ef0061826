//! Download link construction
//!
//! Links have the shape `{base}/stream/{token}/{id}/{file name}`, with the
//! file name percent-encoded like JavaScript's `encodeURIComponent`.

use crate::crypto::{issue, CapabilityToken, LinkSecret};
use crate::storage::StorageId;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Path prefix served by the download gateway
pub const STREAM_PATH: &str = "/stream";

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Builds download links for relayed files
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    /// Base URL without trailing slash
    base_url: String,
    secret: LinkSecret,
}

impl LinkBuilder {
    /// Create a link builder for the given public base URL
    pub fn new(base_url: impl Into<String>, secret: LinkSecret) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        LinkBuilder { base_url, secret }
    }

    /// Issue the token for a storage identifier
    pub fn token(&self, id: StorageId) -> CapabilityToken {
        issue(id, &self.secret)
    }

    /// Build the public download link for a stored file
    pub fn link(&self, id: StorageId, file_name: &str) -> String {
        format!(
            "{}{}/{}/{}/{}",
            self.base_url,
            STREAM_PATH,
            self.token(id),
            id,
            encode_component(file_name)
        )
    }

    /// Base URL links start with
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Percent-encode a single path component
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify;

    fn builder() -> LinkBuilder {
        LinkBuilder::new("http://localhost:3000/", LinkSecret::from("s3cr3t"))
    }

    #[test]
    fn test_link_shape() {
        let links = builder();
        let id = StorageId::new(100);
        let link = links.link(id, "report.pdf");

        assert_eq!(
            link,
            format!("http://localhost:3000/stream/{}/100/report.pdf", links.token(id))
        );
    }

    #[test]
    fn test_link_token_verifies() {
        let links = builder();
        let link = links.link(StorageId::new(482913), "a.bin");

        let parts: Vec<&str> = link.rsplitn(4, '/').collect();
        let (id, token) = (parts[1], parts[2]);
        assert_eq!(
            verify(token, id, &LinkSecret::from("s3cr3t")),
            Ok(StorageId::new(482913))
        );
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("report.pdf"), "report.pdf");
        assert_eq!(encode_component("my file (1).zip"), "my%20file%20(1).zip");
        assert_eq!(encode_component("a/b?c#d&e"), "a%2Fb%3Fc%23d%26e");
        assert_eq!(encode_component("it's~*!"), "it's~*!");
        assert_eq!(encode_component("résumé.txt"), "r%C3%A9sum%C3%A9.txt");
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(builder().base_url(), "http://localhost:3000");
    }
}
