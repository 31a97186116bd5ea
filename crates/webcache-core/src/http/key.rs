//! Cache keys for HTTP requests.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Key under which the response to `method url` is cached.
///
/// The hex SHA-256 of `"<METHOD> <URL>"`, split into `ab/cd/<rest>` so no
/// directory level holds more than 256 children.
pub fn request_key(method: &Method, url: &Url) -> String {
    let digest = Sha256::digest(format!("{} {}", method, url).as_bytes());
    let code = hex::encode(digest);
    format!("{}/{}/{}", &code[0..2], &code[2..4], &code[4..])
}
