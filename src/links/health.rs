use reqwest::Url;
use tracing::debug;

use super::client::LinkClient;

/// A link is alive when HEAD, or a GET fallback, answers below 400 within the
/// client timeout. Malformed and non-http(s) links are dead.
pub async fn is_alive(client: &dyn LinkClient, url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
        _ => return false,
    };

    match client.head(&parsed).await {
        Ok(probe) if probe.status < 400 => return true,
        Ok(probe) => debug!(url, status = probe.status, "HEAD rejected; trying GET"),
        Err(err) => debug!(url, ?err, "HEAD failed; trying GET"),
    }

    match client.get(&parsed).await {
        Ok(page) => page.status < 400,
        Err(err) => {
            debug!(url, ?err, "GET failed");
            false
        }
    }
}
