//! Destination selection. Pure functions; randomness is passed in.

use tracing::warn;
use url::Url;

use crate::embed::{ActivePath, Destinations, RoutingRule};

/// Two distinct devices confirmed ⇒ A, otherwise B.
///
/// A missing fingerprint on either side counts as "not confirmed distinct".
#[must_use]
pub fn device_parity(origin: Option<&str>, approval: Option<&str>) -> ActivePath {
    match (origin, approval) {
        (Some(origin), Some(approval)) if origin != approval => ActivePath::A,
        _ => ActivePath::B,
    }
}

/// Pick the path a routing rule points at. `coin` is the split-test draw.
#[must_use]
pub fn select_path(
    destinations: &Destinations,
    origin_fingerprint: Option<&str>,
    approval_fingerprint: Option<&str>,
    coin: bool,
) -> ActivePath {
    match destinations.routing_rule {
        RoutingRule::None => destinations.active_path,
        RoutingRule::DeviceParity => device_parity(origin_fingerprint, approval_fingerprint),
        RoutingRule::SplitTest => {
            if coin {
                ActivePath::A
            } else {
                ActivePath::B
            }
        }
    }
}

/// URL for the selected path, falling back to the active path, then to `role_default`.
#[must_use]
pub fn resolve(destinations: &Destinations, path: ActivePath, role_default: &str) -> String {
    destinations
        .url_for(path)
        .or_else(|| destinations.url_for(destinations.active_path))
        .or_else(|| destinations.urls().next())
        .unwrap_or(role_default)
        .to_string()
}

/// Resolve a relative destination against the embedding page's origin.
///
/// Absolute URLs pass through. Without a usable origin the relative path is
/// returned as-is.
#[must_use]
pub fn absolutize(destination: &str, client_origin: Option<&str>) -> String {
    if Url::parse(destination).is_ok() {
        return destination.to_string();
    }
    let Some(origin) = client_origin.filter(|origin| !origin.is_empty()) else {
        return destination.to_string();
    };
    match Url::parse(origin).and_then(|base| base.join(destination)) {
        Ok(url) => url.to_string(),
        Err(err) => {
            warn!(origin, "Ignoring unusable client origin: {err}");
            destination.to_string()
        }
    }
}
