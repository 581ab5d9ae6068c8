use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

use crate::api::{
    error::ErrorBody,
    handlers::{
        access, credentials, embeds, events, health, login, magic_link, oauth, otp, sessions, types,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        embeds::embed,
        sessions::create,
        sessions::state,
        sessions::loaded,
        sessions::scan,
        sessions::approve,
        events::events,
        otp::send,
        otp::verify,
        magic_link::send,
        magic_link::verify,
        credentials::verify,
        oauth::authorize,
        oauth::callback,
        login::login,
        access::check,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        types::EmbedInfo,
        types::SuppliedIdentity,
        types::CreateSessionRequest,
        types::CreateSessionResponse,
        types::LoadedRequest,
        types::ApproveRequest,
        types::SessionStateResponse,
        types::VerifiedResponse,
        types::Channel,
        types::OtpSendRequest,
        types::OtpSendResponse,
        types::OtpVerifyRequest,
        types::MagicLinkSendRequest,
        types::CredentialsRequest,
        types::AccessCheckResponse,
        crate::session::StateEvent,
        crate::session::SessionState,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "embeds", description = "Widget configuration lookup"),
        (name = "sessions", description = "Session lifecycle and live state"),
        (name = "otp", description = "One-time codes over SMS or email"),
        (name = "magic-link", description = "Emailed sign-in links"),
        (name = "credentials", description = "Email and password sign-in"),
        (name = "oauth", description = "Social sign-in"),
        (name = "auth", description = "SSO landing for downstream apps"),
        (name = "access", description = "Route permission checks")
    )
)]
struct ApiDoc;

/// The `OpenAPI` document, with info filled from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let Some(start) = author.find('<') else {
        let name = author.trim();
        return ((!name.is_empty()).then_some(name), None);
    };
    let name = author[..start].trim();
    let email = author[start + 1..].trim_end_matches('>').trim();
    (
        (!name.is_empty()).then_some(name),
        (!email.is_empty()).then_some(email),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Pairgate <team@pairgate.dev>"),
            (Some("Team Pairgate"), Some("team@pairgate.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<a@b.c>"), (None, Some("a@b.c")));
    }

    #[test]
    fn document_lists_widget_and_sso_paths() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        for path in [
            "/health",
            "/v1/sessions",
            "/v1/sessions/{token}/events",
            "/v1/otp/verify",
            "/api/auth/login",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
