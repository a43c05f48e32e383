//! Builds the CORS stage from configuration.

use conduit_config::{CorsSettings, OriginEntry, OriginSetting};
use conduit_core::ConduitResult;
use conduit_middleware::stages::{AllowedOrigin, CorsMiddleware};
use conduit_middleware::MiddlewareEntry;
use http::StatusCode;
use std::time::Duration;

/// Converts [`CorsSettings`] into a configured [`CorsMiddleware`].
///
/// # Errors
///
/// Returns [`conduit_core::ConduitError::PatternSyntax`] if an origin
/// expression does not compile.
pub fn cors_from_settings(settings: &CorsSettings) -> ConduitResult<CorsMiddleware> {
    let mut builder = CorsMiddleware::builder();

    builder = match &settings.origin {
        OriginSetting::Toggle(true) => builder.allow_any_origin(),
        OriginSetting::Toggle(false) => builder.origin(AllowedOrigin::Disabled),
        OriginSetting::Exact(origin) if origin == "*" => builder.allow_any_origin(),
        OriginSetting::Exact(origin) => builder.origin(AllowedOrigin::Exact(origin.clone())),
        OriginSetting::Pattern { regex } => builder.allow_origin_pattern(regex)?,
        OriginSetting::List(entries) => {
            let mut builder = builder.origin(AllowedOrigin::List(Vec::new()));
            for entry in entries {
                builder = match entry {
                    OriginEntry::Exact(origin) => builder.allow_origin(origin.clone()),
                    OriginEntry::Pattern { regex } => builder.allow_origin_pattern(regex)?,
                };
            }
            builder
        }
    };

    builder = builder
        .allow_methods(&settings.methods)
        .allow_credentials(settings.credentials)
        .preflight_continue(settings.preflight_continue)
        .options_success_status(
            StatusCode::from_u16(settings.options_success_status).unwrap_or(StatusCode::NO_CONTENT),
        );

    if !settings.allowed_headers.is_empty() {
        builder = builder.allow_headers(&settings.allowed_headers);
    }
    if !settings.exposed_headers.is_empty() {
        builder = builder.expose_headers(&settings.exposed_headers);
    }
    if let Some(secs) = settings.max_age_secs {
        builder = builder.max_age(Duration::from_secs(secs));
    }

    Ok(builder.build())
}

/// Wraps the CORS stage as the single, non-critical entry of the first layer.
pub(crate) fn cors_entry(settings: &CorsSettings) -> ConduitResult<MiddlewareEntry> {
    Ok(MiddlewareEntry::new(cors_from_settings(settings)?).critical(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_build() {
        assert!(cors_from_settings(&CorsSettings::default()).is_ok());
    }

    #[test]
    fn test_bad_origin_pattern_rejected() {
        let settings = CorsSettings {
            origin: OriginSetting::List(vec![
                OriginEntry::Exact("https://a.test".into()),
                OriginEntry::Pattern { regex: "(".into() },
            ]),
            ..CorsSettings::default()
        };
        assert!(cors_from_settings(&settings).is_err());
    }

    #[test]
    fn test_entry_is_not_critical() {
        let entry = cors_entry(&CorsSettings::default()).unwrap();
        assert!(!entry.is_critical());
    }
}
