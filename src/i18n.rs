//! Request locale handling.
//!
//! The locale is resolved from the `Accept-Language` header and used only to
//! pick display-name variants when building error messages. Entity data is
//! never localized.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::ACCEPT_LANGUAGE;
use axum::http::request::Parts;

/// Languages the backend can produce error messages in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    EnUs,
    ZhCn,
}

impl Locale {
    /// Resolve a locale from an `Accept-Language` header value.
    /// Anything that is not recognizably Chinese falls back to en-US.
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let Some(value) = header else {
            return Locale::EnUs;
        };
        for part in value.split(',') {
            let tag = part.split(';').next().unwrap_or("").trim();
            if tag.len() >= 2 && tag[..2].eq_ignore_ascii_case("zh") {
                return Locale::ZhCn;
            }
            if tag.len() >= 2 && tag[..2].eq_ignore_ascii_case("en") {
                return Locale::EnUs;
            }
        }
        Locale::EnUs
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Locale {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());
        Ok(Locale::from_accept_language(header))
    }
}

/// "X with field value not found" in the request locale.
pub fn not_found_message(locale: Locale, entity: &str, field: &str, value: &str) -> String {
    match locale {
        Locale::EnUs => format!("{entity} with {field} {value} not found"),
        Locale::ZhCn => format!("{field}为{value}的{entity}不存在"),
    }
}

/// "X with field value already exists" in the request locale.
pub fn already_exists_message(locale: Locale, entity: &str, fields: &str, values: &str) -> String {
    match locale {
        Locale::EnUs => format!("{entity} with {fields} {values} already exists"),
        Locale::ZhCn => format!("{fields}为{values}的{entity}已存在"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_language_parsing() {
        assert_eq!(Locale::from_accept_language(None), Locale::EnUs);
        assert_eq!(Locale::from_accept_language(Some("en-US,en;q=0.9")), Locale::EnUs);
        assert_eq!(Locale::from_accept_language(Some("zh-CN,zh;q=0.9")), Locale::ZhCn);
        assert_eq!(Locale::from_accept_language(Some("ZH")), Locale::ZhCn);
        assert_eq!(Locale::from_accept_language(Some("fr-FR")), Locale::EnUs);
    }

    #[test]
    fn test_quality_values_ignored() {
        assert_eq!(
            Locale::from_accept_language(Some("zh-CN;q=0.8, en-US;q=0.9")),
            Locale::ZhCn
        );
    }
}
