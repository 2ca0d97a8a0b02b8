//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id, from the header or fresh
//! - [`Caller`]: the pre-authenticated [`Principal`] forwarded by the gateway
//! - [`ValidJson`], [`ValidPath`], [`ValidQuery`]: axum's extractors with their
//!   rejections reported as [`AppError`] validation errors
//!
//! Authentication happens upstream. The gateway forwards the verified claims as
//! headers:
//!
//! | Header | Value |
//! |---|---|
//! | `X-Roaman-Role` | `guest`, `staff`, `admin` or `system`; absent means guest |
//! | `X-Roaman-Hotel-Id` | hotel UUID, required for staff |

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use roaman_core::auth::{Principal, Role};
use roaman_core::types::HotelId;
use uuid::Uuid;

/// Header carrying the caller's role.
pub const ROLE_HEADER: &str = "X-Roaman-Role";

/// Header carrying a staff caller's hotel.
pub const HOTEL_HEADER: &str = "X-Roaman-Hotel-Id";

/// Correlation ID for request tracing.
///
/// Prefers the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, then a new UUID v4.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }
        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The caller of a request.
///
/// # Example
///
/// ```ignore
/// async fn cancel(Caller(principal): Caller, Path(id): Path<BookingId>) -> WebResult<Json<Booking>> {
///     Ok(Json(state.engine.cancel(&principal, id).await?))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Self)
    }
}

/// JSON body extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ValidJson<T>(pub T);

/// Path extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ValidPath<T>(pub T);

/// Query string extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ValidQuery<T>(pub T);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::bad_request(format!("{name} is not valid text")))
        })
        .transpose()
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, AppError> {
    let role = match header(headers, ROLE_HEADER)? {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Guest,
    };
    let hotel_id = header(headers, HOTEL_HEADER)?
        .map(|raw| {
            raw.parse::<HotelId>()
                .map_err(|_| AppError::bad_request(format!("{HOTEL_HEADER} must be a UUID")))
        })
        .transpose()?;

    Ok(match role {
        Role::Guest => Principal::guest(),
        Role::Admin => Principal::admin(),
        Role::System => Principal::system(),
        // A staff claim without a hotel is rejected by every staff operation.
        Role::Staff => Principal {
            role: Role::Staff,
            hotel_id,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: test fails on unexpected outcome
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn caller(headers: &[(&str, &str)]) -> Result<Caller, AppError> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(())
            .unwrap();

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .unwrap();

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_missing_role_is_guest() {
        assert_eq!(caller(&[]).await.unwrap().0, Principal::guest());
    }

    #[tokio::test]
    async fn test_staff_carries_hotel_claim() {
        let hotel = HotelId::new();
        let Caller(principal) = caller(&[(ROLE_HEADER, "staff"), (HOTEL_HEADER, &hotel.to_string())])
            .await
            .unwrap();
        assert_eq!(principal, Principal::staff(hotel));
    }

    #[tokio::test]
    async fn test_bad_claims_are_rejected() {
        let err = caller(&[(ROLE_HEADER, "owner")]).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = caller(&[(ROLE_HEADER, "staff"), (HOTEL_HEADER, "lagos")])
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_ignores_hotel_claim() {
        let Caller(principal) = caller(&[(ROLE_HEADER, "ADMIN"), (HOTEL_HEADER, &HotelId::new().to_string())])
            .await
            .unwrap();
        assert_eq!(principal, Principal::admin());
    }
}
