// ==============================================================================
// middleware/auth.rs - Forward Auth User Resolution
// ==============================================================================
// Description: Resolve the caller from the forward auth email header
// Author: Matt Barham
// Created: 2026-01-11
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================
//
// The reverse proxy authenticates the caller and sets X-Forwarded-Email. The
// email must belong to a user in the status database; the user's customers
// decide which cases and samples are visible. Missing header or unknown user
// is rejected with 401 Unauthorized.
//
// ==============================================================================

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cg_core::models::{Customer, User};
use tracing::{error, warn};

use crate::models::ErrorResponse;
use crate::state::AppState;

pub const EMAIL_HEADER: &str = "X-Forwarded-Email";

/// Non-empty email from the forward auth header
pub fn forwarded_email(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn unauthorized(body: ErrorResponse) -> Response {
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Authenticated user with the customers they belong to
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub customers: Vec<Customer>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }

    /// Admins see everything; others see every customer in their customers' groups
    pub fn can_access(&self, customer: &Customer) -> bool {
        self.is_admin()
            || self
                .customers
                .iter()
                .any(|c| c.customer_group_id == customer.customer_group_id)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(email) = forwarded_email(&parts.headers) else {
            return Err(unauthorized(ErrorResponse::new("Missing or invalid X-Forwarded-Email header")));
        };

        let user = match state.store().user(email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Rejected unknown user {}", email);
                return Err(unauthorized(ErrorResponse::with_details("User not found", email)));
            }
            Err(e) => {
                error!("Failed to look up user {}: {}", email, e);
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal server error")),
                )
                    .into_response());
            }
        };

        let customers = match state.store().user_customers(user.id).await {
            Ok(customers) => customers,
            Err(e) => {
                error!("Failed to load customers of {}: {}", email, e);
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal server error")),
                )
                    .into_response());
            }
        };

        Ok(AuthUser { user, customers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Utc;

    fn customer(id: i32, group: i32) -> Customer {
        Customer {
            id,
            internal_id: format!("cust{:03}", id),
            name: format!("Customer {}", id),
            customer_group_id: group,
            scout_access: true,
            invoice_address: "Solna".to_string(),
            invoice_reference: "ABC".to_string(),
            created_at: Utc::now(),
        }
    }

    fn auth_user(is_admin: bool, customers: Vec<Customer>) -> AuthUser {
        AuthUser {
            user: User {
                id: 1,
                name: "Lab User".to_string(),
                email: "lab@example.com".to_string(),
                is_admin,
            },
            customers,
        }
    }

    #[test]
    fn test_forwarded_email() {
        let req = Request::builder()
            .header(EMAIL_HEADER, " lab@example.com ")
            .body(())
            .unwrap();
        assert_eq!(forwarded_email(req.headers()), Some("lab@example.com"));
    }

    #[test]
    fn test_forwarded_email_missing_or_empty() {
        let req = Request::builder().body(()).unwrap();
        assert_eq!(forwarded_email(req.headers()), None);

        let req = Request::builder().header(EMAIL_HEADER, "").body(()).unwrap();
        assert_eq!(forwarded_email(req.headers()), None);
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let state = AppState::lazy(30);
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let rejection = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_access_follows_customer_group() {
        let user = auth_user(false, vec![customer(1, 10)]);
        assert!(user.can_access(&customer(1, 10)));
        assert!(user.can_access(&customer(2, 10)));
        assert!(!user.can_access(&customer(3, 20)));
    }

    #[test]
    fn test_admin_accesses_everything() {
        let admin = auth_user(true, Vec::new());
        assert!(admin.can_access(&customer(3, 20)));
    }
}
