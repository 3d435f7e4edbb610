//! Tally Web Server
//!
//! Axum-based REST API for the Tally personal finance tracker.
//!
//! Security features:
//! - Bearer-token sessions (HS256 JWT), checked by middleware on every
//!   protected route
//! - Tier feature gates on paid functionality, answered with 403 plus the
//!   missing feature name
//! - Restrictive CORS policy and standard security headers
//! - Sanitized error responses (internal details stay in the logs)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::models::User;
use tally_core::Database;

mod handlers;
mod paypal;
mod token;

pub use paypal::PayPalClient;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Secret for signing session tokens
    pub jwt_secret: String,
    /// Session lifetime in hours
    pub token_ttl_hours: i64,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Build configuration from the environment
    ///
    /// `TALLY_JWT_SECRET` should be set in production; without it an
    /// ephemeral secret is generated and sessions reset on restart.
    pub fn from_env() -> Self {
        let jwt_secret = match std::env::var("TALLY_JWT_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ => {
                warn!("TALLY_JWT_SECRET not set; sessions will not survive a restart");
                tally_core::auth::generate_token("jwt-secret")
            }
        };
        let token_ttl_hours = std::env::var("TALLY_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24);
        let allowed_origins = std::env::var("TALLY_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            jwt_secret,
            token_ttl_hours,
            allowed_origins,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jwt_secret: tally_core::auth::generate_token("jwt-secret"),
            token_ttl_hours: 24,
            allowed_origins: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Payment provider client; None means orders are trusted as reported
    pub paypal: Option<PayPalClient>,
}

/// The authenticated user, inserted by [`auth_middleware`]
#[derive(Clone)]
pub struct AuthUser(pub User);

/// Authentication middleware - validates the bearer token and loads the user
///
/// Rejections are deliberately specific in the message but identical in
/// status so clients can always treat 401 as "log in again".
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));

    let bearer = match bearer {
        Some(t) => t,
        None => return AppError::unauthorized("Missing authentication token").into_response(),
    };

    let claims = match token::verify(&state.config.jwt_secret, bearer) {
        Ok(c) => c,
        Err(token::TokenError::Expired) => {
            return AppError::unauthorized("Session has expired").into_response();
        }
        Err(token::TokenError::Invalid) => {
            return AppError::unauthorized("Invalid authentication token").into_response();
        }
    };

    let user = match state.db.get_active_user(claims.sub) {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(user_id = claims.sub, "Valid token for missing or deleted account");
            return AppError::unauthorized("Account no longer exists").into_response();
        }
        Err(e) => return AppError::from(e).into_response(),
    };

    request.extensions_mut().insert(AuthUser(user));
    next.run(request).await
}

/// Feature gate middleware - answers 403 with the missing feature name
///
/// Runs after [`auth_middleware`], so the user extension is always present
/// on gated routes.
async fn require_feature(
    State((state, feature)): State<(Arc<AppState>, &'static str)>,
    request: Request,
    next: Next,
) -> Response {
    let user = match request.extensions().get::<AuthUser>() {
        Some(AuthUser(u)) => u.clone(),
        None => return AppError::unauthorized("Missing authentication token").into_response(),
    };

    match state.db.require_feature_access(user.id, feature) {
        Ok(()) => next.run(request).await,
        Err(e) => AppError::from(e).into_response(),
    }
}

impl AppState {
    /// Handler-level feature check for routes where only one method is gated
    pub fn ensure_feature(&self, user_id: i64, feature: &'static str) -> Result<(), AppError> {
        self.db.require_feature_access(user_id, feature)?;
        Ok(())
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// Standard response envelope: `{success, message?, data?}`
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Successful response carrying data
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: None,
        data: Some(data),
    })
}

/// Successful response carrying data and a message
pub fn ok_with_message<T: Serialize>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.into()),
        data: Some(data),
    })
}

/// Successful response carrying only a message
pub fn ok_message(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.into()),
        data: None,
    })
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    /// Set on 403 responses so clients can name the missing feature
    required_feature: Option<String>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            required_feature: None,
            internal: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
            required_feature: None,
            internal: None,
        }
    }

    pub fn forbidden(feature: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: "This feature is not available on your current plan".to_string(),
            required_feature: Some(feature.to_string()),
            internal: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
            required_feature: None,
            internal: None,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            required_feature: None,
            internal: Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({
            "success": false,
            "message": self.message,
        });
        if let Some(feature) = self.required_feature {
            body["required_feature"] = serde_json::Value::String(feature);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<tally_core::Error> for AppError {
    fn from(err: tally_core::Error) -> Self {
        use tally_core::Error as E;
        match err {
            E::Validation(msg) => Self::bad_request(msg),
            E::Authentication(msg) => Self::unauthorized(msg),
            E::Authorization { feature } => Self::forbidden(&feature),
            E::NotFound(msg) => Self::not_found(msg),
            E::Conflict(msg) => Self {
                status: StatusCode::CONFLICT,
                message: msg,
                required_feature: None,
                internal: None,
            },
            E::PaymentVerification { status } => {
                Self::bad_request(format!("Payment not completed (status: {})", status))
            }
            other => Self::internal(other.into()),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the application router
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    let paypal = PayPalClient::from_env();
    if paypal.is_some() {
        info!("PayPal verification enabled");
    } else {
        info!("PayPal credentials not configured; payment orders are trusted as reported");
    }

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        paypal,
    });

    let public_routes = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/verify-email/:token", get(handlers::verify_email))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/payments/verify-paypal", post(handlers::verify_paypal));

    let gated_analytics = Router::new()
        .route("/analytics/advanced", get(handlers::advanced_analytics))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), "advanced_analytics"),
            require_feature,
        ));

    let gated_export = Router::new()
        .route("/analytics/export", get(handlers::export_transactions))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), "data_export"),
            require_feature,
        ));

    let protected_routes = Router::new()
        // Profile and account management
        .route(
            "/auth/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route(
            "/auth/delete-account",
            axum::routing::delete(handlers::delete_account),
        )
        .route("/auth/change-password", post(handlers::change_password))
        .route("/auth/change-email", post(handlers::request_email_change))
        .route("/auth/confirm-email", post(handlers::confirm_email_change))
        // Ledger
        .route("/balance", get(handlers::get_balance))
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/transactions/:id",
            get(handlers::get_transaction)
                .put(handlers::update_transaction)
                .delete(handlers::delete_transaction),
        )
        // Kind-filtered views over the same ledger
        .route(
            "/income",
            get(handlers::list_income).post(handlers::create_income),
        )
        .route("/income/:id", axum::routing::delete(handlers::delete_income))
        .route(
            "/expenses",
            get(handlers::list_expenses).post(handlers::create_expense),
        )
        .route(
            "/expenses/:id",
            axum::routing::delete(handlers::delete_expense),
        )
        // Categories (creation is gated in the handler; listing is free)
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/categories/:id",
            axum::routing::delete(handlers::delete_category),
        )
        // Goals (creation is gated in the handler)
        .route(
            "/goals",
            get(handlers::list_goals).post(handlers::create_goal),
        )
        .route("/goals/primary", get(handlers::primary_goal))
        .route(
            "/goals/:id",
            put(handlers::update_goal).delete(handlers::delete_goal),
        )
        .route("/goals/:id/complete", post(handlers::complete_goal))
        // Analytics open to every tier
        .route("/analytics/basic", get(handlers::basic_analytics))
        // Subscription and payment history
        .route("/subscriptions", get(handlers::get_subscription))
        .route("/payments", get(handlers::list_payments))
        .merge(gated_analytics)
        .merge(gated_export)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes);

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve static files if directory provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let app = create_router(db, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests;
