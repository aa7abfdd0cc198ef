use crate::{
    error::{required, ApiError},
    expenses, interested, notifications, webhook,
    whatsapp::{normalize_phone, send_message},
    State, ALLOWED_LOCALHOST, ALLOWED_LOOPBACK, API_VERSION,
};
use axum::async_trait;
use axum::body::{Bytes, HttpBody};
use axum::extract::{rejection::JsonRejection, FromRequest, Path, Query};
use axum::headers::Origin;
use axum::http::{Request, StatusCode};
use axum::{BoxError, Extension};
use axum::{Json, TypedHeader};
use chrono::NaiveDate;
use log::{debug, error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::{expense::Expense, notification::Notification};

type RouteResult<T> = Result<T, (StatusCode, String)>;

/// `Json` whose rejections are a 400 naming the offending field, like the
/// validation errors raised by the handlers.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for ApiJson<T>
where
    T: DeserializeOwned,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> (StatusCode, String) {
    debug!("Rejected JSON body: {rejection}");
    let status = match rejection {
        JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::BAD_REQUEST,
    };

    (status, rejection.body_text())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    /// Fabricate a status: pass response without checking database connectivity
    pub fn new_ok() -> Self {
        Self {
            status: String::from("pass"),
            version: String::from(API_VERSION),
        }
    }
}

/// IETF draft RFC for HTTP API Health Checks:
/// https://datatracker.ietf.org/doc/html/draft-inadarei-api-health-check
pub async fn health_check() -> RouteResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse::new_ok()))
}

#[derive(Deserialize, Debug, Default)]
pub struct WebhookVerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub async fn verify_webhook_route(
    Extension(state): Extension<State>,
    Query(params): Query<WebhookVerifyParams>,
) -> RouteResult<String> {
    debug!("verify_webhook: mode {:?}", params.mode);

    match webhook::verify(&params, &state.verify_token) {
        Some(challenge) => Ok(challenge),
        None => {
            error!("Webhook verification failed");
            Err((StatusCode::FORBIDDEN, String::from("Forbidden")))
        }
    }
}

/// Acknowledges any delivery, whatever its encoding.
pub async fn receive_webhook_route(
    Extension(state): Extension<State>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let body = serde_json::from_slice(&body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
    });
    let recorded = webhook::receive(&state, body).await;
    debug!("receive_webhook: recorded {recorded} messages");

    (StatusCode::OK, "EVENT_RECEIVED")
}

#[derive(Deserialize, Debug, Default)]
pub struct NotificationQuery {
    pub user_id: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct NotificationRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub kind: Option<String>,
}

pub async fn list_notifications_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Query(query): Query<NotificationQuery>,
) -> RouteResult<Json<Vec<Notification>>> {
    debug!("list_notifications: {:?}", query.user_id);
    validate_cors(&state, origin)?;

    match notifications::list_notifications(&state, query.user_id).await {
        Ok(res) => Ok(Json(res)),
        Err(e) => Err(handle_anyhow_error("list_notifications", e)),
    }
}

pub async fn create_notification_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    ApiJson(req): ApiJson<NotificationRequest>,
) -> RouteResult<(StatusCode, Json<Notification>)> {
    debug!("create_notification: {:?}", req.user_id);
    validate_cors(&state, origin)?;

    match notifications::create_notification(&state, req).await {
        Ok(res) => Ok((StatusCode::CREATED, Json(res))),
        Err(e) => Err(handle_anyhow_error("create_notification", e)),
    }
}

pub async fn mark_notification_read_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Path(id): Path<i32>,
) -> RouteResult<Json<Notification>> {
    debug!("mark_notification_read: {id}");
    validate_cors(&state, origin)?;

    match notifications::mark_read(&state, id).await {
        Ok(res) => Ok(Json(res)),
        Err(e) => Err(handle_anyhow_error("mark_notification_read", e)),
    }
}

pub async fn delete_notification_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Path(id): Path<i32>,
) -> RouteResult<StatusCode> {
    debug!("delete_notification: {id}");
    validate_cors(&state, origin)?;

    match notifications::delete_notification(&state, id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(handle_anyhow_error("delete_notification", e)),
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ExpenseQuery {
    pub owner: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ExpenseRequest {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct InstallmentsRequest {
    pub description: Option<String>,
    /// Total purchase amount, split across the installments.
    pub amount: Option<f64>,
    pub installments: Option<i32>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub owner: Option<String>,
    /// Date of the first installment.
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct InstallmentsResponse {
    pub created: i32,
}

pub async fn list_expenses_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Query(query): Query<ExpenseQuery>,
) -> RouteResult<Json<Vec<Expense>>> {
    debug!("list_expenses: {query:?}");
    validate_cors(&state, origin)?;

    match expenses::list_expenses(&state, query).await {
        Ok(res) => Ok(Json(res)),
        Err(e) => Err(handle_anyhow_error("list_expenses", e)),
    }
}

pub async fn sample_expenses_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
) -> RouteResult<Json<Vec<Expense>>> {
    debug!("sample_expenses");
    validate_cors(&state, origin)?;
    Ok(Json(expenses::sample_expenses()))
}

pub async fn create_expense_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    ApiJson(req): ApiJson<ExpenseRequest>,
) -> RouteResult<(StatusCode, Json<Expense>)> {
    debug!("create_expense: {:?}", req.owner);
    validate_cors(&state, origin)?;

    match expenses::create_expense(&state, req).await {
        Ok(res) => Ok((StatusCode::CREATED, Json(res))),
        Err(e) => Err(handle_anyhow_error("create_expense", e)),
    }
}

pub async fn update_expense_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Path(id): Path<i32>,
    ApiJson(req): ApiJson<ExpenseRequest>,
) -> RouteResult<Json<Expense>> {
    debug!("update_expense: {id}");
    validate_cors(&state, origin)?;

    match expenses::update_expense(&state, id, req).await {
        Ok(res) => Ok(Json(res)),
        Err(e) => Err(handle_anyhow_error("update_expense", e)),
    }
}

pub async fn delete_expense_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    Path(id): Path<i32>,
) -> RouteResult<StatusCode> {
    debug!("delete_expense: {id}");
    validate_cors(&state, origin)?;

    match expenses::delete_expense(&state, id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(handle_anyhow_error("delete_expense", e)),
    }
}

pub async fn create_installments_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    ApiJson(req): ApiJson<InstallmentsRequest>,
) -> RouteResult<(StatusCode, Json<InstallmentsResponse>)> {
    debug!("create_installments: {:?} x{:?}", req.owner, req.installments);
    validate_cors(&state, origin)?;

    match expenses::create_installments(&state, req).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(InstallmentsResponse { created }))),
        Err(e) => Err(handle_anyhow_error("create_installments", e)),
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct InterestRequest {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct InterestResponse {
    pub registered: bool,
}

pub async fn interested_count_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
) -> RouteResult<Json<CountResponse>> {
    debug!("interested_count");
    validate_cors(&state, origin)?;

    match interested::count(&state).await {
        Ok(count) => Ok(Json(CountResponse { count })),
        Err(e) => Err(handle_anyhow_error("interested_count", e)),
    }
}

pub async fn register_interest_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    ApiJson(req): ApiJson<InterestRequest>,
) -> RouteResult<Json<InterestResponse>> {
    debug!("register_interest");
    validate_cors(&state, origin)?;

    match interested::register(&state, req).await {
        Ok(registered) => Ok(Json(InterestResponse { registered })),
        Err(e) => Err(handle_anyhow_error("register_interest", e)),
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SendMessageRequest {
    pub to: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct SendMessageResponse {
    pub message_id: String,
}

pub async fn send_whatsapp_route(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> RouteResult<Json<SendMessageResponse>> {
    debug!("send_whatsapp");
    validate_cors(&state, origin)?;

    let parsed = required(req.to, "to").and_then(|to| {
        let to = normalize_phone(&to).ok_or(ApiError::invalid("to"))?;
        Ok((to, required(req.message, "message")?))
    });
    let (to, message) = parsed.map_err(|e| handle_anyhow_error("send_whatsapp", e))?;

    match send_message(&state, to, message).await {
        Ok(message_id) => Ok(Json(SendMessageResponse { message_id })),
        Err(e) => Err(handle_anyhow_error("send_whatsapp", e)),
    }
}

pub fn valid_origin(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|o| o == origin)
        || origin.starts_with(ALLOWED_LOCALHOST)
        || origin.starts_with(ALLOWED_LOOPBACK)
}

pub fn validate_cors(
    state: &State,
    origin: Option<TypedHeader<Origin>>,
) -> Result<(), (StatusCode, String)> {
    if let Some(TypedHeader(origin)) = origin {
        if origin.is_null() {
            return Ok(());
        }

        let origin_str = origin.to_string();
        if valid_origin(&state.allowed_origins, &origin_str) {
            return Ok(());
        }

        // The origin is not in the allowed list block the request
        return Err((StatusCode::NOT_FOUND, String::new()));
    }

    Ok(())
}

pub(crate) fn handle_anyhow_error(function: &str, err: anyhow::Error) -> (StatusCode, String) {
    match err.downcast::<ApiError>() {
        Ok(api_err) => {
            debug!("Rejected request in {function}: {api_err}");
            (api_err.status(), api_err.to_string())
        }
        Err(err) => {
            error!("Error in {function}: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("Internal server error"),
            )
        }
    }
}

#[cfg(all(test, not(feature = "integration-tests")))]
mod tests {
    use super::*;
    use crate::db::MockDBConnection;
    use crate::test_utils::{state_with, state_with_db};
    use crate::whatsapp::MockWhatsAppClient;
    use axum::headers::Header;
    use mockall::predicate::eq;

    fn origin(s: &str) -> Option<TypedHeader<Origin>> {
        let value = axum::http::HeaderValue::from_str(s).unwrap();
        let origin = Origin::decode(&mut std::iter::once(&value)).unwrap();
        Some(TypedHeader(origin))
    }

    #[test]
    fn origins() {
        let allowed = vec!["https://app.fintrack.example".to_string()];
        assert!(valid_origin(&allowed, "https://app.fintrack.example"));
        assert!(valid_origin(&allowed, "http://localhost:3000"));
        assert!(valid_origin(&allowed, "http://127.0.0.1:19006"));

        assert!(!valid_origin(&allowed, "https://evil.example"));
        assert!(!valid_origin(&allowed, "https://app.fintrack.example.evil.com"));
    }

    #[tokio::test]
    async fn cors_blocks_unknown_origin() {
        let state = state_with_db(MockDBConnection::new());

        assert!(validate_cors(&state, None).is_ok());
        assert!(validate_cors(&state, origin("http://localhost:3000")).is_ok());
        assert_eq!(
            validate_cors(&state, origin("https://evil.example")).unwrap_err().0,
            StatusCode::NOT_FOUND
        );

        let res = sample_expenses_route(origin("https://evil.example"), Extension(state)).await;
        assert_eq!(res.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_mapping() {
        let (status, msg) = handle_anyhow_error("test", ApiError::missing("owner"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Missing required field: owner");

        let (status, _) = handle_anyhow_error("test", ApiError::NotFound.into());
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, msg) = handle_anyhow_error("test", anyhow::anyhow!("password=hunter2"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "Internal server error");
    }

    #[tokio::test]
    async fn health() {
        let Json(res) = health_check().await.unwrap();
        assert_eq!(res.status, "pass");
        assert_eq!(res.version, API_VERSION);
    }

    #[tokio::test]
    async fn webhook_handshake_route() {
        let state = state_with_db(MockDBConnection::new());

        let params = WebhookVerifyParams {
            mode: Some("subscribe".to_string()),
            verify_token: Some("verify-me".to_string()),
            challenge: Some("CHALLENGE".to_string()),
        };
        let res = verify_webhook_route(Extension(state.clone()), Query(params)).await;
        assert_eq!(res.unwrap(), "CHALLENGE");

        let params = WebhookVerifyParams {
            mode: Some("subscribe".to_string()),
            verify_token: Some("nope".to_string()),
            challenge: Some("CHALLENGE".to_string()),
        };
        let res = verify_webhook_route(Extension(state), Query(params)).await;
        assert_eq!(res.unwrap_err().0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn webhook_params_from_query() {
        let uri: axum::http::Uri = "/webhook?hub.mode=subscribe&hub.verify_token=t&hub.challenge=42"
            .parse()
            .unwrap();
        let Query(params) = Query::<WebhookVerifyParams>::try_from_uri(&uri).unwrap();
        assert_eq!(params.mode.as_deref(), Some("subscribe"));
        assert_eq!(params.verify_token.as_deref(), Some("t"));
        assert_eq!(params.challenge.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn webhook_always_acknowledged() {
        let state = state_with_db(MockDBConnection::new());

        let res = receive_webhook_route(Extension(state.clone()), Bytes::from_static(b"not json")).await;
        assert_eq!(res, (StatusCode::OK, "EVENT_RECEIVED"));

        let res =
            receive_webhook_route(Extension(state), Bytes::from_static(br#"{"object":"page"}"#)).await;
        assert_eq!(res, (StatusCode::OK, "EVENT_RECEIVED"));
    }

    #[tokio::test]
    async fn create_expense_statuses() {
        let mut db = MockDBConnection::new();
        db.expect_insert_new_expense()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let state = state_with_db(db);

        let res = create_expense_route(
            None,
            Extension(state.clone()),
            ApiJson(ExpenseRequest::default()),
        )
        .await;
        assert_eq!(res.unwrap_err().0, StatusCode::BAD_REQUEST);

        let req = ExpenseRequest {
            description: Some("Mercado".to_string()),
            amount: Some(10.0),
            category: Some("alimentacao".to_string()),
            payment_method: Some("pix".to_string()),
            owner: Some("felipe".to_string()),
            ..Default::default()
        };
        let res = create_expense_route(None, Extension(state), ApiJson(req)).await;
        assert_eq!(
            res.unwrap_err(),
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string()
            )
        );
    }

    #[tokio::test]
    async fn delete_expense_statuses() {
        let mut db = MockDBConnection::new();
        db.expect_delete_expense().with(eq(1)).returning(|_| Ok(true));
        db.expect_delete_expense().with(eq(2)).returning(|_| Ok(false));
        let state = state_with_db(db);

        let res = delete_expense_route(None, Extension(state.clone()), Path(1)).await;
        assert_eq!(res.unwrap(), StatusCode::NO_CONTENT);

        let res = delete_expense_route(None, Extension(state), Path(2)).await;
        assert_eq!(res.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn installments_route() {
        let mut db = MockDBConnection::new();
        db.expect_create_installments().returning(|p| Ok(p.installments));
        let state = state_with_db(db);

        let req = InstallmentsRequest {
            description: Some("Notebook".to_string()),
            amount: Some(3000.0),
            installments: Some(12),
            category: Some("eletronicos".to_string()),
            payment_method: Some("cartao".to_string()),
            owner: Some("leticia".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 2, 10),
        };
        let (status, Json(res)) = create_installments_route(None, Extension(state), ApiJson(req))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(res, InstallmentsResponse { created: 12 });
    }

    #[tokio::test]
    async fn notifications_require_user() {
        let state = state_with_db(MockDBConnection::new());

        let res = list_notifications_route(
            None,
            Extension(state),
            Query(NotificationQuery::default()),
        )
        .await;
        assert_eq!(res.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn interested_routes() {
        let mut db = MockDBConnection::new();
        db.expect_count_interested_users().returning(|| Ok(3));
        db.expect_insert_interested_user().returning(|_| Ok(true));
        let state = state_with_db(db);

        let Json(res) = interested_count_route(None, Extension(state.clone()))
            .await
            .unwrap();
        assert_eq!(res, CountResponse { count: 3 });

        let req = InterestRequest {
            email: Some("ana@example.com".to_string()),
            name: None,
        };
        let Json(res) = register_interest_route(None, Extension(state), ApiJson(req))
            .await
            .unwrap();
        assert!(res.registered);
    }

    #[tokio::test]
    async fn send_whatsapp_validates_and_sends() {
        let mut wa = MockWhatsAppClient::new();
        wa.expect_send_text()
            .with(eq("5511987654321".to_string()), eq("Oi!".to_string()))
            .times(1)
            .returning(|_, _| Ok("wamid.XYZ".to_string()));
        let state = state_with(MockDBConnection::new(), wa);

        let req = SendMessageRequest {
            to: Some("+5511987654321".to_string()),
            message: Some("Oi!".to_string()),
        };
        let Json(res) = send_whatsapp_route(None, Extension(state.clone()), ApiJson(req))
            .await
            .unwrap();
        assert_eq!(res.message_id, "wamid.XYZ");

        let req = SendMessageRequest {
            to: Some("12".to_string()),
            message: Some("Oi!".to_string()),
        };
        let res = send_whatsapp_route(None, Extension(state.clone()), ApiJson(req)).await;
        assert_eq!(
            res.unwrap_err(),
            (StatusCode::BAD_REQUEST, "Invalid field: to".to_string())
        );

        let req = SendMessageRequest {
            to: Some("5511987654321".to_string()),
            message: None,
        };
        let res = send_whatsapp_route(None, Extension(state), ApiJson(req)).await;
        assert_eq!(res.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send_whatsapp_upstream_failure() {
        let mut wa = MockWhatsAppClient::new();
        wa.expect_send_text()
            .returning(|_, _| Err(anyhow::anyhow!("WhatsApp API returned 500")));
        let state = state_with(MockDBConnection::new(), wa);

        let req = SendMessageRequest {
            to: Some("5511987654321".to_string()),
            message: Some("Oi!".to_string()),
        };
        let res = send_whatsapp_route(None, Extension(state), ApiJson(req)).await;
        assert_eq!(res.unwrap_err().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
