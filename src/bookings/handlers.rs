use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use time::{Date, OffsetDateTime};
use tracing::{error, instrument, warn};

use crate::{
    bookings::{
        activity::{FilterError, FilterMode, SubscriptionType},
        dates::{normalize_date, oslo_date},
        dto::{
            ActiveBookingsResponse, ArrivalRangeQuery, BookingActivityResponse,
            BookingListResponse, BookingRequest, BookingStats, DayQuery, PeriodBookingsResponse,
            PeriodQuery, StrictQuery,
        },
        repo_types::BookingRow,
        services::{self, BookingError},
    },
    state::AppState,
};

type ApiError = (StatusCode, String);

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/today", get(todays_bookings))
        .route("/bookings/active", get(active_bookings))
        .route("/bookings/period", get(period_bookings))
        .route("/bookings/upcoming", get(upcoming_bookings))
        .route("/bookings/stats", get(booking_stats))
        .route("/bookings/:id/active", get(booking_activity))
        .route("/customers/:customer_id/bookings", get(customer_bookings))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", put(update_booking).delete(delete_booking))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(q): Query<ArrivalRangeQuery>,
) -> Result<Json<BookingListResponse>, ApiError> {
    if q.arrival_from.is_none() && q.arrival_to.is_none() {
        let bookings = state.bookings.list_all().await.map_err(internal)?;
        return Ok(Json(BookingListResponse {
            bookings,
            warnings: Vec::new(),
        }));
    }

    let start = parse_optional_query_date("arrival_from", q.arrival_from.as_deref())?;
    let end = parse_optional_query_date("arrival_to", q.arrival_to.as_deref())?;
    let mode = filter_mode(&state, q.strict);
    let (bookings, warnings) = services::arrivals_between(
        state.bookings.as_ref(),
        start.unwrap_or(Date::MIN),
        end.unwrap_or(Date::MAX),
        mode,
    )
    .await
    .map_err(booking_error)?;
    Ok(Json(BookingListResponse { bookings, warnings }))
}

#[instrument(skip(state, body))]
pub async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<BookingRequest>,
) -> Result<(StatusCode, HeaderMap, Json<BookingRow>), ApiError> {
    let row = services::create_booking(state.bookings.as_ref(), &body, today())
        .await
        .map_err(booking_error)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/bookings/{}", row.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(row)))
}

#[instrument(skip(state))]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BookingRow>, ApiError> {
    state
        .bookings
        .get(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Booking not found".into()))
}

#[instrument(skip(state, body))]
pub async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<BookingRequest>,
) -> Result<Json<BookingRow>, ApiError> {
    services::update_booking(state.bookings.as_ref(), id, &body, today())
        .await
        .map(Json)
        .map_err(booking_error)
}

#[instrument(skip(state))]
pub async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    services::delete_booking(state.bookings.as_ref(), id)
        .await
        .map_err(booking_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn customer_bookings(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<BookingRow>>, ApiError> {
    let rows = state
        .bookings
        .list_by_customer(&customer_id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn todays_bookings(
    State(state): State<AppState>,
    Query(q): Query<StrictQuery>,
) -> Result<Json<ActiveBookingsResponse>, ApiError> {
    let mode = filter_mode(&state, q.strict);
    let now = OffsetDateTime::now_utc();
    let (date, outcome) = services::todays(state.bookings.as_ref(), now, mode)
        .await
        .map_err(booking_error)?;
    Ok(Json(ActiveBookingsResponse {
        date,
        bookings: outcome.bookings,
        warnings: outcome.warnings,
    }))
}

#[instrument(skip(state))]
pub async fn booking_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<DayQuery>,
) -> Result<Json<BookingActivityResponse>, ApiError> {
    let date = parse_optional_query_date("date", q.date.as_deref())?.unwrap_or_else(today);
    let (active, warnings) = services::booking_active_on(state.bookings.as_ref(), id, date)
        .await
        .map_err(booking_error)?;
    Ok(Json(BookingActivityResponse {
        id,
        date,
        active,
        warnings,
    }))
}

#[instrument(skip(state))]
pub async fn active_bookings(
    State(state): State<AppState>,
    Query(q): Query<DayQuery>,
) -> Result<Json<ActiveBookingsResponse>, ApiError> {
    let day = parse_optional_query_date("date", q.date.as_deref())?.unwrap_or_else(today);
    let mode = filter_mode(&state, q.strict);
    let outcome = services::active_for_day(state.bookings.as_ref(), day, mode)
        .await
        .map_err(booking_error)?;
    Ok(Json(ActiveBookingsResponse {
        date: day,
        bookings: outcome.bookings,
        warnings: outcome.warnings,
    }))
}

#[instrument(skip(state))]
pub async fn period_bookings(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<PeriodBookingsResponse>, ApiError> {
    let start = parse_query_date("start", &q.start)?;
    let end = parse_query_date("end", &q.end)?;
    let subscription_type = match q.subscription_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(SubscriptionType::from_label(raw).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("unknown subscription type {raw:?}"))
        })?),
    };
    let mode = filter_mode(&state, q.strict);

    let outcome =
        services::for_period(state.bookings.as_ref(), start, end, subscription_type, mode)
            .await
            .map_err(booking_error)?;
    Ok(Json(PeriodBookingsResponse {
        start,
        end,
        bookings: outcome.bookings,
        warnings: outcome.warnings,
    }))
}

#[instrument(skip(state))]
pub async fn upcoming_bookings(
    State(state): State<AppState>,
    Query(q): Query<StrictQuery>,
) -> Result<Json<PeriodBookingsResponse>, ApiError> {
    let start = today();
    let mode = filter_mode(&state, q.strict);
    let (end, outcome) = services::upcoming(
        state.bookings.as_ref(),
        start,
        state.config.bookings.upcoming_days,
        mode,
    )
    .await
    .map_err(booking_error)?;
    Ok(Json(PeriodBookingsResponse {
        start,
        end,
        bookings: outcome.bookings,
        warnings: outcome.warnings,
    }))
}

#[instrument(skip(state))]
pub async fn booking_stats(State(state): State<AppState>) -> Result<Json<BookingStats>, ApiError> {
    let rows = state.bookings.list_all().await.map_err(internal)?;
    Ok(Json(services::statistics(&rows)))
}

// --- helpers ---

/// Oslo date of the server clock, used where a request leaves the date out.
fn today() -> Date {
    oslo_date(OffsetDateTime::now_utc())
}

fn filter_mode(state: &AppState, strict: Option<bool>) -> FilterMode {
    FilterMode::from_strict(strict.unwrap_or(state.config.bookings.strict_dates))
}

fn parse_query_date(name: &str, raw: &str) -> Result<Date, ApiError> {
    normalize_date(raw)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid {name} date {raw:?}")))
}

fn parse_optional_query_date(name: &str, raw: Option<&str>) -> Result<Option<Date>, ApiError> {
    raw.map(|raw| parse_query_date(name, raw)).transpose()
}

fn filter_error(e: FilterError) -> ApiError {
    match e {
        FilterError::InvalidRange { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        FilterError::DateFormat { .. } | FilterError::UnknownSubscription { .. } => {
            warn!(error = %e, "booking data could not be classified");
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

fn booking_error(e: BookingError) -> ApiError {
    match e {
        BookingError::InvalidCustomerId(_)
        | BookingError::UnknownSubscription(_)
        | BookingError::MissingArrival
        | BookingError::InvalidDate { .. }
        | BookingError::DepartureBeforeArrival { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        BookingError::Duplicate { .. } => (StatusCode::CONFLICT, e.to_string()),
        BookingError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        BookingError::UpcomingWindow(_) => {
            error!(error = %e, "upcoming window misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        BookingError::Filter(e) => filter_error(e),
        BookingError::Store(e) => {
            error!(error = %e, "booking store failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    error!(error = %e, "booking store failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn stored(
        id: i64,
        customer: &str,
        arrival: &str,
        departure: Option<&str>,
        kind: &str,
    ) -> BookingRow {
        BookingRow {
            id,
            customer_id: customer.into(),
            arrival_date: arrival.into(),
            departure_date: departure.map(Into::into),
            subscription_type: kind.into(),
        }
    }

    fn app(rows: Vec<BookingRow>) -> Router {
        crate::app::build_app(AppState::fake(rows))
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn active_for_given_day() {
        let app = app(vec![
            stored(1, "22", "2024-03-14", None, "Ukentlig ved bestilling"),
            stored(2, "23", "2024-01-01", None, "Årsabonnement"),
            stored(3, "24", "2024-03-15", None, "Ukentlig ved bestilling"),
        ]);
        let uri = "/api/v1/bookings/active?date=2024-03-14";
        let (status, body) = send(app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "2024-03-14");
        let ids: Vec<i64> = body["bookings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(body["bookings"][1]["subscription_type"], "Annual");
        assert_eq!(body["warnings"], json!([]));
    }

    #[tokio::test]
    async fn lenient_by_default_and_strict_on_request() {
        let rows = vec![
            stored(1, "22", "2024-03-14", None, "Weekly"),
            stored(2, "23", "garbage", None, "Weekly"),
        ];
        let uri = "/api/v1/bookings/active?date=2024-03-14";
        let (status, body) = send(app(rows.clone()), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["warnings"][0]["kind"], "skipped");
        assert_eq!(body["warnings"][0]["error"]["id"], 2);

        let (status, _) = send(
            app(rows),
            Method::GET,
            "/api/v1/bookings/active?date=2024-03-14&strict=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn single_booking_activity() {
        let rows = vec![stored(7, "22", "2024-01-01", Some("2024-02-01"), "Annual")];
        let uri = "/api/v1/bookings/7/active?date=2024-01-15";
        let (status, body) = send(app(rows.clone()), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "id": 7, "date": "2024-01-15", "active": true, "warnings": [] })
        );

        let uri = "/api/v1/bookings/7/active?date=2024-03-01";
        let (_, body) = send(app(rows.clone()), Method::GET, uri, None).await;
        assert_eq!(body["active"], false);

        let uri = "/api/v1/bookings/8/active?date=2024-03-01";
        let (status, _) = send(app(rows), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inverted_booking_activity_carries_a_warning() {
        let rows = vec![stored(9, "22", "2024-03-14", Some("2024-03-10"), "Annual")];
        let uri = "/api/v1/bookings/9/active?date=2024-03-12";
        let (status, body) = send(app(rows), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);
        assert_eq!(
            body["warnings"],
            json!([{
                "kind": "inverted_window",
                "id": 9,
                "arrival_date": "2024-03-14",
                "departure_date": "2024-03-10"
            }])
        );
    }

    #[tokio::test]
    async fn period_rejects_inverted_range() {
        let (status, _) = send(
            app(vec![]),
            Method::GET,
            "/api/v1/bookings/period?start=2024-03-14&end=2024-03-10",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_query_date_is_a_bad_request() {
        let uri = "/api/v1/bookings/active?date=soon";
        let (status, _) = send(app(vec![]), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn today_and_upcoming_respond() {
        let rows = vec![stored(1, "22", "2024-01-01", None, "Annual")];
        let uri = "/api/v1/bookings/today";
        let (status, body) = send(app(rows.clone()), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookings"][0]["id"], 1);

        let (status, body) = send(app(rows), Method::GET, "/api/v1/bookings/upcoming", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookings"][0]["id"], 1);
    }

    #[tokio::test]
    async fn crud_round() {
        let app = app(vec![]);
        let booking = json!({
            "customer_id": "22",
            "subscription_type": "Annual",
            "arrival_date": "2024-01-01"
        });

        let (status, created) =
            send(app.clone(), Method::POST, "/api/v1/bookings", Some(booking.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["arrival_date"], "2024-01-01");
        assert_eq!(created["subscription_type"], "Årsabonnement");

        let (status, _) = send(app.clone(), Method::POST, "/api/v1/bookings", Some(booking)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, fetched) = send(app.clone(), Method::GET, "/api/v1/bookings/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["customer_id"], "22");

        let (status, updated) = send(
            app.clone(),
            Method::PUT,
            "/api/v1/bookings/1",
            Some(json!({
                "customer_id": "22",
                "subscription_type": "Annual",
                "arrival_date": "2024-01-01",
                "departure_date": "2024-04-30"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["departure_date"], "2024-04-30");

        let uri = "/api/v1/customers/22/bookings";
        let (status, listed) = send(app.clone(), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = send(app.clone(), Method::DELETE, "/api/v1/bookings/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, Method::GET, "/api/v1/bookings/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_validates_dates() {
        let (status, _) = send(
            app(vec![]),
            Method::POST,
            "/api/v1/bookings",
            Some(json!({
                "customer_id": "22",
                "subscription_type": "Weekly",
                "arrival_date": "2024-03-14",
                "departure_date": "2024-03-01"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_by_arrival_range_and_stats() {
        let rows = vec![
            stored(1, "22", "2024-03-14", None, "Weekly"),
            stored(2, "23", "2024-03-20 10:00:00", None, "Weekly"),
            stored(3, "23", "2024-01-01", None, "Annual"),
        ];
        let (status, listed) = send(
            app(rows.clone()),
            Method::GET,
            "/api/v1/bookings?arrival_from=2024-03-01&arrival_to=2024-03-31",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["bookings"].as_array().unwrap().len(), 2);
        assert_eq!(listed["warnings"], json!([]));

        let (_, listed) = send(app(rows.clone()), Method::GET, "/api/v1/bookings", None).await;
        assert_eq!(listed["bookings"].as_array().unwrap().len(), 3);

        let (status, stats) = send(app(rows), Method::GET, "/api/v1/bookings/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_bookings"], 3);
        assert_eq!(stats["unique_customers"], 2);
        assert_eq!(stats["by_subscription"]["Weekly"], 2);
    }

    #[tokio::test]
    async fn arrival_range_reads_display_dates_and_reports_bad_rows() {
        let rows = vec![
            stored(1, "22", "14.03.2024", None, "Weekly"),
            stored(2, "23", "2024-04-02", None, "Weekly"),
            stored(3, "24", "garbage", None, "Weekly"),
        ];
        let uri = "/api/v1/bookings?arrival_from=2024-03-01&arrival_to=2024-03-31";
        let (status, listed) = send(app(rows.clone()), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["bookings"][0]["id"], 1);
        assert_eq!(listed["bookings"].as_array().unwrap().len(), 1);
        assert_eq!(listed["warnings"][0]["kind"], "skipped");
        assert_eq!(listed["warnings"][0]["error"]["id"], 3);

        let uri = "/api/v1/bookings?arrival_from=2024-03-01&strict=true";
        let (status, _) = send(app(rows), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn create_conflicts_with_a_display_format_row() {
        let rows = vec![stored(1, "22", "14.03.2024", None, "Ukentlig ved bestilling")];
        let body = json!({
            "customer_id": "22",
            "subscription_type": "Weekly",
            "arrival_date": "2024-03-14"
        });
        let (status, _) = send(app(rows), Method::POST, "/api/v1/bookings", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
