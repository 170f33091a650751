use serde::Serialize;
use sqlx::FromRow;

/// Booking row exactly as persisted. Dates are kept as stored text and
/// only become calendar dates through `Booking::try_from_row`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct BookingRow {
    pub id: i64,
    pub customer_id: String,
    #[sqlx(rename = "ankomst_dato")]
    pub arrival_date: String,
    #[sqlx(rename = "avreise_dato")]
    pub departure_date: Option<String>,
    #[sqlx(rename = "abonnement_type")]
    pub subscription_type: String,
}

/// Column values for an insert or a full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub customer_id: String,
    pub arrival_date: String,     // YYYY-MM-DD
    pub departure_date: Option<String>,
    pub subscription_type: String, // stored label, see SubscriptionType::label
}

/// Result of a full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Saved(BookingRow),
    /// Another booking of the same customer already arrives that day.
    ArrivalTaken,
    Missing,
}
