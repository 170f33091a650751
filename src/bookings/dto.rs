use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::bookings::{
    activity::{Booking, FilterWarning, SubscriptionType},
    repo_types::BookingRow,
};

/// Body of create and update requests. Dates are `YYYY-MM-DD` (or `DD.MM.YYYY`).
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub customer_id: String,
    pub subscription_type: String,
    #[serde(default)]
    pub arrival_date: Option<String>, // weekly bookings default to next Friday
    #[serde(default)]
    pub departure_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>, // defaults to today in Oslo
    pub strict: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start: String,
    pub end: String,
    pub subscription_type: Option<String>,
    pub strict: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StrictQuery {
    pub strict: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ArrivalRangeQuery {
    pub arrival_from: Option<String>,
    pub arrival_to: Option<String>,
    pub strict: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ActiveBookingsResponse {
    pub date: Date,
    pub bookings: Vec<Booking>,
    pub warnings: Vec<FilterWarning>,
}

#[derive(Debug, Serialize)]
pub struct BookingActivityResponse {
    pub id: i64,
    pub date: Date,
    pub active: bool,
    pub warnings: Vec<FilterWarning>,
}

/// Stored rows as persisted, with any row that could not be read reported.
#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingRow>,
    pub warnings: Vec<FilterWarning>,
}

#[derive(Debug, Serialize)]
pub struct PeriodBookingsResponse {
    pub start: Date,
    pub end: Date,
    pub bookings: Vec<Booking>,
    pub warnings: Vec<FilterWarning>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct BookingStats {
    pub total_bookings: usize,
    pub unique_customers: usize,
    pub by_subscription: BTreeMap<SubscriptionType, usize>,
    pub skipped: usize, // rows that could not be normalized
}
