use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::{
    bookings::{
        activity::{
            filter_active_for_day, filter_for_range, is_active, todays_bookings, Booking,
            FilterError, FilterMode, FilterOutcome, FilterWarning, SubscriptionType,
        },
        dates::{format_iso, next_friday, normalize_date, normalize_optional_date, oslo_date},
        dto::{BookingRequest, BookingStats},
        repo::BookingStore,
        repo_types::{BookingRow, NewBooking, UpdateOutcome},
    },
    config::MAX_UPCOMING_DAYS,
};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid customer id {0:?}")]
    InvalidCustomerId(String),
    #[error("unknown subscription type {0:?}")]
    UnknownSubscription(String),
    #[error("arrival date is required for annual bookings")]
    MissingArrival,
    #[error("cannot parse {field} {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("departure {departure} is before arrival {arrival}")]
    DepartureBeforeArrival { arrival: Date, departure: Date },
    #[error("customer {customer_id} already has a booking arriving {arrival_date}")]
    Duplicate {
        customer_id: String,
        arrival_date: String,
    },
    #[error("booking {0} not found")]
    NotFound(i64),
    #[error("upcoming window of {0} days is out of range")]
    UpcomingWindow(i64),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub(crate) fn is_valid_customer_id(customer_id: &str) -> bool {
    lazy_static! {
        static ref CUSTOMER_ID_RE: Regex = Regex::new(r"^[a-zA-Z0-9_\-., ]{1,50}$").unwrap();
    }
    CUSTOMER_ID_RE.is_match(customer_id)
}

/// Validates a request and turns it into storable column values.
/// `today` is the Oslo date used for the weekly default arrival.
pub fn prepare_booking(req: &BookingRequest, today: Date) -> Result<NewBooking, BookingError> {
    let customer_id = req.customer_id.trim();
    if !is_valid_customer_id(customer_id) {
        return Err(BookingError::InvalidCustomerId(req.customer_id.clone()));
    }

    let subscription_type = SubscriptionType::from_label(&req.subscription_type)
        .ok_or_else(|| BookingError::UnknownSubscription(req.subscription_type.clone()))?;

    let arrival = match req.arrival_date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            normalize_date(raw).ok_or_else(|| BookingError::InvalidDate {
                field: "arrival_date",
                value: raw.to_string(),
            })?
        }
        _ => match subscription_type {
            SubscriptionType::Weekly => next_friday(today),
            SubscriptionType::Annual => return Err(BookingError::MissingArrival),
        },
    };

    let departure = normalize_optional_date(req.departure_date.as_deref()).map_err(|_| {
        BookingError::InvalidDate {
            field: "departure_date",
            value: req.departure_date.clone().unwrap_or_default(),
        }
    })?;
    if let Some(departure) = departure.filter(|d| *d < arrival) {
        return Err(BookingError::DepartureBeforeArrival { arrival, departure });
    }

    Ok(NewBooking {
        customer_id: customer_id.to_string(),
        arrival_date: format_iso(arrival),
        departure_date: departure.map(format_iso),
        subscription_type: subscription_type.label().to_string(),
    })
}

pub async fn create_booking(
    store: &dyn BookingStore,
    req: &BookingRequest,
    today: Date,
) -> Result<BookingRow, BookingError> {
    let booking = prepare_booking(req, today)?;
    let (customer_id, arrival_date) = (booking.customer_id.clone(), booking.arrival_date.clone());

    let Some(row) = store.create(booking).await? else {
        warn!(%customer_id, arrival = %arrival_date, "duplicate booking rejected");
        return Err(BookingError::Duplicate {
            customer_id,
            arrival_date,
        });
    };
    info!(id = row.id, customer_id = %row.customer_id, "booking created");
    Ok(row)
}

pub async fn update_booking(
    store: &dyn BookingStore,
    id: i64,
    req: &BookingRequest,
    today: Date,
) -> Result<BookingRow, BookingError> {
    let booking = prepare_booking(req, today)?;
    let (customer_id, arrival_date) = (booking.customer_id.clone(), booking.arrival_date.clone());

    match store.update(id, booking).await? {
        UpdateOutcome::Saved(row) => {
            info!(id, "booking updated");
            Ok(row)
        }
        UpdateOutcome::ArrivalTaken => {
            warn!(id, %customer_id, arrival = %arrival_date, "duplicate booking rejected");
            Err(BookingError::Duplicate {
                customer_id,
                arrival_date,
            })
        }
        UpdateOutcome::Missing => Err(BookingError::NotFound(id)),
    }
}

pub async fn delete_booking(store: &dyn BookingStore, id: i64) -> Result<(), BookingError> {
    if !store.delete(id).await? {
        return Err(BookingError::NotFound(id));
    }
    info!(id, "booking deleted");
    Ok(())
}

/// Stored rows arriving within `[start, end]`. A row whose arrival cannot be
/// read is a `Skipped` warning, or the error itself in strict mode.
pub async fn arrivals_between(
    store: &dyn BookingStore,
    start: Date,
    end: Date,
    mode: FilterMode,
) -> Result<(Vec<BookingRow>, Vec<FilterWarning>), BookingError> {
    if start > end {
        return Err(FilterError::InvalidRange { start, end }.into());
    }
    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for row in store.list_by_arrival_range(start, end).await? {
        if normalize_date(&row.arrival_date).is_some() {
            rows.push(row);
            continue;
        }
        let error = FilterError::DateFormat {
            id: row.id,
            field: "arrival_date",
            value: row.arrival_date,
        };
        match mode {
            FilterMode::Strict => return Err(error.into()),
            FilterMode::Lenient => warnings.push(FilterWarning::Skipped { error }),
        }
    }
    log_warnings(&warnings);
    Ok((rows, warnings))
}

pub async fn active_for_day(
    store: &dyn BookingStore,
    day: Date,
    mode: FilterMode,
) -> Result<FilterOutcome, BookingError> {
    let rows = store.list_all().await?;
    let outcome = filter_active_for_day(&rows, day, mode)?;
    debug!(%day, total = rows.len(), active = outcome.bookings.len(), "filtered bookings for day");
    log_warnings(&outcome.warnings);
    Ok(outcome)
}

/// Today's bookings for the clock reading `now`, with the Oslo day it resolved to.
pub async fn todays(
    store: &dyn BookingStore,
    now: OffsetDateTime,
    mode: FilterMode,
) -> Result<(Date, FilterOutcome), BookingError> {
    let rows = store.list_all().await?;
    let outcome = todays_bookings(&rows, now, mode)?;
    log_warnings(&outcome.warnings);
    Ok((oslo_date(now), outcome))
}

/// Whether one stored booking is active on `day`, with an `InvertedWindow`
/// warning when its departure lies before its arrival.
pub async fn booking_active_on(
    store: &dyn BookingStore,
    id: i64,
    day: Date,
) -> Result<(bool, Vec<FilterWarning>), BookingError> {
    let row = store.get(id).await?.ok_or(BookingError::NotFound(id))?;
    let active = is_active(&row, day)?;
    let warnings: Vec<_> = Booking::try_from_row(&row)?
        .inverted_window_warning()
        .into_iter()
        .collect();
    log_warnings(&warnings);
    Ok((active, warnings))
}

pub async fn for_period(
    store: &dyn BookingStore,
    start: Date,
    end: Date,
    subscription_type: Option<SubscriptionType>,
    mode: FilterMode,
) -> Result<FilterOutcome, BookingError> {
    // Checked before touching the store.
    if start > end {
        return Err(FilterError::InvalidRange { start, end }.into());
    }
    let rows = store.list_all().await?;
    let mut outcome = filter_for_range(&rows, start, end, mode)?;
    if let Some(kind) = subscription_type {
        outcome.bookings.retain(|b| b.subscription_type == kind);
    }
    debug!(%start, %end, matched = outcome.bookings.len(), "filtered bookings for period");
    log_warnings(&outcome.warnings);
    Ok(outcome)
}

/// Bookings touching `[today, today + days]`, with `days` at most a year.
pub async fn upcoming(
    store: &dyn BookingStore,
    today: Date,
    days: i64,
    mode: FilterMode,
) -> Result<(Date, FilterOutcome), BookingError> {
    let end = (0..=MAX_UPCOMING_DAYS)
        .contains(&days)
        .then(|| today.checked_add(Duration::days(days)))
        .flatten()
        .ok_or(BookingError::UpcomingWindow(days))?;
    let outcome = for_period(store, today, end, None, mode).await?;
    Ok((end, outcome))
}

pub fn statistics(rows: &[BookingRow]) -> BookingStats {
    let mut stats = BookingStats::default();
    let mut customers = BTreeSet::new();
    for row in rows {
        match Booking::try_from_row(row) {
            Ok(booking) => {
                stats.total_bookings += 1;
                *stats.by_subscription.entry(booking.subscription_type).or_default() += 1;
                customers.insert(booking.customer_id);
            }
            Err(_) => stats.skipped += 1,
        }
    }
    stats.unique_customers = customers.len();
    stats
}

fn log_warnings(warnings: &[FilterWarning]) {
    for warning in warnings {
        match warning {
            FilterWarning::DuplicateArrival { customer_id, arrival_date, ids } => {
                warn!(%customer_id, %arrival_date, ?ids, "duplicate bookings for same arrival")
            }
            FilterWarning::InvertedWindow { id, arrival_date, departure_date } => {
                warn!(id, %arrival_date, %departure_date, "departure before arrival")
            }
            FilterWarning::Skipped { error } => warn!(error = %error, "booking skipped"),
        }
    }
}
