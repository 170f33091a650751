//! Which bookings are active on a day, or within a period.
//!
//! Everything here is a pure function of its arguments. The reference date is
//! always supplied by the caller; nothing reads the clock or the store.

use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, OffsetDateTime};

use super::dates::{normalize_date, normalize_optional_date, oslo_date};
use super::repo_types::BookingRow;

/// Subscription regime of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SubscriptionType {
    /// Booked per occasion. A single day unless a departure date is given.
    Weekly,
    /// Standing window from arrival until departure, or open-ended.
    Annual,
}

impl SubscriptionType {
    /// Label written to the `abonnement_type` column.
    pub const fn label(self) -> &'static str {
        match self {
            SubscriptionType::Weekly => "Ukentlig ved bestilling",
            SubscriptionType::Annual => "Årsabonnement",
        }
    }

    /// Accepts both the stored labels and the English names, ignoring case.
    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        match raw.as_str() {
            "weekly" | "ukentlig" | "ukentlig ved bestilling" => Some(SubscriptionType::Weekly),
            "annual" | "årsabonnement" => Some(SubscriptionType::Annual),
            _ => None,
        }
    }
}

/// A booking with its dates normalized to Oslo calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: i64,
    pub customer_id: String,
    pub arrival_date: Date,
    pub departure_date: Option<Date>,
    pub subscription_type: SubscriptionType,
}

impl Booking {
    /// Maps a stored row into a typed booking. Never substitutes a default
    /// for a date that cannot be read.
    pub fn try_from_row(row: &BookingRow) -> Result<Self, FilterError> {
        let arrival_date =
            normalize_date(&row.arrival_date).ok_or_else(|| FilterError::DateFormat {
                id: row.id,
                field: "arrival_date",
                value: row.arrival_date.clone(),
            })?;
        let departure_date = normalize_optional_date(row.departure_date.as_deref()).map_err(
            |_| FilterError::DateFormat {
                id: row.id,
                field: "departure_date",
                value: row.departure_date.clone().unwrap_or_default(),
            },
        )?;
        let subscription_type = SubscriptionType::from_label(&row.subscription_type)
            .ok_or_else(|| FilterError::UnknownSubscription {
                id: row.id,
                value: row.subscription_type.clone(),
            })?;

        Ok(Self {
            id: row.id,
            customer_id: row.customer_id.clone(),
            arrival_date,
            departure_date,
            subscription_type,
        })
    }

    /// Departure before arrival. Such a booking is never active.
    pub fn has_inverted_window(&self) -> bool {
        matches!(self.departure_date, Some(departure) if departure < self.arrival_date)
    }

    /// The data-integrity warning for an inverted window, if there is one.
    pub fn inverted_window_warning(&self) -> Option<FilterWarning> {
        let departure_date = self.departure_date.filter(|_| self.has_inverted_window())?;
        Some(FilterWarning::InvertedWindow {
            id: self.id,
            arrival_date: self.arrival_date,
            departure_date,
        })
    }

    /// Last day covered, `None` when open-ended.
    fn window_end(&self) -> Option<Date> {
        match self.subscription_type {
            SubscriptionType::Weekly => Some(self.departure_date.unwrap_or(self.arrival_date)),
            SubscriptionType::Annual => self.departure_date,
        }
    }

    pub fn is_active_on(&self, day: Date) -> bool {
        if self.has_inverted_window() {
            return false;
        }
        self.arrival_date <= day && self.window_end().map_or(true, |end| day <= end)
    }

    /// Whether the booking window intersects `[start, end]`.
    pub fn overlaps(&self, start: Date, end: Date) -> bool {
        if self.has_inverted_window() {
            return false;
        }
        self.arrival_date <= end && self.window_end().map_or(true, |last| last >= start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterError {
    #[error("booking {id}: cannot parse {field} {value:?}")]
    DateFormat {
        id: i64,
        field: &'static str,
        value: String,
    },
    #[error("booking {id}: unknown subscription type {value:?}")]
    UnknownSubscription { id: i64, value: String },
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: Date, end: Date },
}

/// Advisory findings returned next to a best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterWarning {
    /// Same customer booked more than once for the same arrival day.
    DuplicateArrival {
        customer_id: String,
        arrival_date: Date,
        ids: Vec<i64>,
    },
    InvertedWindow {
        id: i64,
        arrival_date: Date,
        departure_date: Date,
    },
    /// A row that could not be normalized and was left out (lenient mode).
    Skipped { error: FilterError },
}

/// What to do with a row that cannot be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Skip the row and report it as a warning.
    #[default]
    Lenient,
    /// Abort the whole evaluation with the row's error.
    Strict,
}

impl FilterMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            FilterMode::Strict
        } else {
            FilterMode::Lenient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterOutcome {
    /// Matching bookings, in input order.
    pub bookings: Vec<Booking>,
    pub warnings: Vec<FilterWarning>,
}

/// Whether a single stored row is active on `day`.
pub fn is_active(row: &BookingRow, day: Date) -> Result<bool, FilterError> {
    Booking::try_from_row(row).map(|booking| booking.is_active_on(day))
}

/// The bookings active on `day`, keeping the input order.
pub fn filter_active_for_day(
    rows: &[BookingRow],
    day: Date,
    mode: FilterMode,
) -> Result<FilterOutcome, FilterError> {
    classify(rows, mode, |booking| booking.is_active_on(day))
}

/// The bookings whose window intersects `[start, end]`.
pub fn filter_for_range(
    rows: &[BookingRow],
    start: Date,
    end: Date,
    mode: FilterMode,
) -> Result<FilterOutcome, FilterError> {
    if start > end {
        return Err(FilterError::InvalidRange { start, end });
    }
    classify(rows, mode, |booking| booking.overlaps(start, end))
}

/// Today's bookings, with "today" taken as the Oslo date of `now`.
pub fn todays_bookings(
    rows: &[BookingRow],
    now: OffsetDateTime,
    mode: FilterMode,
) -> Result<FilterOutcome, FilterError> {
    filter_active_for_day(rows, oslo_date(now), mode)
}

fn classify<F>(
    rows: &[BookingRow],
    mode: FilterMode,
    keep: F,
) -> Result<FilterOutcome, FilterError>
where
    F: Fn(&Booking) -> bool,
{
    let mut outcome = FilterOutcome::default();
    let mut arrivals: BTreeMap<(String, Date), Vec<i64>> = BTreeMap::new();

    for row in rows {
        let booking = match Booking::try_from_row(row) {
            Ok(booking) => booking,
            Err(error) => match mode {
                FilterMode::Strict => return Err(error),
                FilterMode::Lenient => {
                    outcome.warnings.push(FilterWarning::Skipped { error });
                    continue;
                }
            },
        };

        arrivals
            .entry((booking.customer_id.clone(), booking.arrival_date))
            .or_default()
            .push(booking.id);

        outcome.warnings.extend(booking.inverted_window_warning());

        if keep(&booking) {
            outcome.bookings.push(booking);
        }
    }

    outcome.warnings.extend(
        arrivals
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|((customer_id, arrival_date), ids)| FilterWarning::DuplicateArrival {
                customer_id,
                arrival_date,
                ids,
            }),
    );

    Ok(outcome)
}
