use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::Date;

use super::dates::normalize_date;
use super::repo_types::{BookingRow, NewBooking, UpdateOutcome};

/// Persistence for the booking table. Rows come back with their dates as stored.
///
/// Writes refuse a second booking for the same customer on the same arrival
/// day. The comparison is made on normalized dates, so `14.03.2024` and
/// `2024-03-14` collide.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// `None` when the customer already has a booking arriving that day.
    async fn create(&self, booking: NewBooking) -> anyhow::Result<Option<BookingRow>>;
    async fn get(&self, id: i64) -> anyhow::Result<Option<BookingRow>>;
    async fn list_all(&self) -> anyhow::Result<Vec<BookingRow>>;
    async fn list_by_customer(&self, customer_id: &str) -> anyhow::Result<Vec<BookingRow>>;
    /// Rows arriving within `[start, end]`, plus rows whose arrival cannot be read.
    async fn list_by_arrival_range(
        &self,
        start: Date,
        end: Date,
    ) -> anyhow::Result<Vec<BookingRow>>;
    async fn update(&self, id: i64, booking: NewBooking) -> anyhow::Result<UpdateOutcome>;
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
    async fn count(&self) -> anyhow::Result<i64>;
}

/// Whether any of `rows` other than `except` arrives on the same day as `arrival`.
pub(crate) fn arrival_taken(rows: &[BookingRow], arrival: &str, except: Option<i64>) -> bool {
    let Some(arrival) = normalize_date(arrival) else {
        return false;
    };
    rows.iter()
        .filter(|r| Some(r.id) != except)
        .any(|r| normalize_date(&r.arrival_date) == Some(arrival))
}

fn keep_for_range(row: &BookingRow, start: Date, end: Date) -> bool {
    normalize_date(&row.arrival_date).map_or(true, |arrival| start <= arrival && arrival <= end)
}

#[derive(Clone)]
pub struct PgBookingStore {
    db: PgPool,
}

impl PgBookingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Serializes writes for one customer until the surrounding transaction ends.
async fn lock_customer(conn: &mut PgConnection, customer_id: &str) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(customer_id)
        .execute(&mut *conn)
        .await
        .context("lock customer bookings")?;
    Ok(())
}

async fn customer_rows(
    conn: &mut PgConnection,
    customer_id: &str,
) -> anyhow::Result<Vec<BookingRow>> {
    let rows = sqlx::query_as::<_, BookingRow>(
        r#"
        SELECT id, customer_id, ankomst_dato, avreise_dato, abonnement_type
        FROM tunbroyting_bestillinger
        WHERE customer_id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await
    .context("select customer bookings")?;
    Ok(rows)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create(&self, booking: NewBooking) -> anyhow::Result<Option<BookingRow>> {
        let mut tx = self.db.begin().await.context("begin insert")?;
        lock_customer(&mut tx, &booking.customer_id).await?;
        let existing = customer_rows(&mut tx, &booking.customer_id).await?;
        if arrival_taken(&existing, &booking.arrival_date, None) {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO tunbroyting_bestillinger
                (customer_id, ankomst_dato, avreise_dato, abonnement_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, customer_id, ankomst_dato, avreise_dato, abonnement_type
            "#,
        )
        .bind(&booking.customer_id)
        .bind(&booking.arrival_date)
        .bind(&booking.departure_date)
        .bind(&booking.subscription_type)
        .fetch_one(&mut *tx)
        .await
        .context("insert booking")?;
        tx.commit().await.context("commit insert")?;
        Ok(Some(row))
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<BookingRow>> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, customer_id, ankomst_dato, avreise_dato, abonnement_type
            FROM tunbroyting_bestillinger
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select booking by id")?;
        Ok(row)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<BookingRow>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, customer_id, ankomst_dato, avreise_dato, abonnement_type
            FROM tunbroyting_bestillinger
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("select bookings")?;
        Ok(rows)
    }

    async fn list_by_customer(&self, customer_id: &str) -> anyhow::Result<Vec<BookingRow>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, customer_id, ankomst_dato, avreise_dato, abonnement_type
            FROM tunbroyting_bestillinger
            WHERE customer_id = $1
            ORDER BY ankomst_dato DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.db)
        .await
        .context("select bookings by customer")?;
        Ok(rows)
    }

    // Stored arrivals are free text, so the range is applied after reading.
    async fn list_by_arrival_range(
        &self,
        start: Date,
        end: Date,
    ) -> anyhow::Result<Vec<BookingRow>> {
        let mut rows = self.list_all().await.context("select bookings by arrival range")?;
        rows.retain(|row| keep_for_range(row, start, end));
        Ok(rows)
    }

    async fn update(&self, id: i64, booking: NewBooking) -> anyhow::Result<UpdateOutcome> {
        let mut tx = self.db.begin().await.context("begin update")?;
        lock_customer(&mut tx, &booking.customer_id).await?;
        let existing = customer_rows(&mut tx, &booking.customer_id).await?;
        if arrival_taken(&existing, &booking.arrival_date, Some(id)) {
            return Ok(UpdateOutcome::ArrivalTaken);
        }

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE tunbroyting_bestillinger
            SET customer_id = $2, ankomst_dato = $3, avreise_dato = $4, abonnement_type = $5
            WHERE id = $1
            RETURNING id, customer_id, ankomst_dato, avreise_dato, abonnement_type
            "#,
        )
        .bind(id)
        .bind(&booking.customer_id)
        .bind(&booking.arrival_date)
        .bind(&booking.departure_date)
        .bind(&booking.subscription_type)
        .fetch_optional(&mut *tx)
        .await
        .context("update booking")?;
        tx.commit().await.context("commit update")?;
        Ok(row.map_or(UpdateOutcome::Missing, UpdateOutcome::Saved))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tunbroyting_bestillinger WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete booking")?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tunbroyting_bestillinger")
            .fetch_one(&self.db)
            .await
            .context("count bookings")?;
        Ok(count)
    }
}
