use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{
    conflicting_seats, Booking, BookingStatus, HoldOutcome, SeatEntry, SeatMap, SeatStatus,
    Settlement, SettleOutcome,
};
use crate::database::repository::ReservationStore;

const BOOKING_COLUMNS: &str = "id, user_id, show_id, booked_seats, amount, status, payment_link, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    show_id: Uuid,
    booked_seats: Vec<String>,
    amount: i64,
    status: String,
    payment_link: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = DatabaseError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::from_db_status(&row.status).ok_or_else(|| {
            DatabaseError::unknown(format!("unknown booking status '{}'", row.status))
        })?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            show_id: row.show_id,
            booked_seats: row.booked_seats,
            amount: row.amount,
            status,
            payment_link: row.payment_link,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SeatRow {
    seat_id: String,
    status: i16,
    booking_id: Uuid,
}

fn rows_to_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, DatabaseError> {
    rows.into_iter().map(Booking::try_from).collect()
}

/// Postgres-backed reservation store.
///
/// Seat holds rely on the `(show_id, seat_id)` primary key: a hold inserts or
/// revives each seat row only while it is RELEASED, and the whole booking is
/// rolled back unless every seat row was affected.
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn seat_map_in(
        tx: &mut Transaction<'_, Postgres>,
        show_id: Uuid,
    ) -> Result<SeatMap, DatabaseError> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT seat_id, status, booking_id FROM show_seats WHERE show_id = $1",
        )
        .bind(show_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(to_seat_map(rows))
    }
}

fn to_seat_map(rows: Vec<SeatRow>) -> SeatMap {
    rows.into_iter()
        .filter_map(|row| {
            SeatStatus::from_code(row.status).map(|status| {
                (
                    row.seat_id,
                    SeatEntry {
                        status,
                        booking_id: row.booking_id,
                    },
                )
            })
        })
        .collect()
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn seat_map(&self, show_id: Uuid) -> Result<SeatMap, DatabaseError> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT seat_id, status, booking_id FROM show_seats WHERE show_id = $1",
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(to_seat_map(rows))
    }

    async fn create_booking_with_hold(
        &self,
        booking: &Booking,
    ) -> Result<HoldOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO bookings
             (id, user_id, show_id, booked_seats, amount, status, payment_link, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.show_id)
        .bind(&booking.booked_seats)
        .bind(booking.amount)
        .bind(booking.status.as_str())
        .bind(&booking.payment_link)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let held = sqlx::query(
            "INSERT INTO show_seats (show_id, seat_id, status, booking_id, updated_at)
             SELECT $1, seat, $3, $2, NOW() FROM UNNEST($4::text[]) AS seat
             ON CONFLICT (show_id, seat_id) DO UPDATE
             SET status = EXCLUDED.status, booking_id = EXCLUDED.booking_id, updated_at = NOW()
             WHERE show_seats.status = $5",
        )
        .bind(booking.show_id)
        .bind(booking.id)
        .bind(SeatStatus::Pending.code())
        .bind(&booking.booked_seats)
        .bind(SeatStatus::Released.code())
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .rows_affected();

        if held != booking.booked_seats.len() as u64 {
            let map = Self::seat_map_in(&mut tx, booking.show_id).await?;
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            // The affected rows belong to this transaction; anything occupied by
            // someone else is a conflict.
            let seats = conflicting_seats(&map, &booking.booked_seats)
                .into_iter()
                .filter(|seat| map.get(seat).map(|e| e.booking_id) != Some(booking.id))
                .collect();
            return Ok(HoldOutcome::Conflict { seats });
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(HoldOutcome::Held)
    }

    async fn set_payment_link(&self, booking_id: Uuid, link: &str) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE bookings SET payment_link = $2, updated_at = NOW() WHERE id = $1")
                .bind(booking_id)
                .bind(link)
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("booking", booking_id));
        }
        Ok(())
    }

    async fn rollback_booking(&self, booking_id: Uuid) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let show_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM bookings WHERE id = $1 RETURNING show_id")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        if let Some(show_id) = show_id {
            sqlx::query(
                "UPDATE show_seats SET status = $3, updated_at = NOW()
                 WHERE show_id = $1 AND booking_id = $2 AND status = $4",
            )
            .bind(show_id)
            .bind(booking_id)
            .bind(SeatStatus::Released.code())
            .bind(SeatStatus::Pending.code())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn settle_booking(
        &self,
        booking_id: Uuid,
        settlement: Settlement,
    ) -> Result<SettleOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Row lock serializes a racing callback and poll on the same booking.
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            return Ok(SettleOutcome::NotFound);
        };
        let booking = Booking::try_from(row)?;
        if !booking.status.accepts(settlement) {
            return Ok(SettleOutcome::AlreadySettled(booking.status));
        }

        if booking.status == BookingStatus::Abandoned {
            let reclaimed = sqlx::query(
                "UPDATE show_seats SET status = $4, booking_id = $3, updated_at = NOW()
                 WHERE show_id = $1 AND seat_id = ANY($2) AND status = $5",
            )
            .bind(booking.show_id)
            .bind(&booking.booked_seats)
            .bind(booking_id)
            .bind(SeatStatus::Confirmed.code())
            .bind(SeatStatus::Released.code())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .rows_affected();

            if reclaimed != booking.booked_seats.len() as u64 {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                let map = self.seat_map(booking.show_id).await?;
                return Ok(SettleOutcome::SeatsUnavailable(conflicting_seats(
                    &map,
                    &booking.booked_seats,
                )));
            }
        } else {
            sqlx::query(
                "UPDATE show_seats SET status = $4, updated_at = NOW()
                 WHERE show_id = $1 AND seat_id = ANY($2) AND booking_id = $3 AND status = $5",
            )
            .bind(booking.show_id)
            .bind(&booking.booked_seats)
            .bind(booking_id)
            .bind(settlement.seat_status().code())
            .bind(SeatStatus::Pending.code())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        let updated = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .bind(settlement.booking_status().as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(SettleOutcome::Applied(Booking::try_from(updated)?))
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, DatabaseError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Booking::try_from)
        .transpose()
    }

    async fn list_user_bookings(&self, user_id: &str) -> Result<Vec<Booking>, DatabaseError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows_to_bookings(rows)
    }

    async fn list_resumable_pending(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Booking>, DatabaseError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings
             WHERE status = 'pending'
               AND (payment_link IS NOT NULL OR created_at < $2)
             ORDER BY created_at ASC
             LIMIT $1",
            BOOKING_COLUMNS
        ))
        .bind(limit)
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows_to_bookings(rows)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }
}
