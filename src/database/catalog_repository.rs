use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{Room, SeatType, Show};
use crate::database::repository::CatalogRepository;

#[derive(Debug, FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    seat_layout: Json<HashMap<String, Uuid>>,
}

#[derive(Debug, FromRow)]
struct ShowRow {
    id: Uuid,
    movie_id: Option<Uuid>,
    room_id: Uuid,
    show_date_time: chrono::DateTime<chrono::Utc>,
    show_price: i64,
}

#[derive(Debug, FromRow)]
struct SeatTypeRow {
    id: Uuid,
    name: String,
    price_multiplier: Decimal,
}

/// Read-only access to shows, rooms and seat types
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_show(&self, show_id: Uuid) -> Result<Option<Show>, DatabaseError> {
        let row = sqlx::query_as::<_, ShowRow>(
            "SELECT id, movie_id, room_id, show_date_time, show_price FROM shows WHERE id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| Show {
            id: r.id,
            movie_id: r.movie_id,
            room_id: r.room_id,
            show_date_time: r.show_date_time,
            show_price: r.show_price,
        }))
    }

    async fn get_room(&self, room_id: Uuid) -> Result<Option<Room>, DatabaseError> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, seat_layout FROM rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| Room {
            id: r.id,
            name: r.name,
            seat_layout: r.seat_layout.0,
        }))
    }

    async fn get_seat_types(&self, ids: &[Uuid]) -> Result<Vec<SeatType>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SeatTypeRow>(
            "SELECT id, name, price_multiplier FROM seat_types WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| SeatType {
                id: r.id,
                name: r.name,
                price_multiplier: r.price_multiplier,
            })
            .collect())
    }
}
