//! `PostgreSQL` implementation of [`BookingStore`].
//!
//! # Locking
//!
//! [`ReservationTx::lock_room`] runs
//!
//! ```sql
//! SELECT ... FROM rooms r JOIN hotels h ON h.id = r.hotel_id
//! WHERE r.id = $1 FOR UPDATE OF r
//! ```
//!
//! inside a `READ COMMITTED` transaction whose `lock_timeout` is set from
//! [`TxOptions::lock_timeout`]. Everything that writes a room's bookings or
//! status takes this lock first, so per-room writes are serialized. The
//! `bookings_no_overlap` exclusion constraint rejects an overlapping active
//! booking even if a caller skipped the lock.
//!
//! # Error mapping
//!
//! | SQLSTATE | Meaning | [`StoreError`] |
//! |---|---|---|
//! | `55P03` | `lock_not_available` | `LockTimeout` |
//! | `23P01` | `exclusion_violation` | `Overlap` |
//! | `23505` | `unique_violation` | `DuplicateReference` |
//! | other | | `Database` |

use crate::rows::{
    BOOKING_COLUMNS, BookingRow, HOTEL_COLUMNS, HotelRow, LockedRoomRow, ROOM_COLUMNS,
    ROOM_TYPE_COLUMNS, RoomRow, RoomTypeRow, convert_all,
};
use chrono::{DateTime, Utc};
use roaman_core::error::StoreError;
use roaman_core::reference::BookingReference;
use roaman_core::store::{
    BookingFilter, BookingStore, LockedRoom, ReservationTx, RoomFilter, StatusCounts, StoreFuture,
    TxOptions,
};
use roaman_core::types::{
    Booking, BookingId, BookingStatus, Hotel, HotelId, Room, RoomId, RoomStatus, RoomType,
    StayWindow,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;

/// Map a sqlx error onto the storage taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error, lock_timeout: Duration) -> StoreError {
    let mapped = match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("55P03") => StoreError::LockTimeout(lock_timeout),
            Some("23P01") => StoreError::Overlap,
            Some("23505") => StoreError::DuplicateReference,
            _ => StoreError::Database(err.to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Database("connection pool timed out".to_string()),
        _ => StoreError::Database(err.to_string()),
    };
    if matches!(mapped, StoreError::Database(_)) {
        tracing::error!(error = %err, "Database error");
    }
    metrics::counter!("store_errors_total", "kind" => error_kind(&mapped)).increment(1);
    mapped
}

const fn error_kind(err: &StoreError) -> &'static str {
    match err {
        StoreError::LockTimeout(_) => "lock_timeout",
        StoreError::Overlap => "overlap",
        StoreError::DuplicateReference => "duplicate_reference",
        StoreError::NotFound(_) => "not_found",
        StoreError::Decode(_) => "decode",
        StoreError::Database(_) => "database",
    }
}

fn db_error(err: sqlx::Error) -> StoreError {
    map_sqlx_error(err, Duration::ZERO)
}

fn holding_statuses() -> Vec<String> {
    BookingStatus::HOLDING
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// `PostgreSQL`-backed booking store.
///
/// # Example
///
/// ```ignore
/// use roaman_postgres::PostgresBookingStore;
///
/// let store = PostgresBookingStore::connect("postgres://localhost/roaman").await?;
/// store.migrate().await?;
/// let engine = ReservationEngine::new(Arc::new(store), notifier, clock, config);
/// ```
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a default pool of 10 connections.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Apply the bundled migrations.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------------

    /// Insert or update a hotel.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on failure.
    pub async fn upsert_hotel(&self, hotel: &Hotel) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO hotels (id, slug, name, address, city, state, country, latitude,
                                longitude, amenities, images, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug, name = EXCLUDED.name, address = EXCLUDED.address,
                city = EXCLUDED.city, state = EXCLUDED.state, country = EXCLUDED.country,
                latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude,
                amenities = EXCLUDED.amenities, images = EXCLUDED.images,
                is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(hotel.id.as_uuid())
        .bind(&hotel.slug)
        .bind(&hotel.name)
        .bind(&hotel.address)
        .bind(&hotel.city)
        .bind(&hotel.state)
        .bind(&hotel.country)
        .bind(hotel.latitude)
        .bind(hotel.longitude)
        .bind(&hotel.amenities)
        .bind(&hotel.images)
        .bind(hotel.is_active)
        .bind(hotel.created_at)
        .bind(hotel.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Insert or update a room type.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on failure.
    pub async fn upsert_room_type(&self, room_type: &RoomType) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO room_types (id, hotel_id, name, description, base_price,
                                    max_occupancy, amenities)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, description = EXCLUDED.description,
                base_price = EXCLUDED.base_price, max_occupancy = EXCLUDED.max_occupancy,
                amenities = EXCLUDED.amenities, updated_at = now()
            ",
        )
        .bind(room_type.id.as_uuid())
        .bind(room_type.hotel_id.as_uuid())
        .bind(&room_type.name)
        .bind(&room_type.description)
        .bind(room_type.base_price)
        .bind(room_type.max_occupancy)
        .bind(&room_type.amenities)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Insert a room.
    ///
    /// Status changes after creation must go through the reservation engine.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on failure.
    pub async fn insert_room(&self, room: &Room) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO rooms (id, hotel_id, room_type_id, room_number, floor, status,
                               is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(room.id.as_uuid())
        .bind(room.hotel_id.as_uuid())
        .bind(room.room_type_id.as_uuid())
        .bind(&room.room_number)
        .bind(room.floor)
        .bind(room.status.as_str())
        .bind(room.is_active)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

impl BookingStore for PostgresBookingStore {
    fn begin(&self, options: TxOptions) -> StoreFuture<'_, Box<dyn ReservationTx>> {
        Box::pin(async move {
            let lock_timeout = options.lock_timeout;
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            // Scoped to this transaction by `is_local = true`.
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", lock_timeout.as_millis().max(1)))
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

            let tx: Box<dyn ReservationTx> = Box::new(PostgresReservationTx { tx, lock_timeout });
            Ok(tx)
        })
    }

    fn get_room(&self, id: RoomId) -> StoreFuture<'_, Option<Room>> {
        Box::pin(async move {
            let row: Option<RoomRow> =
                sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.id = $1"))
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            row.map(Room::try_from).transpose()
        })
    }

    fn get_hotel(&self, id: HotelId) -> StoreFuture<'_, Option<Hotel>> {
        Box::pin(async move {
            let row: Option<HotelRow> =
                sqlx::query_as(&format!("SELECT {HOTEL_COLUMNS} FROM hotels WHERE id = $1"))
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            Ok(row.map(Hotel::from))
        })
    }

    fn find_hotel_by_slug(&self, slug: String) -> StoreFuture<'_, Option<Hotel>> {
        Box::pin(async move {
            let row: Option<HotelRow> =
                sqlx::query_as(&format!("SELECT {HOTEL_COLUMNS} FROM hotels WHERE slug = $1"))
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            Ok(row.map(Hotel::from))
        })
    }

    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let row: Option<BookingRow> =
                sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            row.map(Booking::try_from).transpose()
        })
    }

    fn find_booking_by_reference(
        &self,
        reference: BookingReference,
    ) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let row: Option<BookingRow> = sqlx::query_as(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_reference = $1"
            ))
            .bind(reference.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.map(Booking::try_from).transpose()
        })
    }

    fn list_room_types(&self, hotel_id: HotelId) -> StoreFuture<'_, Vec<RoomType>> {
        Box::pin(async move {
            let rows: Vec<RoomTypeRow> = sqlx::query_as(&format!(
                "SELECT {ROOM_TYPE_COLUMNS} FROM room_types WHERE hotel_id = $1 ORDER BY name"
            ))
            .bind(hotel_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(rows.into_iter().map(RoomType::from).collect())
        })
    }

    fn list_rooms(&self, filter: RoomFilter) -> StoreFuture<'_, Vec<Room>> {
        Box::pin(async move {
            let rows: Vec<RoomRow> = sqlx::query_as(&format!(
                r"
                SELECT {ROOM_COLUMNS}
                FROM rooms r
                JOIN hotels h ON h.id = r.hotel_id
                WHERE ($1::uuid IS NULL OR r.hotel_id = $1)
                  AND ($2::uuid IS NULL OR r.room_type_id = $2)
                  AND ($3::text IS NULL OR r.status = $3)
                  AND (NOT $4 OR (r.is_active AND h.is_active))
                ORDER BY r.room_number
                "
            ))
            .bind(filter.hotel_id.map(|id| *id.as_uuid()))
            .bind(filter.room_type_id.map(|id| *id.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            convert_all(rows)
        })
    }

    fn count_rooms_by_status(&self, hotel_id: HotelId) -> StoreFuture<'_, StatusCounts> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                r"
                SELECT status, COUNT(*)
                FROM rooms
                WHERE hotel_id = $1 AND is_active
                GROUP BY status
                ",
            )
            .bind(hotel_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            let mut counts = StatusCounts::new();
            for (status, count) in rows {
                let status: RoomStatus = status
                    .parse()
                    .map_err(|e| StoreError::Decode(format!("rooms.status: {e}")))?;
                counts.insert(status, u64::try_from(count).unwrap_or(0));
            }
            Ok(counts)
        })
    }

    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                r"
                SELECT {BOOKING_COLUMNS}
                FROM bookings
                WHERE ($1::uuid IS NULL OR hotel_id = $1)
                  AND ($2::text IS NULL OR booking_status = $2)
                ORDER BY created_at DESC
                LIMIT $3
                "
            ))
            .bind(filter.hotel_id.map(|id| *id.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            convert_all(rows)
        })
    }

    fn find_stale_bookings(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                r"
                SELECT {BOOKING_COLUMNS}
                FROM bookings
                WHERE booking_status IN ('pending', 'confirmed') AND check_in < $1
                ORDER BY check_in
                LIMIT $2
                "
            ))
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            convert_all(rows)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// An open reservation transaction.
pub struct PostgresReservationTx {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

impl PostgresReservationTx {
    fn map_err(&self, err: sqlx::Error) -> StoreError {
        map_sqlx_error(err, self.lock_timeout)
    }
}

impl ReservationTx for PostgresReservationTx {
    fn lock_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Option<LockedRoom>> {
        Box::pin(async move {
            let row: Option<LockedRoomRow> = sqlx::query_as(&format!(
                r"
                SELECT {ROOM_COLUMNS}, h.is_active AS hotel_active
                FROM rooms r
                JOIN hotels h ON h.id = r.hotel_id
                WHERE r.id = $1
                FOR UPDATE OF r
                "
            ))
            .bind(room_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| self.map_err(e))?;
            row.map(LockedRoom::try_from).transpose()
        })
    }

    fn find_overlapping_bookings(
        &mut self,
        room_id: RoomId,
        window: StayWindow,
    ) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                r"
                SELECT {BOOKING_COLUMNS}
                FROM bookings
                WHERE room_id = $1
                  AND booking_status = ANY($2)
                  AND check_in < $4
                  AND check_out > $3
                "
            ))
            .bind(room_id.as_uuid())
            .bind(holding_statuses())
            .bind(window.check_in)
            .bind(window.check_out)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| self.map_err(e))?;
            convert_all(rows)
        })
    }

    fn insert_booking(&mut self, booking: Booking) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            // A failed statement aborts the whole transaction; the savepoint
            // keeps it usable after a reference collision.
            sqlx::query("SAVEPOINT insert_booking")
                .execute(&mut *self.tx)
                .await
                .map_err(|e| self.map_err(e))?;

            let inserted = sqlx::query(
                r"
                INSERT INTO bookings (
                    id, booking_reference, hotel_id, room_id, room_type_id,
                    guest_name, guest_email, guest_phone, check_in, check_out,
                    stay_type, total_amount, payment_status, booking_status,
                    special_requests, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ",
            )
            .bind(booking.id.as_uuid())
            .bind(booking.booking_reference.as_str())
            .bind(booking.hotel_id.as_uuid())
            .bind(booking.room_id.as_uuid())
            .bind(booking.room_type_id.as_uuid())
            .bind(&booking.guest.name)
            .bind(&booking.guest.email)
            .bind(&booking.guest.phone)
            .bind(booking.window.check_in)
            .bind(booking.window.check_out)
            .bind(booking.stay_type.as_str())
            .bind(booking.total_amount)
            .bind(booking.payment_status.as_str())
            .bind(booking.booking_status.as_str())
            .bind(&booking.special_requests)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *self.tx)
            .await;

            if let Err(err) = inserted {
                let mapped = self.map_err(err);
                sqlx::query("ROLLBACK TO SAVEPOINT insert_booking")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| self.map_err(e))?;
                return Err(mapped);
            }
            sqlx::query("RELEASE SAVEPOINT insert_booking")
                .execute(&mut *self.tx)
                .await
                .map_err(|e| self.map_err(e))?;
            Ok(())
        })
    }

    fn get_booking(&mut self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let row: Option<BookingRow> =
                sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(|e| self.map_err(e))?;
            row.map(Booking::try_from).transpose()
        })
    }

    fn update_booking_status(
        &mut self,
        id: BookingId,
        expected: Vec<BookingStatus>,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
            let result = sqlx::query(
                r"
                UPDATE bookings
                SET booking_status = $3, updated_at = $4
                WHERE id = $1 AND booking_status = ANY($2)
                ",
            )
            .bind(id.as_uuid())
            .bind(&expected)
            .bind(to.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| self.map_err(e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn update_room_status(
        &mut self,
        room_id: RoomId,
        status: RoomStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Room> {
        Box::pin(async move {
            let row: Option<RoomRow> = sqlx::query_as(&format!(
                r"
                UPDATE rooms r
                SET status = $2, updated_at = $3
                WHERE r.id = $1
                RETURNING {ROOM_COLUMNS}
                "
            ))
            .bind(room_id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| self.map_err(e))?;
            row.ok_or_else(|| StoreError::NotFound(format!("room {room_id}")))?
                .try_into()
        })
    }

    fn active_bookings_for_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                r"
                SELECT {BOOKING_COLUMNS}
                FROM bookings
                WHERE room_id = $1 AND booking_status = ANY($2)
                ORDER BY check_in
                "
            ))
            .bind(room_id.as_uuid())
            .bind(holding_statuses())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| self.map_err(e))?;
            convert_all(rows)
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            let lock_timeout = self.lock_timeout;
            self.tx
                .commit()
                .await
                .map_err(|e| map_sqlx_error(e, lock_timeout))
        })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move { self.tx.rollback().await.map_err(db_error) })
    }
}
