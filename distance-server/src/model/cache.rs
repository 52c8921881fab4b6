//! Distance cache
//!
//! Every answered distance request is recorded, which makes the records both the per-user search
//! history and the cache of computed distances. The pair of places is unordered - distance from
//! `A` to `B` serves requests for `B` to `A` as well. Place names are matched exactly as typed,
//! without any normalization.

use chrono::{DateTime, SubsecRound, Utc};

use crate::model::Error;
use crate::model::users::UserId;

/// Previously computed distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedDistance {
    pub kilometers: f64,
    pub miles: f64,
}

/// Single distance request record
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub id: i64,
    /// User who requested the distance
    pub user_id: UserId,
    /// First place as typed by the user
    pub place_a: String,
    /// Second place as typed by the user
    pub place_b: String,
    pub kilometers: f64,
    pub miles: f64,
    pub computed_at: DateTime<Utc>,
}

type Row = (i64, UserId, String, String, f64, f64, DateTime<Utc>);

impl From<Row> for DistanceRecord {
    fn from((id, user_id, place_a, place_b, kilometers, miles, computed_at): Row) -> Self {
        Self {
            id,
            user_id,
            place_a,
            place_b,
            kilometers,
            miles,
            computed_at,
        }
    }
}

impl DistanceRecord {
    /// Returns the oldest distance recorded for the pair of places in any order
    pub async fn lookup(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        place_a: &str,
        place_b: &str,
    ) -> Result<Option<CachedDistance>, Error> {
        let row: Option<(f64, f64)> = sqlx::query_as(
            "select kilometers, miles from distances \
             where (place_a = ?1 and place_b = ?2) or (place_a = ?2 and place_b = ?1) \
             order by id limit 1",
        )
        .bind(place_a)
        .bind(place_b)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|(kilometers, miles)| CachedDistance { kilometers, miles }))
    }

    /// Records the distance, regardless of the existing records for the same pair
    pub async fn store(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
        place_a: &str,
        place_b: &str,
        distance: CachedDistance,
    ) -> Result<Self, Error> {
        let computed_at = Utc::now().trunc_subsecs(0);

        let result = sqlx::query(
            "insert into distances (user_id, place_a, place_b, kilometers, miles, computed_at) \
             values (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(place_a)
        .bind(place_b)
        .bind(distance.kilometers)
        .bind(distance.miles)
        .bind(computed_at)
        .execute(db)
        .await?;

        Ok(Self {
            id: result.last_insert_rowid(),
            user_id,
            place_a: place_a.to_owned(),
            place_b: place_b.to_owned(),
            kilometers: distance.kilometers,
            miles: distance.miles,
            computed_at,
        })
    }

    /// All the records of the user, oldest first
    pub async fn history(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Vec<Self>, Error> {
        let rows: Vec<Row> = sqlx::query_as(
            "select id, user_id, place_a, place_b, kilometers, miles, computed_at \
             from distances where user_id = ? order by id",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::setup_pool;
    use crate::model::users::User;

    const NY_PARIS: CachedDistance = CachedDistance {
        kilometers: 5837.24,
        miles: 3627.13,
    };

    #[tokio::test]
    async fn empty_cache_misses() {
        let pool = setup_pool().await;

        let cached = DistanceRecord::lookup(&pool, "New York", "Paris")
            .await
            .unwrap();
        assert_eq!(cached, None);
    }

    #[tokio::test]
    async fn lookup_is_symmetric() {
        let pool = setup_pool().await;
        let user = User::new("alice", "hash").create(&pool).await.unwrap();

        DistanceRecord::store(&pool, user, "New York", "Paris", NY_PARIS)
            .await
            .unwrap();

        let forward = DistanceRecord::lookup(&pool, "New York", "Paris")
            .await
            .unwrap();
        let backward = DistanceRecord::lookup(&pool, "Paris", "New York")
            .await
            .unwrap();
        assert_eq!(forward, Some(NY_PARIS));
        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn lookup_is_exact() {
        let pool = setup_pool().await;
        let user = User::new("alice", "hash").create(&pool).await.unwrap();

        DistanceRecord::store(&pool, user, "New York", "Paris", NY_PARIS)
            .await
            .unwrap();

        for (a, b) in [
            ("new york", "Paris"),
            ("New York ", "Paris"),
            ("New York", "Paris, France"),
            ("New York", "New York"),
            ("Paris", "Paris"),
        ] {
            let cached = DistanceRecord::lookup(&pool, a, b).await.unwrap();
            assert_eq!(cached, None, "{a:?} - {b:?}");
        }
    }

    #[tokio::test]
    async fn store_doesnt_deduplicate() {
        let pool = setup_pool().await;
        let alice = User::new("alice", "hash").create(&pool).await.unwrap();
        let bob = User::new("bob", "hash").create(&pool).await.unwrap();

        let first = DistanceRecord::store(&pool, alice, "New York", "Paris", NY_PARIS)
            .await
            .unwrap();
        let second = DistanceRecord::store(&pool, bob, "Paris", "New York", NY_PARIS)
            .await
            .unwrap();
        let third = DistanceRecord::store(&pool, alice, "New York", "Paris", NY_PARIS)
            .await
            .unwrap();

        assert!(first.id < second.id);
        assert!(second.id < third.id);

        let (count,): (i64,) = sqlx::query_as("select count(*) from distances")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn lookup_returns_oldest_record() {
        let pool = setup_pool().await;
        let user = User::new("alice", "hash").create(&pool).await.unwrap();

        DistanceRecord::store(&pool, user, "A", "B", CachedDistance {
            kilometers: 1.0,
            miles: 0.62,
        })
        .await
        .unwrap();
        DistanceRecord::store(&pool, user, "B", "A", CachedDistance {
            kilometers: 2.0,
            miles: 1.24,
        })
        .await
        .unwrap();

        let cached = DistanceRecord::lookup(&pool, "B", "A").await.unwrap().unwrap();
        assert_eq!(cached.kilometers, 1.0);
    }

    #[tokio::test]
    async fn history_per_user() {
        let pool = setup_pool().await;
        let alice = User::new("alice", "hash").create(&pool).await.unwrap();
        let bob = User::new("bob", "hash").create(&pool).await.unwrap();

        let first = DistanceRecord::store(&pool, alice, "New York", "Paris", NY_PARIS)
            .await
            .unwrap();
        DistanceRecord::store(&pool, bob, "Paris", "New York", NY_PARIS)
            .await
            .unwrap();
        let second = DistanceRecord::store(&pool, alice, "Paris", "New York", NY_PARIS)
            .await
            .unwrap();

        let history = DistanceRecord::history(&pool, alice).await.unwrap();
        assert_eq!(history, vec![first, second]);

        let history = DistanceRecord::history(&pool, bob).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, bob);
        assert_eq!(history[0].place_a, "Paris");
        assert_eq!(history[0].place_b, "New York");
    }
}
