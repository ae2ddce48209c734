//! The spatial database the tile queries run against.
use std::str::FromStr;
use std::time::Duration;

// TODO: remove once async fn in dyn traits become stable
use async_trait::async_trait;

use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Row, Statement, TypeInfo};

use crate::error::BackendError;
use crate::query::{QueryParam, TileQuery};

/// Executes composed tile queries. Implementations own connection pooling
/// and the per-query timeout.
#[async_trait]
pub trait TileBackend: Send + Sync {
    /// Runs a tile query returning at most one scalar column. `None` means
    /// no row or a NULL value.
    async fn fetch_tile(&self, query: &TileQuery) -> Result<Option<Vec<u8>>, BackendError>;

    /// Runs a column discovery query and reports the columns it yields.
    async fn describe_columns(&self, query: &TileQuery) -> Result<Vec<String>, BackendError>;
}

/// Connection settings for [`PgBackend`].
#[derive(Clone, Debug)]
pub struct PgBackendOptions {
    pub max_connections: u32,
    pub statement_timeout: Duration,
    pub acquire_timeout: Duration,
}

/// PostGIS backed [`TileBackend`].
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(
        database_url: &str,
        options: &PgBackendOptions,
    ) -> Result<PgBackend, BackendError> {
        let connect_options = PgConnectOptions::from_str(database_url)?.options([(
            "statement_timeout",
            options.statement_timeout.as_millis().to_string(),
        )]);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await?;

        Ok(PgBackend { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await
    }
}

fn bind_params<'q>(query: &'q TileQuery) -> Query<'q, Postgres, PgArguments> {
    query
        .params
        .iter()
        .fold(sqlx::query(&query.sql), |acc, param| match *param {
            QueryParam::Float(value) => acc.bind(value),
            QueryParam::Int(value) => acc.bind(value),
        })
}

fn scalar_bytes(row: &PgRow) -> Result<Option<Vec<u8>>, sqlx::Error> {
    let column = row.try_column(0)?;
    if column.type_info().name() == "BYTEA" {
        row.try_get::<Option<Vec<u8>>, _>(0)
    } else {
        Ok(row
            .try_get::<Option<String>, _>(0)?
            .map(String::into_bytes))
    }
}

#[async_trait]
impl TileBackend for PgBackend {
    async fn fetch_tile(&self, query: &TileQuery) -> Result<Option<Vec<u8>>, BackendError> {
        let row = bind_params(query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(scalar_bytes(&row)?),
            None => Ok(None),
        }
    }

    async fn describe_columns(&self, query: &TileQuery) -> Result<Vec<String>, BackendError> {
        let row = bind_params(query).fetch_optional(&self.pool).await?;
        let columns = match row {
            Some(row) => row.columns().iter().map(|c| c.name().to_owned()).collect(),
            // An empty layer still describes its columns
            None => {
                let statement = self.pool.prepare(&query.sql).await?;
                statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_owned())
                    .collect()
            }
        };

        Ok(columns)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory backend returning scripted results and counting calls.
    pub(crate) struct FakeBackend {
        tile: Result<Option<Vec<u8>>, BackendError>,
        columns: Vec<String>,
        fetches: AtomicUsize,
        describes: AtomicUsize,
        last_query: Mutex<Option<TileQuery>>,
    }

    impl FakeBackend {
        pub(crate) fn returning(tile: Option<Vec<u8>>) -> FakeBackend {
            FakeBackend {
                tile: Ok(tile),
                columns: Vec::new(),
                fetches: AtomicUsize::new(0),
                describes: AtomicUsize::new(0),
                last_query: Mutex::new(None),
            }
        }

        pub(crate) fn empty() -> FakeBackend {
            FakeBackend::returning(None)
        }

        pub(crate) fn failing(err: BackendError) -> FakeBackend {
            FakeBackend {
                tile: Err(err),
                ..FakeBackend::empty()
            }
        }

        pub(crate) fn with_columns(mut self, columns: &[&str]) -> FakeBackend {
            self.columns = columns.iter().map(|c| c.to_string()).collect();
            self
        }

        pub(crate) fn fetch_calls(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub(crate) fn describe_calls(&self) -> usize {
            self.describes.load(Ordering::SeqCst)
        }

        pub(crate) fn last_query(&self) -> Option<TileQuery> {
            self.last_query.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TileBackend for FakeBackend {
        async fn fetch_tile(&self, query: &TileQuery) -> Result<Option<Vec<u8>>, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some(query.clone());
            self.tile.clone()
        }

        async fn describe_columns(&self, query: &TileQuery) -> Result<Vec<String>, BackendError> {
            self.describes.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some(query.clone());
            match &self.tile {
                Err(err) => Err(err.clone()),
                Ok(_) => Ok(self.columns.clone()),
            }
        }
    }
}
