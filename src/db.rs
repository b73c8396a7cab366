use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Location, Node},
    storage::{NodeFilter, Storage},
};

const NODE_COLUMNS: &str = r#"
    n."address", n."rpc_port", n."p2p_port", n."moniker", n."node_id", n."network",
    n."version", n."tx_index", n."created_at", n."updated_at",
    l."country" AS "location_country", l."region" AS "location_region",
    l."city" AS "location_city", l."latitude" AS "location_latitude",
    l."longitude" AS "location_longitude"
"#;

/// Row of a node joined with its location
#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    address: String,
    rpc_port: String,
    p2p_port: String,
    moniker: String,
    node_id: String,
    network: String,
    version: String,
    tx_index: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    location_country: Option<String>,
    location_region: Option<String>,
    location_city: Option<String>,
    location_latitude: Option<String>,
    location_longitude: Option<String>,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            address: row.address,
            rpc_port: row.rpc_port,
            p2p_port: row.p2p_port,
            moniker: row.moniker,
            node_id: row.node_id,
            network: row.network,
            version: row.version,
            tx_index: row.tx_index,
            location: Location {
                country: row.location_country.unwrap_or_default(),
                region: row.location_region.unwrap_or_default(),
                city: row.location_city.unwrap_or_default(),
                latitude: row.location_latitude.unwrap_or_default(),
                longitude: row.location_longitude.unwrap_or_default(),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: Uuid,
    country: String,
    region: String,
    city: String,
    latitude: String,
    longitude: String,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            country: row.country,
            region: row.region,
            city: row.city,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

/// Node storage backed by Postgres
#[derive(Clone)]
pub struct PgStorage {
    pool: Pool<Postgres>,
}

impl PgStorage {
    /// Connect to the database and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| AppError::DbConnectionError(e.to_string()))?;

        let storage = PgStorage { pool };
        storage.ensure_schema().await?;

        tracing::info!("Database connection established");
        Ok(storage)
    }

    /// Create database schema if it doesn't exist
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "locations" (
                "id" UUID PRIMARY KEY,
                "created_at" TIMESTAMP WITH TIME ZONE NOT NULL,
                "updated_at" TIMESTAMP WITH TIME ZONE NOT NULL,
                "country" TEXT NOT NULL DEFAULT '',
                "region" TEXT NOT NULL DEFAULT '',
                "city" TEXT NOT NULL DEFAULT '',
                "latitude" TEXT NOT NULL,
                "longitude" TEXT NOT NULL,
                UNIQUE("latitude", "longitude")
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "nodes" (
                "id" UUID PRIMARY KEY,
                "created_at" TIMESTAMP WITH TIME ZONE NOT NULL,
                "updated_at" TIMESTAMP WITH TIME ZONE NOT NULL,
                "location_id" UUID REFERENCES "locations"("id"),
                "address" TEXT NOT NULL,
                "rpc_port" TEXT NOT NULL DEFAULT '',
                "p2p_port" TEXT NOT NULL DEFAULT '',
                "moniker" TEXT NOT NULL DEFAULT '',
                "node_id" TEXT NOT NULL DEFAULT '',
                "network" TEXT NOT NULL DEFAULT '',
                "version" TEXT NOT NULL DEFAULT '',
                "tx_index" TEXT NOT NULL DEFAULT '',
                UNIQUE("address", "network")
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The recheck loop scans by last update
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS "nodes_updated_at_idx" ON "nodes"("updated_at");
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema ensured");
        Ok(())
    }
}

/// Upsert a location inside an open transaction, returning its row
async fn upsert_location_row(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    location: &Location,
) -> Result<LocationRow, AppError> {
    if !location.has_coordinates() {
        return Err(AppError::ValidationError(
            "longitude and latitude are required".to_string(),
        ));
    }

    let now = Utc::now();
    let row = sqlx::query_as::<_, LocationRow>(
        r#"
        INSERT INTO "locations" (
            "id", "created_at", "updated_at", "country", "region", "city", "latitude", "longitude"
        )
        VALUES ($1, $2, $2, $3, $4, $5, $6, $7)
        ON CONFLICT ("latitude", "longitude")
        DO UPDATE SET
            "updated_at" = $2,
            "country" = $3,
            "region" = $4,
            "city" = $5
        RETURNING "id", "country", "region", "city", "latitude", "longitude"
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(now)
    .bind(&location.country)
    .bind(&location.region)
    .bind(&location.city)
    .bind(&location.latitude)
    .bind(&location.longitude)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

#[async_trait]
impl Storage for PgStorage {
    async fn query_node(&self, filter: &NodeFilter) -> Result<Option<Node>, AppError> {
        let sql = format!(
            r#"
            SELECT {NODE_COLUMNS}
            FROM "nodes" n
            LEFT JOIN "locations" l ON n."location_id" = l."id"
            WHERE ($1::TEXT IS NULL OR n."address" = $1)
              AND ($2::TEXT IS NULL OR n."network" = $2)
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, NodeRow>(&sql)
            .bind(&filter.address)
            .bind(&filter.network)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Node::from))
    }

    async fn upsert_node(&self, node: &Node) -> Result<Node, AppError> {
        let mut tx = self.pool.begin().await?;

        let location = upsert_location_row(&mut tx, &node.location).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO "nodes" (
                "id", "created_at", "updated_at", "location_id", "address", "rpc_port",
                "p2p_port", "moniker", "node_id", "network", "version", "tx_index"
            )
            VALUES ($1, $2, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT ("address", "network")
            DO UPDATE SET
                "updated_at" = $2,
                "location_id" = $3,
                "rpc_port" = $5,
                "p2p_port" = $6,
                "moniker" = $7,
                "node_id" = $8,
                "version" = $10,
                "tx_index" = $11
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(location.id)
        .bind(&node.address)
        .bind(&node.rpc_port)
        .bind(&node.p2p_port)
        .bind(&node.moniker)
        .bind(&node.node_id)
        .bind(&node.network)
        .bind(&node.version)
        .bind(&node.tx_index)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.query_node(&NodeFilter::by_address(&node.address).with_network(&node.network))
            .await?
            .ok_or_else(|| {
                AppError::DbError(format!(
                    "node {} ({}) missing after upsert",
                    node.address, node.network
                ))
            })
    }

    async fn delete_node(&self, node: &Node) -> Result<(), AppError> {
        sqlx::query(r#"DELETE FROM "nodes" WHERE "address" = $1"#)
            .bind(&node.address)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DbError(format!("failed to delete node: {}", e)))?;

        Ok(())
    }

    async fn get_stale_nodes(&self, threshold: DateTime<Utc>) -> Result<Vec<Node>, AppError> {
        let sql = format!(
            r#"
            SELECT {NODE_COLUMNS}
            FROM "nodes" n
            LEFT JOIN "locations" l ON n."location_id" = l."id"
            WHERE n."updated_at" < $1
            "#
        );

        let rows = sqlx::query_as::<_, NodeRow>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Node::from).collect())
    }

    async fn query_location(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> Result<Option<Location>, AppError> {
        let row = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT "id", "country", "region", "city", "latitude", "longitude"
            FROM "locations"
            WHERE "latitude" = $1 AND "longitude" = $2
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Location::from))
    }

    async fn upsert_location(&self, location: &Location) -> Result<Location, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = upsert_location_row(&mut tx, location).await?;
        tx.commit().await?;

        Ok(row.into())
    }
}
