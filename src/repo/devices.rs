#![cfg(feature = "db")]

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{EdgeFilter, Endpoint, StoreError};
use crate::domain::{Device, DevicePatch, DeviceQuery, EnergizeField, PageRequest, Subject};

const DEVICE_COLUMNS: &str = r#"id, project, file_page, subject, rect_px, polygon_points_px, text, comments,
    energized, energized_today, "from", "to", will_energized_at, created_at, updated_at"#;

pub struct DeviceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeviceRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StoreError> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(device)
    }

    pub async fn list(
        &self,
        query: &DeviceQuery,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Device>, u64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM devices WHERE TRUE");
        push_query(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE TRUE"));
        push_query(&mut select, query);
        select.push(" ORDER BY updated_at DESC, id");
        if let Some(page) = page {
            select
                .push(" LIMIT ")
                .push_bind(i64::from(page.size))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
        }
        let devices = select.build_query_as::<Device>().fetch_all(self.pool).await?;

        Ok((devices, total.max(0) as u64))
    }

    pub async fn insert(&self, device: &Device) -> Result<Device, StoreError> {
        let row = sqlx::query_as::<_, Device>(&format!(
            r#"
            INSERT INTO devices (id, project, file_page, subject, rect_px, polygon_points_px, text, comments,
                energized, energized_today, "from", "to", will_energized_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(&device.id)
        .bind(&device.project)
        .bind(device.file_page)
        .bind(&device.subject)
        .bind(&device.rect_px)
        .bind(&device.polygon_points_px)
        .bind(&device.text)
        .bind(&device.comments)
        .bind(device.energized)
        .bind(device.energized_today)
        .bind(&device.from)
        .bind(&device.to)
        .bind(device.will_energized_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_or_db(&device.id, e))?;

        Ok(row)
    }

    pub async fn update(&self, id: &str, patch: &DevicePatch) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query_as::<_, Device>(&format!(
            r#"
            UPDATE devices
            SET text = COALESCE($2, text),
                comments = COALESCE($3, comments),
                energized = COALESCE($4, energized),
                energized_today = COALESCE($5, energized_today),
                will_energized_at = COALESCE($6, will_energized_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.text)
        .bind(&patch.comments)
        .bind(patch.energized)
        .bind(patch.energized_today)
        .bind(patch.will_energized_at)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_many(&self, devices: &[Device]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for device in devices {
            let result = sqlx::query(
                r#"
                INSERT INTO devices (id, project, file_page, subject, rect_px, polygon_points_px, text, comments,
                    energized, energized_today, "from", "to", will_energized_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (id) DO UPDATE SET
                    project = EXCLUDED.project,
                    file_page = EXCLUDED.file_page,
                    subject = EXCLUDED.subject,
                    rect_px = EXCLUDED.rect_px,
                    polygon_points_px = EXCLUDED.polygon_points_px,
                    text = EXCLUDED.text,
                    comments = EXCLUDED.comments,
                    energized = EXCLUDED.energized,
                    energized_today = EXCLUDED.energized_today,
                    "from" = EXCLUDED."from",
                    "to" = EXCLUDED."to",
                    will_energized_at = EXCLUDED.will_energized_at,
                    updated_at = NOW()
                "#,
            )
            .bind(&device.id)
            .bind(&device.project)
            .bind(device.file_page)
            .bind(&device.subject)
            .bind(&device.rect_px)
            .bind(&device.polygon_points_px)
            .bind(&device.text)
            .bind(&device.comments)
            .bind(device.energized)
            .bind(device.energized_today)
            .bind(&device.from)
            .bind(&device.to)
            .bind(device.will_energized_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        Ok(written)
    }

    pub async fn find_ids(&self, subjects: &[Subject]) -> Result<Vec<String>, StoreError> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM devices WHERE subject = ANY($1)")
            .bind(Subject::tags_of(subjects))
            .fetch_all(self.pool)
            .await?;

        Ok(ids)
    }

    pub async fn find_edge_endpoints(
        &self,
        filter: &EdgeFilter,
        anchor: Endpoint,
    ) -> Result<Vec<String>, StoreError> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }
        let column = anchor.column();
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            r#"SELECT "{column}" FROM devices WHERE "{column}" IS NOT NULL"#
        ));
        push_edge_filter(&mut qb, filter);
        let ids = qb.build_query_scalar::<String>().fetch_all(self.pool).await?;

        Ok(ids)
    }

    pub async fn update_field(
        &self,
        subject: Subject,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&format!(
            "UPDATE devices SET {} = $1, updated_at = NOW() WHERE subject = ANY($2) AND id = ANY($3)",
            field.column()
        ))
        .bind(value)
        .bind(Subject::tags_of(&[subject]))
        .bind(ids)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn update_edge_field(
        &self,
        filter: &EdgeFilter,
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        if filter.matches_nothing() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE devices SET {} = ", field.column()));
        qb.push_bind(value);
        qb.push(", updated_at = NOW() WHERE TRUE");
        push_edge_filter(&mut qb, filter);
        let result = qb.build().execute(self.pool).await?;

        Ok(result.rows_affected())
    }

    pub async fn count_where_true(&self, ids: &[String], field: EnergizeField) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM devices WHERE id = ANY($1) AND {}",
            field.column()
        ))
        .bind(ids)
        .fetch_one(self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}

fn push_query(qb: &mut QueryBuilder<'_, Postgres>, query: &DeviceQuery) {
    if let Some(project) = &query.project {
        qb.push(" AND project = ").push_bind(project.clone());
    }
    if let Some(subjects) = &query.subjects {
        qb.push(" AND subject = ANY(")
            .push_bind(Subject::tags_of(subjects))
            .push(")");
    }
    if let Some(needle) = &query.text_contains {
        qb.push(" AND text ILIKE ")
            .push_bind(format!("%{}%", escape_like(needle)));
    }
    if let Some(file_page) = query.file_page {
        qb.push(" AND file_page = ").push_bind(file_page);
    }
}

/// Restricts to edge rows; a constrained side needs a non-null endpoint in
/// its list, which `= ANY` gives for free.
fn push_edge_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EdgeFilter) {
    qb.push(" AND subject = ANY(")
        .push_bind(Subject::tags_of(&[Subject::PolyLine]))
        .push(")");
    if let Some(from) = filter.from() {
        qb.push(r#" AND "from" = ANY("#).push_bind(from.to_vec()).push(")");
    }
    if let Some(to) = filter.to() {
        qb.push(r#" AND "to" = ANY("#).push_bind(to.to_vec()).push(")");
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn conflict_or_db(id: &str, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(id.to_string()),
        _ => StoreError::Database(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("LAB_25%"), "LAB\\_25\\%");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_edge_filter_sql() {
        let ids = vec!["BUS1".to_string()];
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE devices SET energized = TRUE WHERE TRUE");
        push_edge_filter(&mut qb, &EdgeFilter::from_ids(&ids));
        let sql = qb.sql();
        assert!(sql.contains(r#""from" = ANY($2)"#));
        assert!(!sql.contains(r#""to""#));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_device_crud() {
        let url = std::env::var("SLD__DB__URL").expect("SLD__DB__URL");
        let pool = PgPool::connect(&url).await.unwrap();
        let repo = DeviceRepository::new(&pool);

        let device = Device::new("pg-test-P1", "panel board");
        repo.delete(&device.id).await.unwrap();
        repo.insert(&device).await.unwrap();
        assert!(matches!(
            repo.insert(&device).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(repo.delete(&device.id).await.unwrap());
    }
}
