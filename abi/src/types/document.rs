use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Error, FromRow, Row};

use crate::model::{DocPath, Document, Fields};

impl FromRow<'_, PgRow> for Document {
    fn from_row(row: &'_ PgRow) -> Result<Self, Error> {
        let path: String = row.try_get("path")?;
        let path = DocPath::parse(path).map_err(|e| Error::ColumnDecode {
            index: "path".to_string(),
            source: Box::new(e),
        })?;
        let Json(fields): Json<Fields> = row.try_get("fields")?;
        Ok(Self {
            path,
            fields,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }
}
