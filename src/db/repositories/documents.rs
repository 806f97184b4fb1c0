use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{
    helpers::{decode_body, encode_body, json_path},
    Database,
};
use crate::store::{Document, FieldOp, Fields, OrderedQuery, SortDirection};

impl Database {
    pub async fn load_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to load document {collection}/{id}"))?;

            raw.map(|body| decode_body(&body, &id).map(|fields| Document::new(id.clone(), fields)))
                .transpose()
        })
        .await
    }

    pub async fn write_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO documents (collection, id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     body = excluded.body,
                     updated_at = excluded.updated_at",
                params![collection, id, encode_body(&fields)?, now],
            )
            .with_context(|| format!("failed to write document {collection}/{id}"))?;
            Ok(())
        })
        .await
    }

    /// Read, mutate and write back inside one transaction so concurrent
    /// increments never lose an update.
    pub async fn apply_field_ops(
        &self,
        collection: &str,
        id: &str,
        ops: Vec<FieldOp>,
    ) -> Result<()> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open update transaction")?;

            let raw: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| anyhow!("document {collection}/{id} not found"))?;

            let mut fields = decode_body(&raw, &id)?;
            for op in &ops {
                op.apply(&mut fields);
            }

            tx.execute(
                "UPDATE documents SET body = ?1, updated_at = ?2
                 WHERE collection = ?3 AND id = ?4",
                params![encode_body(&fields)?, Utc::now().to_rfc3339(), collection, id],
            )
            .with_context(|| format!("failed to update document {collection}/{id}"))?;

            tx.commit().context("failed to commit document update")?;
            Ok(())
        })
        .await
    }

    pub async fn load_ordered(&self, query: &OrderedQuery) -> Result<Vec<Document>> {
        let query = query.clone();
        self.execute(move |conn| {
            let direction = match query.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            let sql = format!(
                "SELECT id, body FROM documents
                 WHERE collection = ?1 AND json_type(body, ?2) IN ('integer', 'real')
                 ORDER BY json_extract(body, ?2) {direction}, id ASC"
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![query.collection, json_path(&query.sort_field)])?;

            let mut documents = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let body: String = row.get(1)?;
                let fields = decode_body(&body, &id)?;
                documents.push(Document::new(id, fields));
            }

            Ok(documents)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::store::{DocumentStore, FieldOp, Fields, OrderedQuery, SortDirection};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn increments_and_appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.set_document("leaderboard", "u1", fields(json!({ "xp": 0, "studySessions": [] })))
                .await
                .unwrap();
            db.update_document(
                "leaderboard",
                "u1",
                vec![
                    FieldOp::increment("xp", 1.0),
                    FieldOp::increment("minutesStudied", 0.1),
                    FieldOp::append("studySessions", 0.1),
                ],
            )
            .await
            .unwrap();
        }

        let db = Database::new(path).unwrap();
        let doc = db.get_document("leaderboard", "u1").await.unwrap().unwrap();
        assert_eq!(doc.number("xp"), Some(1.0));
        assert_eq!(doc.number("minutesStudied"), Some(0.1));
        assert_eq!(doc.fields["studySessions"], json!([0.1]));
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let (_dir, db) = open_temp();
        let result = db
            .update_document("leaderboard", "nobody", vec![FieldOp::set("isStudying", true)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ordered_query_sorts_by_numeric_field() {
        let (_dir, db) = open_temp();
        db.set_document("leaderboard", "a", fields(json!({ "xp": 50 }))).await.unwrap();
        db.set_document("leaderboard", "b", fields(json!({ "xp": 100.5 }))).await.unwrap();
        db.set_document("leaderboard", "c", fields(json!({ "xp": 80 }))).await.unwrap();
        db.set_document("leaderboard", "d", fields(json!({ "username": "no xp yet" })))
            .await
            .unwrap();
        db.set_document("other", "e", fields(json!({ "xp": 999 }))).await.unwrap();

        let query = OrderedQuery::new("leaderboard", "xp", SortDirection::Descending);
        let ids: Vec<String> = db
            .query_ordered(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
