use turso::{Connection, Row};

#[derive(Debug, Default)]
pub struct Kv {
    pub id: i64,
    pub module: String,
    pub key: String,
    pub sub_key: Option<String>,
    pub value: Option<String>,
}

pub async fn by_module(module: &str, conn: &Connection) -> anyhow::Result<Vec<Kv>> {
    let mut rows = conn
        .query(
            "SELECT id, module, key, sub_key, value FROM kvs WHERE module = ?1 ORDER BY id",
            (module,),
        )
        .await?;
    let mut kvs = Vec::new();
    while let Some(row) = rows.next().await? {
        if let Some(kv) = row_to_kv(Some(row))? {
            kvs.push(kv);
        }
    }
    Ok(kvs)
}

pub async fn by_module_and_key(
    module: &str,
    key: &str,
    conn: &Connection,
) -> anyhow::Result<Option<Kv>> {
    let mut rows = conn
        .query(
            "SELECT id, module, key, sub_key, value FROM kvs WHERE module = ?1 AND key = ?2 LIMIT 1",
            (module, key),
        )
        .await?;
    row_to_kv(rows.next().await?)
}

/// Replaces the value stored under `(module, key)`, inserting it when absent.
pub async fn upsert(module: &str, key: &str, value: &str, conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO kvs (module, key, sub_key, value) VALUES (?1, ?2, '', ?3) \
         ON CONFLICT (module, key) DO UPDATE SET value = excluded.value",
        (module, key, value),
    )
    .await?;
    Ok(())
}

pub async fn delete(module: &str, key: &str, conn: &Connection) -> anyhow::Result<bool> {
    let affected = conn
        .execute(
            "DELETE FROM kvs WHERE module = ?1 AND key = ?2",
            (module, key),
        )
        .await?;
    Ok(affected > 0)
}

/// Decodes the JSON value of every row in `module`, skipping rows that no
/// longer match the record shape.
pub async fn values<T: serde::de::DeserializeOwned>(
    module: &str,
    conn: &Connection,
) -> anyhow::Result<Vec<T>> {
    let mut records = Vec::new();
    for kv in by_module(module, conn).await? {
        let Some(json) = kv.value else { continue };
        match serde_json::from_str(&json) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Db: skipping {}/{}: {}", module, kv.key, e),
        }
    }
    Ok(records)
}

pub async fn value<T: serde::de::DeserializeOwned>(
    module: &str,
    key: &str,
    conn: &Connection,
) -> anyhow::Result<Option<T>> {
    match by_module_and_key(module, key, conn).await? {
        Some(Kv {
            value: Some(json), ..
        }) => Ok(Some(serde_json::from_str(&json)?)),
        _ => Ok(None),
    }
}

pub async fn put<T: serde::Serialize>(
    module: &str,
    key: &str,
    record: &T,
    conn: &Connection,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(record)?;
    upsert(module, key, &json, conn).await
}

fn row_to_kv(row: Option<Row>) -> anyhow::Result<Option<Kv>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let id = row
        .get_value(0)?
        .as_integer()
        .ok_or_else(|| anyhow::anyhow!("id is null"))?
        .to_owned();
    let module = row
        .get_value(1)?
        .as_text()
        .ok_or_else(|| anyhow::anyhow!("module is null"))?
        .to_owned();
    let key = row
        .get_value(2)?
        .as_text()
        .ok_or_else(|| anyhow::anyhow!("key is null"))?
        .to_owned();
    let sub_key = row.get_value(3)?.as_text().map(|s| s.to_owned());
    let value = row.get_value(4)?.as_text().map(|s| s.to_owned());
    Ok(Some(Kv {
        id,
        module,
        key,
        sub_key,
        value,
    }))
}
