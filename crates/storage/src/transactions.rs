use categorizer_core::{
    CategoryId, CategorySource, Money, NewTransaction, Transaction, TransactionId,
};
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::{DbPool, StorageError};

type TransactionRow = (
    i64,
    NaiveDate,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    String,
);

const TRANSACTION_COLUMNS: &str =
    "id, date, description, amount_cents, merchant, notes, category_id, category_source, created_at";

fn to_transaction(r: TransactionRow) -> Transaction {
    let category_source = r.7.as_deref().and_then(|s| match s.parse::<CategorySource>() {
        Ok(source) => Some(source),
        Err(e) => {
            tracing::warn!(transaction_id = r.0, error = %e, "Ignoring stored category source");
            None
        }
    });
    Transaction {
        id: TransactionId(r.0),
        date: r.1,
        description: r.2,
        amount: Money::from_cents(r.3),
        merchant: r.4,
        notes: r.5,
        category_id: r.6.map(CategoryId),
        category_source,
        created_at: r.8,
    }
}

/// Listing filters. All set filters must hold.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub category_id: Option<CategoryId>,
    pub uncategorized: bool,
    /// Case-insensitive substring of description, merchant or notes.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Newest first.
pub async fn list_transactions(
    pool: &DbPool,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"
    ));

    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id.0);
    }
    if filter.uncategorized {
        qb.push(" AND category_id IS NULL");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        qb.push(" AND (lower(description) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(coalesce(merchant, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(coalesce(notes, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    qb.push(" ORDER BY date DESC, id DESC");
    // SQLite needs a LIMIT before it accepts an OFFSET.
    qb.push(" LIMIT ").push_bind(filter.limit.unwrap_or(-1));
    if let Some(offset) = filter.offset {
        qb.push(" OFFSET ").push_bind(offset);
    }

    let rows = qb.build_query_as::<TransactionRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(to_transaction).collect())
}

/// Search text matches literally; `%` and `_` are not wildcards.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn get_transaction(
    pool: &DbPool,
    id: TransactionId,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(to_transaction))
}

/// Transactions dated within `[start, end]`, used for duplicate checks.
pub async fn get_transactions_between(
    pool: &DbPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE date >= ? AND date <= ? ORDER BY date, id"
    ))
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_transaction).collect())
}

/// Candidates for a rule pass: uncategorized transactions, plus those a rule
/// categorized earlier when `include_rule_assigned` is set. Manual choices are
/// never returned.
pub async fn get_transactions_for_categorization(
    pool: &DbPool,
    include_rule_assigned: bool,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let sql = if include_rule_assigned {
        format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE category_id IS NULL OR category_source = 'rule' ORDER BY id"
        )
    } else {
        format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE category_id IS NULL ORDER BY id")
    };
    let rows = sqlx::query_as::<_, TransactionRow>(&sql).fetch_all(pool).await?;

    Ok(rows.into_iter().map(to_transaction).collect())
}

pub async fn insert_transaction(
    pool: &DbPool,
    tx: &NewTransaction,
) -> Result<Transaction, StorageError> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "INSERT INTO transactions (date, description, amount_cents, merchant, notes, category_id, category_source) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(tx.date)
    .bind(&tx.description)
    .bind(tx.amount.to_cents())
    .bind(&tx.merchant)
    .bind(&tx.notes)
    .bind(tx.category_id.map(|c| c.0))
    .bind(tx.category_source.map(CategorySource::as_str))
    .fetch_one(pool)
    .await
    .map_err(|e| StorageError::from_write(e, || "Transaction already exists".to_string()))?;

    Ok(to_transaction(row))
}

/// Inserts all transactions or none of them.
pub async fn insert_transactions(
    pool: &DbPool,
    transactions: &[NewTransaction],
) -> Result<Vec<TransactionId>, StorageError> {
    let mut db_tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(transactions.len());

    for tx in transactions {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO transactions (date, description, amount_cents, merchant, notes, category_id, category_source) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(tx.date)
        .bind(&tx.description)
        .bind(tx.amount.to_cents())
        .bind(&tx.merchant)
        .bind(&tx.notes)
        .bind(tx.category_id.map(|c| c.0))
        .bind(tx.category_source.map(CategorySource::as_str))
        .fetch_one(&mut *db_tx)
        .await
        .map_err(|e| StorageError::from_write(e, || "Transaction already exists".to_string()))?;
        ids.push(TransactionId(id));
    }

    db_tx.commit().await?;
    tracing::debug!(count = ids.len(), "Inserted transactions");
    Ok(ids)
}

/// Replaces every editable field.
pub async fn update_transaction(
    pool: &DbPool,
    id: TransactionId,
    tx: &NewTransaction,
) -> Result<Transaction, StorageError> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "UPDATE transactions SET date = ?, description = ?, amount_cents = ?, merchant = ?, notes = ?, \
         category_id = ?, category_source = ? WHERE id = ? RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(tx.date)
    .bind(&tx.description)
    .bind(tx.amount.to_cents())
    .bind(&tx.merchant)
    .bind(&tx.notes)
    .bind(tx.category_id.map(|c| c.0))
    .bind(tx.category_source.map(CategorySource::as_str))
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::from_write(e, || "Transaction already exists".to_string()))?;

    row.map(to_transaction)
        .ok_or_else(|| StorageError::not_found("Transaction", id.0))
}

/// Assigns rule-chosen categories in one database transaction.
pub async fn assign_rule_categories(
    pool: &DbPool,
    assignments: &[(TransactionId, CategoryId)],
) -> Result<u64, StorageError> {
    let mut db_tx = pool.begin().await?;
    let mut updated = 0;

    for (tx_id, category_id) in assignments {
        let result = sqlx::query(
            "UPDATE transactions SET category_id = ?, category_source = 'rule' \
             WHERE id = ? AND (category_source IS NULL OR category_source <> 'manual')",
        )
        .bind(category_id.0)
        .bind(tx_id.0)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| StorageError::from_write(e, String::new))?;
        updated += result.rows_affected();
    }

    db_tx.commit().await?;
    Ok(updated)
}

pub async fn delete_transaction(pool: &DbPool, id: TransactionId) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Transaction", id.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{delete_category, insert_category};
    use crate::db::create_memory_db;
    use categorizer_core::NewCategory;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_tx(desc: &str, d: NaiveDate, cents: i64) -> NewTransaction {
        NewTransaction {
            date: d,
            description: desc.to_string(),
            amount: Money::from_cents(cents),
            merchant: None,
            notes: None,
            category_id: None,
            category_source: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip_fields() {
        let pool = create_memory_db().await.unwrap();
        let mut tx = new_tx("TestTransaction", date(2026, 2, 15), -2550);
        tx.merchant = Some("Test Merchant".to_string());

        let stored = insert_transaction(&pool, &tx).await.unwrap();
        let fetched = get_transaction(&pool, stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.date, date(2026, 2, 15));
        assert_eq!(fetched.amount, Money::from_cents(-2550));
        assert_eq!(fetched.merchant.as_deref(), Some("Test Merchant"));
        assert_eq!(fetched.category_id, None);
        assert_eq!(fetched.category_source, None);
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let pool = create_memory_db().await.unwrap();
        let coffee = insert_category(&pool, &NewCategory::new("Coffee", None))
            .await
            .unwrap();

        let mut categorized = new_tx("Blue Bottle", date(2026, 2, 10), -450);
        categorized.category_id = Some(coffee.id);
        categorized.category_source = Some(CategorySource::Manual);
        let mut noted = new_tx("Hardware store", date(2026, 2, 12), -3000);
        noted.notes = Some("bottle opener".to_string());
        insert_transactions(
            &pool,
            &[categorized, noted, new_tx("Rent", date(2026, 2, 1), -150000)],
        )
        .await
        .unwrap();

        let all = list_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        let descs: Vec<&str> = all.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descs, vec!["Hardware store", "Blue Bottle", "Rent"]);

        let by_category = TransactionFilter {
            category_id: Some(coffee.id),
            ..TransactionFilter::default()
        };
        assert_eq!(list_transactions(&pool, &by_category).await.unwrap().len(), 1);

        let uncategorized = TransactionFilter {
            uncategorized: true,
            ..TransactionFilter::default()
        };
        assert_eq!(list_transactions(&pool, &uncategorized).await.unwrap().len(), 2);

        let search = TransactionFilter {
            search: Some("BOTTLE".to_string()),
            ..TransactionFilter::default()
        };
        assert_eq!(list_transactions(&pool, &search).await.unwrap().len(), 2);

        let page = TransactionFilter {
            limit: Some(1),
            offset: Some(1),
            ..TransactionFilter::default()
        };
        let page = list_transactions(&pool, &page).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].description, "Blue Bottle");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let pool = create_memory_db().await.unwrap();
        insert_transactions(
            &pool,
            &[
                new_tx("50% off sale", date(2026, 3, 1), -1000),
                new_tx("500 widgets", date(2026, 3, 2), -2000),
                new_tx("ACH_TRANSFER", date(2026, 3, 3), -3000),
                new_tx("ACHXTRANSFER", date(2026, 3, 4), -4000),
            ],
        )
        .await
        .unwrap();

        let search = |text: &str| TransactionFilter {
            search: Some(text.to_string()),
            ..TransactionFilter::default()
        };
        let found = list_transactions(&pool, &search("50%")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "50% off sale");

        let found = list_transactions(&pool, &search("ach_")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "ACH_TRANSFER");
    }

    #[tokio::test]
    async fn deleting_category_uncategorizes_transactions() {
        let pool = create_memory_db().await.unwrap();
        let cat = insert_category(&pool, &NewCategory::new("Travel", None))
            .await
            .unwrap();
        let mut tx = new_tx("Flight", date(2026, 3, 1), -40000);
        tx.category_id = Some(cat.id);
        tx.category_source = Some(CategorySource::Manual);
        let stored = insert_transaction(&pool, &tx).await.unwrap();

        delete_category(&pool, cat.id).await.unwrap();
        let after = get_transaction(&pool, stored.id).await.unwrap().unwrap();
        assert_eq!(after.category_id, None);
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let pool = create_memory_db().await.unwrap();
        let mut tx = new_tx("Flight", date(2026, 3, 1), -40000);
        tx.category_id = Some(CategoryId(99));
        assert!(matches!(
            insert_transaction(&pool, &tx).await,
            Err(StorageError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn batch_insert_is_all_or_nothing() {
        let pool = create_memory_db().await.unwrap();
        let mut bad = new_tx("Bad", date(2026, 3, 2), -1);
        bad.category_id = Some(CategoryId(99));
        let result = insert_transactions(&pool, &[new_tx("Good", date(2026, 3, 1), -1), bad]).await;
        assert!(result.is_err());
        assert!(list_transactions(&pool, &TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rule_assignment_never_overrides_manual() {
        let pool = create_memory_db().await.unwrap();
        let manual_cat = insert_category(&pool, &NewCategory::new("Manual", None))
            .await
            .unwrap();
        let rule_cat = insert_category(&pool, &NewCategory::new("Ruled", None))
            .await
            .unwrap();

        let mut manual = new_tx("Manual pick", date(2026, 3, 1), -100);
        manual.category_id = Some(manual_cat.id);
        manual.category_source = Some(CategorySource::Manual);
        let ids = insert_transactions(&pool, &[manual, new_tx("Open", date(2026, 3, 2), -200)])
            .await
            .unwrap();

        let updated = assign_rule_categories(&pool, &[(ids[0], rule_cat.id), (ids[1], rule_cat.id)])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let first = get_transaction(&pool, ids[0]).await.unwrap().unwrap();
        assert_eq!(first.category_id, Some(manual_cat.id));
        let second = get_transaction(&pool, ids[1]).await.unwrap().unwrap();
        assert_eq!(second.category_id, Some(rule_cat.id));
        assert_eq!(second.category_source, Some(CategorySource::Rule));

        assert!(get_transactions_for_categorization(&pool, false)
            .await
            .unwrap()
            .is_empty());
        let rerun = get_transactions_for_categorization(&pool, true).await.unwrap();
        assert_eq!(rerun.len(), 1);
        assert_eq!(rerun[0].id, ids[1]);
    }

    #[tokio::test]
    async fn between_is_inclusive() {
        let pool = create_memory_db().await.unwrap();
        insert_transactions(
            &pool,
            &[
                new_tx("a", date(2026, 1, 31), -1),
                new_tx("b", date(2026, 2, 1), -1),
                new_tx("c", date(2026, 2, 28), -1),
                new_tx("d", date(2026, 3, 1), -1),
            ],
        )
        .await
        .unwrap();
        let found = get_transactions_between(&pool, date(2026, 2, 1), date(2026, 2, 28))
            .await
            .unwrap();
        let descs: Vec<&str> = found.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descs, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let pool = create_memory_db().await.unwrap();
        let tx = new_tx("x", date(2026, 1, 1), -1);
        assert!(matches!(
            update_transaction(&pool, TransactionId(5), &tx).await,
            Err(StorageError::NotFound { entity: "Transaction", id: 5 })
        ));
        assert!(matches!(
            delete_transaction(&pool, TransactionId(5)).await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
