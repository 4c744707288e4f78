use categorizer_core::{Category, CategoryId, NewCategory};

use crate::db::{DbPool, StorageError};

type CategoryRow = (i64, String, Option<String>, String);

fn to_category(r: CategoryRow) -> Category {
    Category {
        id: CategoryId(r.0),
        name: r.1,
        color: r.2,
        created_at: r.3,
    }
}

pub async fn get_all_categories(pool: &DbPool) -> Result<Vec<Category>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, color, created_at FROM categories ORDER BY name COLLATE NOCASE",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_category).collect())
}

pub async fn get_category(pool: &DbPool, id: CategoryId) -> Result<Option<Category>, sqlx::Error> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, color, created_at FROM categories WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(to_category))
}

pub async fn insert_category(pool: &DbPool, category: &NewCategory) -> Result<Category, StorageError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "INSERT INTO categories (name, color) VALUES (?, ?) RETURNING id, name, color, created_at",
    )
    .bind(&category.name)
    .bind(&category.color)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        StorageError::from_write(e, || format!("Category '{}' already exists", category.name))
    })?;

    Ok(to_category(row))
}

pub async fn update_category(
    pool: &DbPool,
    id: CategoryId,
    category: &NewCategory,
) -> Result<Category, StorageError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "UPDATE categories SET name = ?, color = ? WHERE id = ? RETURNING id, name, color, created_at",
    )
    .bind(&category.name)
    .bind(&category.color)
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        StorageError::from_write(e, || format!("Category '{}' already exists", category.name))
    })?;

    row.map(to_category)
        .ok_or_else(|| StorageError::not_found("Category", id.0))
}

/// Transactions in the category become uncategorized; rules targeting it are
/// removed by the foreign key cascade.
pub async fn delete_category(pool: &DbPool, id: CategoryId) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Category", id.0));
    }
    Ok(())
}
