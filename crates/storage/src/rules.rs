use categorizer_core::{CategoryId, Rule, RuleId, ValidatedRule};

use crate::db::{DbPool, StorageError};

type RuleRow = (i64, String, String, String, String, i64, i32, bool, String, String);

const RULE_COLUMNS: &str =
    "id, name, field, operator, value, category_id, priority, active, created_at, updated_at";

fn to_rule(r: RuleRow) -> Rule {
    Rule {
        id: RuleId(r.0),
        name: r.1,
        field: r.2,
        operator: r.3,
        value: r.4,
        category_id: CategoryId(r.5),
        priority: r.6,
        active: r.7,
        created_at: r.8,
        updated_at: r.9,
    }
}

/// All rules in evaluation order: highest priority first, older rule first on a tie.
pub async fn get_all_rules(pool: &DbPool) -> Result<Vec<Rule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM rules ORDER BY priority DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_rule).collect())
}

pub async fn get_active_rules(pool: &DbPool) -> Result<Vec<Rule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM rules WHERE active = 1 ORDER BY priority DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_rule).collect())
}

pub async fn get_rule(pool: &DbPool, id: RuleId) -> Result<Option<Rule>, sqlx::Error> {
    let row = sqlx::query_as::<_, RuleRow>(&format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(to_rule))
}

pub async fn insert_rule(pool: &DbPool, rule: &ValidatedRule) -> Result<Rule, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "INSERT INTO rules (name, field, operator, value, category_id, priority, active) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {RULE_COLUMNS}"
    ))
    .bind(&rule.name)
    .bind(rule.field.as_str())
    .bind(rule.operator.as_str())
    .bind(&rule.value)
    .bind(rule.category_id.0)
    .bind(rule.priority)
    .bind(rule.active)
    .fetch_one(pool)
    .await
    .map_err(|e| StorageError::from_write(e, || format!("Rule '{}' already exists", rule.name)))?;

    Ok(to_rule(row))
}

pub async fn update_rule(pool: &DbPool, id: RuleId, rule: &ValidatedRule) -> Result<Rule, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "UPDATE rules SET name = ?, field = ?, operator = ?, value = ?, category_id = ?, \
         priority = ?, active = ?, updated_at = datetime('now') WHERE id = ? RETURNING {RULE_COLUMNS}"
    ))
    .bind(&rule.name)
    .bind(rule.field.as_str())
    .bind(rule.operator.as_str())
    .bind(&rule.value)
    .bind(rule.category_id.0)
    .bind(rule.priority)
    .bind(rule.active)
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::from_write(e, || format!("Rule '{}' already exists", rule.name)))?;

    row.map(to_rule).ok_or_else(|| StorageError::not_found("Rule", id.0))
}

/// Flips the active flag and returns the updated rule.
pub async fn toggle_rule(pool: &DbPool, id: RuleId) -> Result<Rule, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "UPDATE rules SET active = 1 - active, updated_at = datetime('now') WHERE id = ? RETURNING {RULE_COLUMNS}"
    ))
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    row.map(to_rule).ok_or_else(|| StorageError::not_found("Rule", id.0))
}

pub async fn delete_rule(pool: &DbPool, id: RuleId) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM rules WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Rule", id.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{delete_category, insert_category};
    use crate::db::create_memory_db;
    use categorizer_core::{NewCategory, UnvalidatedRule};

    fn rule(name: &str, category_id: CategoryId, priority: i32) -> ValidatedRule {
        ValidatedRule::validate(UnvalidatedRule {
            name: name.to_string(),
            field: "merchant".to_string(),
            operator: "contains".to_string(),
            value: "test-value".to_string(),
            category_id,
            priority,
            active: true,
        })
        .unwrap()
    }

    async fn setup() -> (DbPool, CategoryId) {
        let pool = create_memory_db().await.unwrap();
        let category = insert_category(&pool, &NewCategory::new("Coffee", None))
            .await
            .unwrap();
        (pool, category.id)
    }

    #[tokio::test]
    async fn crud_round() {
        let (pool, cat) = setup().await;
        let created = insert_rule(&pool, &rule("TestRule", cat, 5000)).await.unwrap();
        assert_eq!(created.field, "merchant");
        assert_eq!(created.operator, "contains");
        assert!(created.active);

        let mut edited = rule("TestRule", cat, 6000);
        edited.value = "updated-value".to_string();
        let updated = update_rule(&pool, created.id, &edited).await.unwrap();
        assert_eq!(updated.value, "updated-value");
        assert_eq!(updated.priority, 6000);

        delete_rule(&pool, created.id).await.unwrap();
        assert!(get_rule(&pool, created.id).await.unwrap().is_none());
        assert!(get_all_rules(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_twice_restores_active() {
        let (pool, cat) = setup().await;
        let created = insert_rule(&pool, &rule("Toggle", cat, 7000)).await.unwrap();

        let off = toggle_rule(&pool, created.id).await.unwrap();
        assert!(!off.active);
        assert!(get_active_rules(&pool).await.unwrap().is_empty());

        let on = toggle_rule(&pool, created.id).await.unwrap();
        assert!(on.active);
        assert_eq!(get_active_rules(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_is_in_evaluation_order() {
        let (pool, cat) = setup().await;
        let low = insert_rule(&pool, &rule("low", cat, 1)).await.unwrap();
        let high = insert_rule(&pool, &rule("high", cat, 10)).await.unwrap();
        let tie = insert_rule(&pool, &rule("tie", cat, 1)).await.unwrap();
        let ids: Vec<RuleId> = get_all_rules(&pool).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![high.id, low.id, tie.id]);
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let (pool, _) = setup().await;
        let err = insert_rule(&pool, &rule("orphan", CategoryId(404), 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn deleting_category_removes_its_rules() {
        let (pool, cat) = setup().await;
        insert_rule(&pool, &rule("r", cat, 1)).await.unwrap();
        delete_category(&pool, cat).await.unwrap();
        assert!(get_all_rules(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_rule_is_not_found() {
        let (pool, _) = setup().await;
        assert!(matches!(
            toggle_rule(&pool, RuleId(1)).await,
            Err(StorageError::NotFound { entity: "Rule", .. })
        ));
        assert!(matches!(
            delete_rule(&pool, RuleId(1)).await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
