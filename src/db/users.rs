use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::auth::{hash_password, MIN_PASSWORD_LEN};
use crate::domain::value_objects::{Page, Role};
use crate::models::User;

#[derive(Debug, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(length(min = 6, max = 128))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    pub role: Option<Role>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(pool).await
}

pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1").bind(username).fetch_optional(pool).await
}

pub async fn username_taken(pool: &PgPool, username: &str, except_id: Option<i64>) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($2::BIGINT IS NULL OR id <> $2))")
        .bind(username).bind(except_id).fetch_one(pool).await?;
    Ok(row.0)
}

pub fn list_query(filter: &UserFilter, page: Page) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM users WHERE 1=1");
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = super::contains_pattern(search);
        qb.push(" AND (username ILIKE ").push_bind(pattern.clone()).push(" OR name ILIKE ").push_bind(pattern).push(")");
    }
    qb.push(" ORDER BY id LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.skip);
    qb
}

pub async fn list(pool: &PgPool, filter: &UserFilter, page: Page) -> Result<Vec<User>, sqlx::Error> {
    let mut qb = list_query(filter, page);
    qb.build_query_as::<User>().fetch_all(pool).await
}

pub async fn insert(pool: &PgPool, new: &NewUser, password_hash: &str) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash, name, role, email, phone, avatar)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(new.username.trim())
    .bind(password_hash)
    .bind(new.name.trim())
    .bind(new.role.as_str())
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.avatar)
    .fetch_one(pool)
    .await
}

/// Applies the supplied fields only. `password_hash` replaces the stored hash when given.
pub async fn update(pool: &PgPool, id: i64, patch: &UserUpdate, password_hash: Option<&str>) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET
            username = COALESCE($2, username),
            name = COALESCE($3, name),
            role = COALESCE($4, role),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            avatar = COALESCE($7, avatar),
            password_hash = COALESCE($8, password_hash),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.username.as_deref().map(str::trim))
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.role.map(|r| r.as_str()))
    .bind(&patch.email)
    .bind(&patch.phone)
    .bind(&patch.avatar)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
}

pub async fn set_password(pool: &PgPool, id: i64, password_hash: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(id).bind(password_hash).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_many(pool: &PgPool, ids: &[i64]) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ANY($1)").bind(ids).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn set_role_many(pool: &PgPool, ids: &[i64], role: Role) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = ANY($1)")
        .bind(ids).bind(role.as_str()).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Creates the bootstrap admin unless the username already exists.
/// Returns whether an account was created.
pub async fn ensure_admin(pool: &PgPool, username: &str, password: &str) -> crate::Result<bool> {
    if find_by_username(pool, username).await?.is_some() {
        return Ok(false);
    }
    if password.len() < MIN_PASSWORD_LEN {
        tracing::warn!(username, "bootstrap admin password is shorter than {} characters", MIN_PASSWORD_LEN);
    }
    let hash = hash_password(password)?;
    let new = NewUser {
        username: username.to_string(),
        password: String::new(),
        name: "Administrator".to_string(),
        role: Role::Admin,
        email: None,
        phone: None,
        avatar: None,
    };
    insert(pool, &new, &hash).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_binds_search() {
        let filter = UserFilter { role: Some(Role::Operator), search: Some(" li ".into()) };
        let qb = list_query(&filter, Page { skip: 0, limit: 20 });
        assert_eq!(
            qb.sql(),
            "SELECT * FROM users WHERE 1=1 AND role = $1 AND (username ILIKE $2 OR name ILIKE $3) ORDER BY id LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn test_new_user_validation() {
        let user: NewUser = serde_json::from_value(serde_json::json!({
            "username": "ab", "password": "123", "name": ""
        })).unwrap();
        let errors = user.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("name"));
        assert_eq!(user.role, Role::Operator);
    }
}
