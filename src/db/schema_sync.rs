//! Startup schema synchronization and seeding.
//!
//! Tables are created from each entity's column registry in dependency
//! order, then baseline rows are inserted with OR IGNORE so repeated starts
//! are no-ops.

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

use crate::api::PROTECTED_ROUTES;
use crate::config::Config;
use crate::db::Database;
use crate::entities::role::ADMIN_ROLE_SLUG;
use crate::entities::{Group, Menu, Permission, Role, User};
use crate::orm::traits::Entity;

const ROLE_PERMISSION_SQL: &str = "CREATE TABLE IF NOT EXISTS role_permission (
  role_id INTEGER NOT NULL REFERENCES role(id) ON DELETE CASCADE,
  permission_id TEXT NOT NULL REFERENCES permission(id) ON DELETE CASCADE,
  PRIMARY KEY (role_id, permission_id)
)";

const ROLE_MENU_SQL: &str = "CREATE TABLE IF NOT EXISTS role_menu (
  role_id INTEGER NOT NULL REFERENCES role(id) ON DELETE CASCADE,
  menu_id INTEGER NOT NULL REFERENCES menu(id) ON DELETE CASCADE,
  PRIMARY KEY (role_id, menu_id)
)";

/// Create every table that does not exist yet, referenced tables first.
pub async fn sync_all_tables(pool: &Database) -> Result<()> {
    let statements = [
        Role::create_table_sql(),
        Permission::create_table_sql(),
        Group::create_table_sql(),
        User::create_table_sql(),
        Menu::create_table_sql(),
        ROLE_PERMISSION_SQL.to_string(),
        ROLE_MENU_SQL.to_string(),
    ];
    for sql in &statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("schema sync failed:\n{sql}"))?;
    }
    info!("schema synchronized");
    Ok(())
}

/// Seed the superuser role, default group, admin account and the permission
/// row for every protected route. Safe to run on every start.
pub async fn run_seeds(pool: &Database, config: &Config) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO role (name, slug) VALUES (?, ?)")
        .bind("Administrator")
        .bind(ADMIN_ROLE_SLUG)
        .execute(pool)
        .await?;
    let admin_role_id: i64 = sqlx::query_scalar("SELECT id FROM role WHERE slug = ?")
        .bind(ADMIN_ROLE_SLUG)
        .fetch_one(pool)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO user_group (name, role_id) VALUES (?, ?)")
        .bind("Default")
        .bind(admin_role_id)
        .execute(pool)
        .await?;
    let default_group_id: i64 = sqlx::query_scalar("SELECT id FROM user_group WHERE name = ?")
        .bind("Default")
        .fetch_one(pool)
        .await?;

    let admin_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM user WHERE email = ?")
        .bind(&config.admin_email)
        .fetch_optional(pool)
        .await?;
    if admin_exists.is_none() {
        let hashed = bcrypt::hash(&config.admin_password, bcrypt::DEFAULT_COST)
            .context("failed to hash admin password")?;
        sqlx::query(
            "INSERT OR IGNORE INTO user (name, password, email, role_id, group_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind("admin")
        .bind(&hashed)
        .bind(&config.admin_email)
        .bind(admin_role_id)
        .bind(default_group_id)
        .execute(pool)
        .await?;
        info!(email = %config.admin_email, "admin account seeded");
    }

    // New routes get a fresh id; existing (url, method) pairs are kept as-is
    // so role attachments survive restarts.
    for route in PROTECTED_ROUTES {
        sqlx::query(
            "INSERT OR IGNORE INTO permission (id, name, url, method, tag) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(route.name)
        .bind(route.url)
        .bind(route.method)
        .bind(route.tag)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;

    #[tokio::test]
    async fn test_sync_and_seed_are_idempotent() {
        let pool = connect_memory().await.unwrap();
        let config = Config::for_tests();

        sync_all_tables(&pool).await.unwrap();
        run_seeds(&pool, &config).await.unwrap();
        sync_all_tables(&pool).await.unwrap();
        run_seeds(&pool, &config).await.unwrap();

        let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role WHERE slug = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(roles, 1);

        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);

        let permissions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permission")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(permissions, PROTECTED_ROUTES.len() as i64);
    }

    #[tokio::test]
    async fn test_admin_password_is_hashed() {
        let pool = connect_memory().await.unwrap();
        let config = Config::for_tests();
        sync_all_tables(&pool).await.unwrap();
        run_seeds(&pool, &config).await.unwrap();

        let stored: String = sqlx::query_scalar("SELECT password FROM user WHERE email = ?")
            .bind(&config.admin_email)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_ne!(stored, config.admin_password);
        assert!(bcrypt::verify(&config.admin_password, &stored).unwrap());
    }
}
