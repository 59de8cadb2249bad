//! Database seeders for built-in data.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Seed the built-in roles (runs on every startup, inserts are idempotent)
pub async fn seed_roles(pool: &SqlitePool) -> Result<()> {
    info!("Seeding built-in roles...");

    // Format: (id, name, description)
    let roles: Vec<(&str, &str, &str)> = vec![
        ("role-admin", "ADMIN", "Platform administrator"),
        ("role-cliente", "CLIENTE", "Registered customer"),
    ];

    for (id, name, description) in roles {
        sqlx::query(
            "INSERT OR IGNORE INTO roles (id, name, description, active) VALUES (?, ?, ?, 1)",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}
