//! User queries for the fleetgate hub.

use fleetgate_core::db::{unix_timestamp, DatabaseError};
use fleetgate_core::{Provider, Role};

use super::db::HubDatabase;
use super::models::User;

/// Parameters for creating a user account.
pub struct NewUserParams<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub provider: Provider,
    pub linked_machine_id: Option<i64>,
    pub linked_gateway_id: Option<&'a str>,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl HubDatabase {
    // =========================================================================
    // Account queries
    // =========================================================================

    /// Create a user account.
    ///
    /// The one-local-admin-per-machine index makes the first-registrant
    /// promotion atomic: when a concurrent registration claims the slot
    /// first, the insert is retried as `guest_local`. A duplicate email
    /// surfaces as `AlreadyExists`.
    pub async fn create_user(&self, params: &NewUserParams<'_>) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        if let Err(e) = self.insert_user(params, params.role, now).await {
            if !is_unique_violation(&e) {
                return Err(e.into());
            }
            if self.find_user_by_email(params.email).await?.is_some() {
                return Err(DatabaseError::AlreadyExists(format!("User {}", params.email)));
            }
            if params.role != Role::AdminLocal {
                return Err(e.into());
            }
            // The machine's local-admin slot was claimed first. A guest
            // insert can only collide on the email column.
            self.insert_user(params, Role::GuestLocal, now)
                .await
                .map_err(|retry| {
                    if is_unique_violation(&retry) {
                        DatabaseError::AlreadyExists(format!("User {}", params.email))
                    } else {
                        retry.into()
                    }
                })?;
        }

        self.find_user_by_email(params.email)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {}", params.email)))
    }

    async fn insert_user(
        &self,
        params: &NewUserParams<'_>,
        role: Role,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (email, password_hash, role, provider, linked_machine_id, linked_gateway_id, created_at, last_login_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.email)
        .bind(params.password_hash)
        .bind(role)
        .bind(params.provider)
        .bind(params.linked_machine_id)
        .bind(params.linked_gateway_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map(|_| ())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Find a user by email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    /// List all users, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
                .fetch_all(self.pool())
                .await?;

        Ok(users)
    }

    /// Stamp a user's `last_login_at`.
    pub async fn update_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Replace a user's password hash.
    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }

        Ok(())
    }

    /// Remove a user account.
    pub async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count user accounts.
    pub async fn count_users(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    // =========================================================================
    // Role and link queries
    // =========================================================================

    /// Change a user's role.
    ///
    /// A promotion to `admin_local` for a machine that already has one hits
    /// the partial unique index and surfaces as `AlreadyExists`.
    pub async fn update_user_role(&self, id: i64, role: Role) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::AlreadyExists("machine already has a local admin".to_string())
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }

        Ok(())
    }

    /// Replace both device links of a user.
    pub async fn update_user_links(
        &self,
        id: i64,
        linked_machine_id: Option<i64>,
        linked_gateway_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE users SET linked_machine_id = ?, linked_gateway_id = ? WHERE id = ?")
                .bind(linked_machine_id)
                .bind(linked_gateway_id)
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DatabaseError::AlreadyExists(
                            "machine already has a local admin".to_string(),
                        )
                    } else {
                        e.into()
                    }
                })?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }

        Ok(())
    }

    /// List accounts linked to a machine.
    pub async fn users_linked_to_machine(
        &self,
        machine_id: i64,
    ) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE linked_machine_id = ? ORDER BY id",
        )
        .bind(machine_id)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }

    /// Whether a machine already has a local admin.
    pub async fn has_local_admin(&self, machine_id: i64) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE linked_machine_id = ? AND role = ?",
        )
        .bind(machine_id)
        .bind(Role::AdminLocal)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0 > 0)
    }
}
