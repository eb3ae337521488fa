use sqlx::Row;

use travo_core::domain::user::{Role, User, UserId};

use super::{fmt_ts, parse_ts, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, school_id, school_name,
    district, position, original_position, contact_no, employee_number, role, created_at";

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    decode_user_columns(row, "")
}

/// Decodes user columns that were selected with a prefix (e.g. `user_` in the
/// travel-request join).
pub(crate) fn decode_user_columns(
    row: &sqlx::sqlite::SqliteRow,
    prefix: &str,
) -> Result<User, RepositoryError> {
    let col = |name: &str| format!("{prefix}{name}");
    let get = |name: &str| -> Result<String, RepositoryError> {
        row.try_get::<String, _>(col(name).as_str())
            .map_err(|err| RepositoryError::Decode(err.to_string()))
    };

    let role_str = get("role")?;
    let role: Role = role_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown role `{role_str}`")))?;
    let original_position: Option<String> = row
        .try_get(col("original_position").as_str())
        .map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let created_at = parse_ts(&get("created_at")?, "created_at")?;

    Ok(User {
        id: UserId(get("id")?),
        username: get("username")?,
        first_name: get("first_name")?,
        last_name: get("last_name")?,
        email: get("email")?,
        school_id: get("school_id")?,
        school_name: get("school_name")?,
        district: get("district")?,
        position: get("position")?,
        original_position,
        contact_no: get("contact_no")?,
        employee_number: get("employee_number")?,
        role,
        created_at,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, username, first_name, last_name, email, school_id,
                                school_name, district, position, original_position, contact_no,
                                employee_number, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 email = excluded.email,
                 school_id = excluded.school_id,
                 school_name = excluded.school_name,
                 district = excluded.district,
                 position = excluded.position,
                 original_position = excluded.original_position,
                 contact_no = excluded.contact_no,
                 employee_number = excluded.employee_number,
                 role = excluded.role",
        )
        .bind(&user.id.0)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.school_id)
        .bind(&user.school_name)
        .bind(&user.district)
        .bind(&user.position)
        .bind(&user.original_position)
        .bind(&user.contact_no)
        .bind(&user.employee_number)
        .bind(user.role.as_str())
        .bind(fmt_ts(user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY username"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_user).collect()
    }
}
