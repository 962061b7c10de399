use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Deserialize;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use crate::entities::user;
use crate::errors::{Error, Result};
use crate::middleware::auth::generate_token;

/// Register and login body. No `Debug`, so the password never reaches a log line.
#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 3, max = 150, message = "Username must be 3 to 150 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// First failing field message, in declaration order.
fn first_message(errors: &ValidationErrors) -> String {
    ["username", "password"]
        .iter()
        .filter_map(|field| {
            errors
                .field_errors()
                .get(*field)
                .and_then(|errs| errs.first().cloned())
        })
        .find_map(|err| err.message.map(|msg| msg.into_owned()))
        .unwrap_or_else(|| "Invalid credentials".to_owned())
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| Error::PasswordHash(err.to_string()))?
        .to_string())
}

pub async fn register(db: &DatabaseConnection, credentials: Credentials) -> Result<user::Model> {
    credentials
        .validate()
        .map_err(|errors| Error::Validation(first_message(&errors)))?;

    let new_user = user::ActiveModel {
        username: Set(credentials.username.trim().to_owned()),
        password: Set(hash_password(&credentials.password)?),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match new_user.insert(db).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "User registered");
            Ok(user)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::Conflict("Username already exists".to_owned()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Returns a bearer token for valid credentials.
pub async fn login(
    db: &DatabaseConnection,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<String> {
    let user = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;

    let Some(user) = user else {
        warn!(username, "Unknown username");
        return Err(Error::InvalidCredentials);
    };

    if user.check_hash(password).is_err() {
        warn!(user_id = user.id, "Wrong password");
        return Err(Error::InvalidCredentials);
    }

    generate_token(user.id, secret)
}
