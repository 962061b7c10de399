use argon2::{
    password_hash::{self, PasswordVerifier},
    Argon2, PasswordHash,
};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    pub password: String,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn check_hash(&self, password: &str) -> Result<(), password_hash::Error> {
        let parsed_hash = PasswordHash::new(&self.password)?;

        Argon2::default().verify_password(password.as_bytes(), &parsed_hash)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
