use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::{ClientOptions, IndexOptions},
    Client, Database, IndexModel,
};

use crate::{config::Config, ledger::mongo::RefreshTokenDoc, principal::mongo::UserDoc};

pub const USERS: &str = "users";
pub const REFRESH_TOKENS: &str = "refresh_tokens";

pub async fn connect(uri: &str, cfg: &Config) -> mongodb::error::Result<(Client, Database)> {
    let mut opts = ClientOptions::parse(uri).await?;
    opts.app_name = Some("auth-session".to_string());
    let client = Client::with_options(opts)?;
    let db = client.database(&cfg.db_name);
    ensure_indexes(&db).await?;
    Ok((client, db))
}

async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let users = db.collection::<UserDoc>(USERS);
    let username_index = IndexModel::builder()
        .keys(doc! { "username": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    users.create_index(username_index).await?;

    let refresh_tokens = db.collection::<RefreshTokenDoc>(REFRESH_TOKENS);
    let hash_index = IndexModel::builder()
        .keys(doc! { "token_hash": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    let family_index = IndexModel::builder().keys(doc! { "family_id": 1 }).build();
    let user_index = IndexModel::builder().keys(doc! { "user_id": 1 }).build();
    refresh_tokens
        .create_indexes([hash_index, family_index, user_index])
        .await?;
    Ok(())
}

pub fn to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub fn from_bson(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
        _ => false,
    }
}
