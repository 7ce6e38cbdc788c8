//! Transaction helper used by the ingestion services.

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// Commits when the callback returns `Ok`, rolls back otherwise. The
/// callback's own error type is handed back unchanged, so a
/// `ServiceError::Conflict` raised inside stays a conflict.
///
/// # Example
///
/// ```rust,ignore
/// use emmo_ingest::db::transaction::with_transaction;
///
/// let product = with_transaction(&db, move |txn| {
///     Box::pin(async move { repo.merge(txn, &upsert).await })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + Display + Debug + Send,
{
    db.transaction::<F, T, E>(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
