//! Transaction helper for multi-statement writes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diesel_async::scoped_futures::ScopedFutureExt;
//! use crate::db::transaction::with_transaction;
//!
//! with_transaction(&mut conn, move |conn| async move {
//!     let template = insert_template(conn, &new_template).await?;
//!     let group = insert_group(conn, &new_group).await?;
//!     Ok((template, group))
//! }.scope_boxed()).await?;
//! ```

use diesel_async::{AsyncConnection, scoped_futures::ScopedBoxFuture};

use crate::db::connection::DbConnection;
use crate::error::{DbError, DbResult};

/// ## Summary
/// Runs a database transaction and returns the closure result.
///
/// ## Errors
/// Returns any error produced by the closure, or errors raised while starting
/// or committing the transaction. The transaction is rolled back on error.
pub async fn with_transaction<'conn, 'pool, T, F>(
    conn: &'conn mut DbConnection<'pool>,
    callback: F,
) -> DbResult<T>
where
    F: for<'r> FnOnce(&'r mut DbConnection<'pool>) -> ScopedBoxFuture<'conn, 'r, DbResult<T>>
        + Send
        + 'conn,
    T: Send + 'conn,
{
    conn.transaction::<_, DbError, _>(callback).await
}
