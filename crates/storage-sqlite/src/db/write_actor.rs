//! Single-writer actor: all mutations run on one task, each job inside an
//! immediate transaction, so a read-then-write sequence can never interleave
//! with another writer.

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use fieldops_core::{CoreError, Result};

use crate::db::DbPool;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

/// Transaction error wrapper: keeps domain errors intact while satisfying
/// diesel's `From<diesel::result::Error>` transaction bound.
enum TxError {
    Domain(CoreError),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

/// Handle used by repositories to submit transactional write jobs.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    /// Run `job` inside an immediate transaction on the writer task.
    /// The transaction rolls back when the job returns an error.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::Domain))
                .map_err(|err| match err {
                    TxError::Domain(domain) => domain,
                    TxError::Diesel(diesel) => CoreError::database(diesel),
                });
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(wrapped)
            .map_err(|_| CoreError::database("writer task is gone"))?;
        reply_rx
            .await
            .map_err(|_| CoreError::database("writer dropped the reply"))?
    }
}

/// Spawn the writer task on a dedicated blocking thread and return its handle.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();

    tokio::task::spawn_blocking(move || {
        while let Some(job) = rx.blocking_recv() {
            match pool.get() {
                Ok(mut conn) => job(&mut conn),
                Err(err) => {
                    // The job's oneshot sender is dropped with it; the caller
                    // observes a "writer dropped the reply" error.
                    error!("writer could not check out a connection: {err}");
                }
            }
        }
    });

    WriteHandle { tx }
}
